//! Tunable archive options (spec §6 "Tunable configuration").
//!
//! Boolean toggles group under `bitflags` the way the teacher's
//! `rar-archiver::header_4::ArchiveFlags4_0` groups a header's bit
//! switches; multi-valued tunables (EOL target, handle-existing policy)
//! are plain enums rather than forced into the bitmask.

use bitflags::bitflags;

use crate::eol::TargetEol;
use crate::model::ThreadFormat;

bitflags! {
    /// The boolean tunables of spec §6, grouped into one mask so `Options`
    /// can copy/compare them cheaply.
    pub struct OptionFlags: u32 {
        const ALLOW_DUPLICATES     = 0x0001;
        const DISCARD_WRAPPER      = 0x0002;
        const IGNORE_CRC           = 0x0004;
        const MASK_DATALESS        = 0x0008;
        const MIMIC_SHK            = 0x0010;
        const MODIFY_ORIG          = 0x0020;
        const ONLY_UPDATE_OLDER    = 0x0040;
        const STRIP_HIGH_ASCII     = 0x0080;
        const IGNORE_LZW2_LEN      = 0x0100;
        const HANDLE_BAD_MAC       = 0x0200;
    }
}

impl Default for OptionFlags {
    fn default() -> Self {
        OptionFlags::MODIFY_ORIG
    }
}

/// Full tunable set an [`crate::archive::Archive`] carries (spec §6).
///
/// "handle-existing" (never-overwrite / always / rename / ask-via-callback)
/// is omitted here: it governs what an extraction routine does when a
/// target path already holds a file, but this crate's `DataSink` always
/// takes an already-open `File` (see `source_sink.rs`) rather than owning a
/// target path itself, so the policy has no call site to act on — deciding
/// whether/how to open that path is the caller's job.
#[derive(Debug, Clone)]
pub struct Options {
    pub flags: OptionFlags,
    pub convert_extracted_eol: crate::eol::EolMode,
    pub eol_target: TargetEol,
    pub data_compression: ThreadFormat,
    /// Bytes of leading garbage to scan for the NuFX magic (spec §6
    /// "junk-skip-max").
    pub junk_skip_max: u64,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            flags: OptionFlags::default(),
            convert_extracted_eol: crate::eol::EolMode::Off,
            eol_target: TargetEol::Lf,
            data_compression: ThreadFormat::Lzw2,
            junk_skip_max: 32 * 1024,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(mut self, flag: OptionFlags, on: bool) -> Self {
        self.flags.set(flag, on);
        self
    }

    pub fn with_eol(mut self, mode: crate::eol::EolMode, target: TargetEol) -> Self {
        self.convert_extracted_eol = mode;
        self.eol_target = target;
        self
    }

    pub fn with_data_compression(mut self, format: ThreadFormat) -> Self {
        self.data_compression = format;
        self
    }

    pub fn ignore_crc(&self) -> bool {
        self.flags.contains(OptionFlags::IGNORE_CRC)
    }

    pub fn mimic_shk(&self) -> bool {
        self.flags.contains(OptionFlags::MIMIC_SHK)
    }

    pub fn discard_wrapper(&self) -> bool {
        self.flags.contains(OptionFlags::DISCARD_WRAPPER)
    }

    pub fn modify_orig(&self) -> bool {
        self.flags.contains(OptionFlags::MODIFY_ORIG)
    }

    pub fn strip_high_ascii(&self) -> bool {
        self.flags.contains(OptionFlags::STRIP_HIGH_ASCII)
    }

    pub fn mask_dataless(&self) -> bool {
        self.flags.contains(OptionFlags::MASK_DATALESS)
    }

    pub fn only_update_older(&self) -> bool {
        self.flags.contains(OptionFlags::ONLY_UPDATE_OLDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_flags() {
        let opts = Options::new().with_flag(OptionFlags::MIMIC_SHK, true);
        assert!(opts.mimic_shk());
        assert!(!opts.ignore_crc());
    }
}
