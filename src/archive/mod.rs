//! The archive handle: open-mode variants, the three record sets, the
//! ThreadMod journal keyed by record, tunable options, and callbacks (spec
//! §3 "Archive").
//!
//! Follows the teacher's per-format top-level struct (`crates/zip/src/
//! lib.rs`'s `ZipArchive` / `crates/rar/src/lib.rs`'s `RarArchive`) in
//! owning everything needed to answer "what records does this archive
//! have" and "what's pending", with the flush engine (`crate::flush`)
//! doing the actual disk I/O.

pub mod callbacks;
pub mod options;
pub mod open;

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::archive::callbacks::Callbacks;
use crate::archive::options::Options;
use crate::error::{Error, Result};
use crate::model::{
    MasterHeader, Record, RecordIdx, RecordIdxSeed, RecordSet, ThreadClass, ThreadFormat, ThreadId, ThreadIdx,
    ThreadIdxSeed,
};
use crate::source_sink::DataSource;
use crate::threadmod::ThreadModQueue;
use crate::wrapper::WrapperKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    StreamingRead,
    ReadOnly,
    ReadWrite,
}

/// The status bitfield a flush reports back (spec §7 "User-visible flush
/// status").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatus {
    pub succeeded: bool,
    pub aborted: bool,
    pub corrupted: bool,
    pub read_only_fallback: bool,
    pub inaccessible: bool,
}

pub struct Archive {
    pub(crate) mode: OpenMode,
    pub(crate) wrapper_kind: WrapperKind,
    pub(crate) wrapper_offset: u64,
    pub(crate) master_header: MasterHeader,
    pub(crate) orig: RecordSet,
    pub(crate) copy: Option<RecordSet>,
    pub(crate) new: RecordSet,
    pub(crate) thread_mods: HashMap<RecordIdx, ThreadModQueue>,
    pub(crate) record_seed: RecordIdxSeed,
    pub(crate) thread_seed: ThreadIdxSeed,
    pub(crate) options: Options,
    pub(crate) callbacks: Callbacks,
    pub(crate) path: Option<PathBuf>,
    /// Re-entrancy guard (spec §5 "Shared resource policy").
    pub(crate) busy: Cell<bool>,
}

impl Archive {
    #[instrument(skip(options), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, options: Options) -> Result<Archive> {
        match mode {
            OpenMode::StreamingRead => {
                let file = std::fs::File::open(path.as_ref())?;
                open::open_streaming(file, options)
            }
            OpenMode::ReadOnly | OpenMode::ReadWrite => open::open_file(path, mode, options),
        }
    }

    pub fn create_new(path: impl Into<PathBuf>, options: Options) -> Archive {
        open::create_new(path, options)
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub fn callbacks_mut(&mut self) -> &mut Callbacks {
        &mut self.callbacks
    }

    pub fn wrapper_kind(&self) -> WrapperKind {
        self.wrapper_kind
    }

    /// Guards a public operation against re-entrant calls (spec §5 "busy
    /// flag"): every top-level call that touches record sets runs inside
    /// this.
    fn enter(&self) -> Result<()> {
        if self.busy.replace(true) {
            return Err(Error::Busy);
        }
        Ok(())
    }

    fn leave(&self) {
        self.busy.set(false);
    }

    /// Iterates every record currently visible: `copy` if materialized
    /// else `orig`, followed by `new` (spec §3 "Record sets"). With
    /// "mask-dataless" set (spec §6), records with no `Data`-class thread
    /// are hidden from this enumeration.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        let primary = self.copy.as_ref().unwrap_or(&self.orig);
        let mask_dataless = self.options.mask_dataless();
        primary
            .records
            .iter()
            .chain(self.new.records.iter())
            .filter(move |r| !mask_dataless || r.threads.iter().any(|t| t.class == ThreadClass::Data))
    }

    pub fn record_count(&self) -> usize {
        self.records().count()
    }

    pub fn find_record(&self, idx: RecordIdx) -> Option<&Record> {
        self.records().find(|r| r.record_idx == idx)
    }

    /// Lazily materializes `copy` from `orig` on first touch (spec §3
    /// "Record sets": "`copy` is the mutable working set; it is lazily
    /// materialized when the first modification touches any existing
    /// record").
    fn materialize_copy(&mut self) -> &mut RecordSet {
        if self.copy.is_none() {
            self.copy = Some(self.orig.clone());
        }
        self.copy.as_mut().unwrap()
    }

    fn reject_if_streaming(&self) -> Result<()> {
        if self.mode == OpenMode::StreamingRead {
            return Err(Error::Streaming);
        }
        Ok(())
    }

    fn find_in_copy_or_new<'a>(&'a self, idx: RecordIdx) -> Option<&'a Record> {
        if let Some(copy) = &self.copy {
            if let Some(r) = copy.find_by_record_idx(idx) {
                return Some(r);
            }
        } else if let Some(r) = self.orig.find_by_record_idx(idx) {
            return Some(r);
        }
        self.new.find_by_record_idx(idx)
    }

    /// Allocates a brand-new record in `new` with no threads yet.
    pub fn new_record(&mut self, filename: &str, file_type: u32, access: crate::model::record::AccessFlags) -> Result<RecordIdx> {
        self.enter()?;
        let result = (|| {
            self.reject_if_streaming()?;
            if !self.options.flags.contains(options::OptionFlags::ALLOW_DUPLICATES)
                && self.records().any(|r| r.filename() == filename)
            {
                return Err(Error::RecordExists);
            }
            let idx = self.record_seed.next();
            let record = Record {
                record_idx: idx,
                version: 3,
                create_when: crate::byteio::NuDateTime::ZERO,
                mod_when: crate::byteio::NuDateTime::ZERO,
                archive_when: crate::byteio::NuDateTime::ZERO,
                file_sys_id: 1,
                file_sys_info: b'/' as u16,
                access,
                file_type,
                aux_type: 0,
                storage_type: 0,
                option_list: Vec::new(),
                extra_bytes: Vec::new(),
                header_filename: String::new(),
                thread_filename: Some(filename.to_string()),
                header_crc: 0,
                byte_offset: 0,
                attrib_count: 0,
                threads: Vec::new(),
                dirty_header: true,
            };
            self.new.append(record);
            self.thread_mods.insert(idx, ThreadModQueue::new());
            Ok(idx)
        })();
        self.leave();
        result
    }

    pub fn queue_add_thread(
        &mut self,
        record_idx: RecordIdx,
        id: ThreadId,
        target_format: ThreadFormat,
        source: DataSource,
    ) -> Result<()> {
        self.enter()?;
        let result = (|| {
            self.reject_if_streaming()?;
            if self.copy.is_none() && self.orig.find_by_record_idx(record_idx).is_some() {
                self.materialize_copy();
            }
            let record = self
                .find_in_copy_or_new(record_idx)
                .ok_or(Error::RecordIdxNotFound(record_idx))?
                .clone();
            let mods = self.thread_mods.entry(record_idx).or_insert_with(ThreadModQueue::new);
            mods.add(&record, id, target_format, source)
        })();
        self.leave();
        result
    }

    pub fn queue_update_thread(&mut self, record_idx: RecordIdx, thread_idx: ThreadIdx, source: DataSource) -> Result<()> {
        self.enter()?;
        let result = (|| {
            self.reject_if_streaming()?;
            if self.copy.is_none() && self.orig.find_by_record_idx(record_idx).is_some() {
                self.materialize_copy();
            }
            let record = self
                .find_in_copy_or_new(record_idx)
                .ok_or(Error::RecordIdxNotFound(record_idx))?
                .clone();
            if self.options.only_update_older() {
                if let Some(source_when) = source.meta.mod_when {
                    if !source_when.is_newer_than(record.mod_when) {
                        return Err(Error::NotNewer);
                    }
                }
            }
            let mods = self.thread_mods.entry(record_idx).or_insert_with(ThreadModQueue::new);
            mods.update(&record, thread_idx, source)
        })();
        self.leave();
        result
    }

    pub fn queue_delete_thread(&mut self, record_idx: RecordIdx, thread_idx: ThreadIdx) -> Result<()> {
        self.enter()?;
        let result = (|| {
            self.reject_if_streaming()?;
            if self.copy.is_none() && self.orig.find_by_record_idx(record_idx).is_some() {
                self.materialize_copy();
            }
            let record = self
                .find_in_copy_or_new(record_idx)
                .ok_or(Error::RecordIdxNotFound(record_idx))?
                .clone();
            let mods = self.thread_mods.entry(record_idx).or_insert_with(ThreadModQueue::new);
            mods.delete(&record, thread_idx)
        })();
        self.leave();
        result
    }

    #[instrument(skip(self))]
    pub fn flush(&mut self) -> Result<FlushStatus> {
        self.enter()?;
        let result = crate::flush::run(self);
        self.leave();
        result
    }
}
