//! Thread class/kind/format enums, the combined [`ThreadId`], and the
//! 16-byte on-disk thread header (spec §3 "Thread", §6 "Thread header").
//!
//! The exact numeric values of `ThreadClass`/`ThreadKind`/`ThreadFormat`
//! below are the long-documented NuFX constants (the public `NufxLib.h`
//! that would confirm them byte-for-byte isn't part of the retrieved
//! source pack; `NufxLibPriv.h` only declares the opaque `NuThreadID`
//! type and the accessor prototypes `NuThreadIDGetClass`/`GetKind`, not
//! their definitions).

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::byteio::{ByteReader, ByteWriter, CRC16_THREAD_INIT};
use crate::error::{Error, Result};
use crate::model::ThreadIdx;

pub const THREAD_HEADER_SIZE: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum ThreadClass {
    Message = 0x0000,
    Control = 0x0001,
    Data = 0x0002,
    Filename = 0x0003,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum ThreadFormat {
    Uncompressed = 0x0000,
    HuffmanSQ = 0x0001,
    Lzw1 = 0x0002,
    Lzw2 = 0x0003,
    UnixZip = 0x0004,
    Lzc12 = 0x0005,
    Lzc16 = 0x0006,
    /// nufxlib extension, not part of the original ShrinkIt format.
    Deflate = 0x0007,
    /// nufxlib extension, not part of the original ShrinkIt format.
    Bzip2 = 0x0008,
}

/// Interpretation of `kind` is determined by the enclosing thread's
/// [`ThreadClass`]; this is a transparent newtype rather than a
/// class-polymorphic enum so a thread's raw (class, kind) pair round-trips
/// even for combinations this crate doesn't otherwise assign meaning to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadKind(pub u16);

impl ThreadKind {
    pub const COMMENT_OLD: ThreadKind = ThreadKind(0x0000);
    pub const COMMENT: ThreadKind = ThreadKind(0x0001);
    pub const DATA_FORK: ThreadKind = ThreadKind(0x0000);
    pub const DISK_IMAGE: ThreadKind = ThreadKind(0x0001);
    pub const RSRC_FORK: ThreadKind = ThreadKind(0x0002);
    pub const FILENAME: ThreadKind = ThreadKind(0x0000);
}

/// A (class, kind) pair, the unit callers select a thread by (spec §3
/// "ThreadMod": `Add(threadID, ...)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId {
    pub class: ThreadClass,
    pub kind: ThreadKind,
}

impl ThreadId {
    pub const fn new(class: ThreadClass, kind: ThreadKind) -> Self {
        Self { class, kind }
    }

    pub const COMMENT: ThreadId = ThreadId::new(ThreadClass::Message, ThreadKind::COMMENT);
    pub const FILENAME: ThreadId = ThreadId::new(ThreadClass::Filename, ThreadKind::FILENAME);
    pub const DATA_FORK: ThreadId = ThreadId::new(ThreadClass::Data, ThreadKind::DATA_FORK);
    pub const DISK_IMAGE: ThreadId = ThreadId::new(ThreadClass::Data, ThreadKind::DISK_IMAGE);
    pub const RSRC_FORK: ThreadId = ThreadId::new(ThreadClass::Data, ThreadKind::RSRC_FORK);

    /// Matches any thread during wildcard thread construction (spec §4.6
    /// step 5, final wildcard pass).
    pub fn is_wildcard_match(&self, class: ThreadClass, kind: ThreadKind) -> bool {
        self.class == class && self.kind == kind
    }
}

/// Whether a thread's on-disk allocation is fixed-capacity (filename,
/// comment) rather than sized exactly to its content (spec glossary
/// "Pre-sized thread").
pub fn is_presized(id: ThreadId) -> bool {
    matches!(id.class, ThreadClass::Filename)
        || (id.class == ThreadClass::Message && id.kind == ThreadKind::COMMENT)
}

/// Whether a thread of this id is a candidate for compression at all
/// (filename/comment threads are always stored, never compressed).
pub fn is_compressible(id: ThreadId) -> bool {
    !is_presized(id)
}

/// One stream within a record (spec §3 "Thread").
#[derive(Debug, Clone)]
pub struct Thread {
    pub thread_idx: ThreadIdx,
    pub class: ThreadClass,
    pub format: ThreadFormat,
    pub kind: ThreadKind,
    /// Thread CRC: CRC-16/XMODEM over the *uncompressed* bytes, seeded at
    /// [`CRC16_THREAD_INIT`].
    pub thread_crc: u16,
    /// Uncompressed length in bytes ("thThreadEOF").
    pub uncomp_eof: u32,
    /// On-disk (possibly compressed) length in bytes ("thCompThreadEOF");
    /// for pre-sized threads this is the allocated capacity.
    pub comp_eof: u32,
    /// Byte offset of this thread's data within the archive file.
    pub file_offset: u64,
    /// Length actually produced by the last extraction through this
    /// thread (may differ from `uncomp_eof` under EOL conversion).
    pub actual_eof_after_extraction: u32,
    /// Cleared at the start of a flush, set exactly once by the flush
    /// record-reconstruction pass (spec §3 "ThreadMod" invariants).
    pub used: bool,
}

impl Thread {
    pub fn id(&self) -> ThreadId {
        ThreadId::new(self.class, self.kind)
    }

    pub fn is_presized(&self) -> bool {
        is_presized(self.id())
    }

    /// Reads a 16-byte thread header. `thread_idx` is assigned by the
    /// caller (record order within the archive, not persisted).
    pub fn read_header<R: std::io::Read>(
        r: &mut ByteReader<R>,
        thread_idx: ThreadIdx,
        crc: &mut Option<&mut u16>,
    ) -> Result<Thread> {
        let class_raw = r.u16_crc(crc)?;
        let format_raw = r.u16_crc(crc)?;
        let kind_raw = r.u16_crc(crc)?;
        let thread_crc = r.u16_crc(crc)?;
        let uncomp_eof = r.u32_crc(crc)?;
        let comp_eof = r.u32_crc(crc)?;

        let class = ThreadClass::try_from(class_raw)
            .map_err(|_| Error::BadRecord("unrecognized thread class"))?;
        let format =
            ThreadFormat::try_from(format_raw).map_err(|_| Error::BadFormat(format_raw))?;

        Ok(Thread {
            thread_idx,
            class,
            format,
            kind: ThreadKind(kind_raw),
            thread_crc,
            uncomp_eof,
            comp_eof,
            file_offset: 0,
            actual_eof_after_extraction: 0,
            used: false,
        })
    }

    pub fn write_header<W: std::io::Write>(
        &self,
        w: &mut ByteWriter<W>,
        crc: &mut Option<&mut u16>,
    ) -> Result<()> {
        w.u16_crc(u16::from(self.class), crc)?;
        w.u16_crc(u16::from(self.format), crc)?;
        w.u16_crc(self.kind.0, crc)?;
        w.u16_crc(self.thread_crc, crc)?;
        w.u32_crc(self.uncomp_eof, crc)?;
        w.u32_crc(self.comp_eof, crc)?;
        Ok(())
    }
}

impl From<ThreadClass> for u16 {
    fn from(c: ThreadClass) -> u16 {
        IntoPrimitive::into(c)
    }
}

impl From<ThreadFormat> for u16 {
    fn from(f: ThreadFormat) -> u16 {
        IntoPrimitive::into(f)
    }
}

/// Freshly-allocated empty thread for a new record, matching the "empty
/// source" boundary behavior of spec §4.5/§8 (stored, zero EOFs, CRC =
/// initial thread CRC).
pub fn empty_thread(thread_idx: ThreadIdx, id: ThreadId) -> Thread {
    Thread {
        thread_idx,
        class: id.class,
        format: ThreadFormat::Uncompressed,
        kind: id.kind,
        thread_crc: CRC16_THREAD_INIT,
        uncomp_eof: 0,
        comp_eof: 0,
        file_offset: 0,
        actual_eof_after_extraction: 0,
        used: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_id_constants_distinct() {
        assert_ne!(ThreadId::FILENAME, ThreadId::COMMENT);
        assert_ne!(ThreadId::DATA_FORK, ThreadId::DISK_IMAGE);
        assert_ne!(ThreadId::DISK_IMAGE, ThreadId::RSRC_FORK);
    }

    #[test]
    fn presized_threads_are_filename_and_comment_only() {
        assert!(is_presized(ThreadId::FILENAME));
        assert!(is_presized(ThreadId::COMMENT));
        assert!(!is_presized(ThreadId::DATA_FORK));
        assert!(!is_presized(ThreadId::DISK_IMAGE));
        assert!(!is_presized(ThreadId::RSRC_FORK));
    }

    #[test]
    fn header_roundtrip() {
        let mut buf = Vec::new();
        let thread = Thread {
            thread_idx: ThreadIdx(0),
            class: ThreadClass::Data,
            format: ThreadFormat::Uncompressed,
            kind: ThreadKind::DATA_FORK,
            thread_crc: 0x5546,
            uncomp_eof: 11,
            comp_eof: 11,
            file_offset: 0,
            actual_eof_after_extraction: 0,
            used: false,
        };
        {
            let mut w = ByteWriter::new(&mut buf);
            thread.write_header(&mut w, &mut None).unwrap();
        }
        assert_eq!(buf.len(), THREAD_HEADER_SIZE as usize);

        let mut r = ByteReader::new(&buf[..]);
        let back = Thread::read_header(&mut r, ThreadIdx(0), &mut None).unwrap();
        assert_eq!(back.class, ThreadClass::Data);
        assert_eq!(back.kind, ThreadKind::DATA_FORK);
        assert_eq!(back.thread_crc, 0x5546);
        assert_eq!(back.uncomp_eof, 11);
        assert_eq!(back.comp_eof, 11);
    }
}
