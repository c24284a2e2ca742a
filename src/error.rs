//! Crate-wide error type.
//!
//! One `thiserror`-derived enum carries every error kind from the taxonomy
//! in spec §7, the way the teacher's `zip-archiver`/`rar-archiver` each
//! expose a single `Error` with `#[from]` conversions rather than a
//! parallel per-module error type.

use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a NuFX archive")]
    NotNufx,

    #[error("unsupported master-header version {0}")]
    BadMasterVersion(u16),

    #[error("record header magic not found at offset {0}")]
    RecordHeaderNotFound(u64),

    #[error("archive contains no records")]
    NoRecords,

    #[error("record is malformed: {0}")]
    BadRecord(&'static str),

    #[error("master header CRC mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    BadMasterCrc { stored: u16, computed: u16 },

    #[error("record header CRC mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    BadRecordCrc { stored: u16, computed: u16 },

    #[error("thread CRC mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    BadThreadCrc { stored: u16, computed: u16 },

    #[error("bad thread format {0}")]
    BadFormat(u16),

    #[error("malformed compressed data: {0}")]
    BadData(&'static str),

    #[error("buffer overrun")]
    BufferOverrun,

    #[error("buffer underrun: expected {expected} bytes, got {got}")]
    BufferUnderrun { expected: u64, got: u64 },

    #[error("record index {0:?} not found")]
    RecordIdxNotFound(crate::model::RecordIdx),

    #[error("thread index {0:?} not found")]
    ThreadIdxNotFound(crate::model::ThreadIdx),

    #[error("thread id {0:?} not found on record")]
    ThreadIdNotFound(crate::model::ThreadId),

    #[error("a record with that name already exists")]
    RecordExists,

    #[error("archive is read-only")]
    ArchiveReadOnly,

    #[error("cannot modify a thread that already has a pending modification")]
    ModifiedThreadChange,

    #[error("cannot modify a record that already has a conflicting pending modification")]
    ModifiedRecordChange,

    #[error("thread is not pre-sized; only pre-sized threads may be updated in place")]
    NotPresized,

    #[error("update of {len} bytes overflows pre-sized capacity of {capacity} bytes")]
    PresizeOverflow { len: u64, capacity: u64 },

    #[error("archive is open in streaming mode and cannot be modified")]
    Streaming,

    #[error("archive handle is busy (re-entrant call)")]
    Busy,

    #[error("operation skipped by caller")]
    Skipped,

    #[error("operation aborted by caller")]
    Aborted,

    #[error("failed to rename temp file {temp_path:?} over the original archive")]
    Rename { temp_path: std::path::PathBuf },

    #[error("archive is damaged: {0}")]
    Damaged(&'static str),

    #[error("invalid seek: only forward-relative seeks are legal on a streaming archive")]
    FileSeek,

    #[error("invalid filename: {0}")]
    InvalidFilename(&'static str),

    #[error("disk-image size is not a multiple of 512 and does not match storage/extra type")]
    BadDiskImageGeometry,

    #[error("feature not supported: {0}")]
    UnsupportedFeature(&'static str),

    #[error("update source is not newer than the record it would replace")]
    NotNewer,
}
