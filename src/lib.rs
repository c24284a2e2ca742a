//! Read, create, and modify NuFX (ShrinkIt) archives.
//!
//! <https://nulib.com> documents the on-disk format this crate implements.

mod byteio;
mod eol;

pub mod archive;
pub mod codec;
pub mod error;
pub mod flush;
pub mod model;
pub mod source_sink;
pub mod threadmod;
pub mod wrapper;

pub use archive::callbacks::{CallbackOutcome, Callbacks};
pub use archive::options::Options;
pub use archive::{Archive, FlushStatus, OpenMode};
pub use eol::{EolMode, TargetEol};
pub use error::{Error, Result};
pub use model::{AccessFlags, Record, RecordIdx, Thread, ThreadFormat, ThreadId, ThreadIdx};
pub use source_sink::{DataSink, DataSource, SourceMeta};

use std::sync::OnceLock;

static GLOBAL_MESSAGE_HANDLER: OnceLock<fn(&str)> = OnceLock::new();

/// Installs a process-wide handler for diagnostic messages raised before any
/// archive handle exists (e.g. failure to even open a file). Per-archive
/// diagnostics go through [`Callbacks::message_handler`] instead; this is
/// only for the handful of pre-archive failure paths. Can only be set once
/// per process; later calls are ignored.
pub fn set_global_message_handler(handler: fn(&str)) {
    let _ = GLOBAL_MESSAGE_HANDLER.set(handler);
}

pub(crate) fn report_global_message(msg: &str) {
    if let Some(handler) = GLOBAL_MESSAGE_HANDLER.get() {
        handler(msg);
    }
}
