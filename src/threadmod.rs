//! The `ThreadMod` journal: deferred Add/Update/Delete modifications
//! attached to a record until the next flush consumes them (spec §3
//! "ThreadMod", §4.4).
//!
//! The tagged-union-plus-`used`-flag shape follows
//! `original_source/nufxlib/NufxLibPriv.h`'s `NuThreadMod`, realized the
//! way the teacher keeps a closure-free enum match at the center of a
//! dispatch (`crates/rar/src/lib.rs`'s header-kind matching), rather than
//! duplicating the `used` bookkeeping into every variant.

use std::cell::Cell;

use crate::error::{Error, Result};
use crate::model::thread::is_presized;
use crate::model::{Record, ThreadFormat, ThreadId, ThreadIdx};
use crate::source_sink::DataSource;

/// One deferred modification to a record's threads (spec §3 "ThreadMod").
#[derive(Debug, Clone)]
pub enum ThreadModKind {
    /// Introduces a new thread of the given id, compressed to
    /// `target_format` (ignored for pre-sized threads, which are always
    /// stored verbatim).
    Add {
        id: ThreadId,
        target_format: ThreadFormat,
        source: DataSource,
        is_presized: bool,
    },
    /// Overwrites the bytes of an existing pre-sized thread only.
    Update { thread_idx: ThreadIdx, source: DataSource },
    /// Removes an existing thread.
    Delete { thread_idx: ThreadIdx, id: ThreadId },
}

/// A journal entry plus the transient `used` flag the flush engine sets
/// exactly once per mod it consumes (spec §3 "ThreadMod" invariants).
#[derive(Debug, Clone)]
pub struct ThreadMod {
    pub kind: ThreadModKind,
    used: Cell<bool>,
}

impl ThreadMod {
    pub fn is_used(&self) -> bool {
        self.used.get()
    }

    pub fn mark_used(&self) {
        self.used.set(true);
    }

    pub fn reset_used(&self) {
        self.used.set(false);
    }

    fn new(kind: ThreadModKind) -> Self {
        ThreadMod {
            kind,
            used: Cell::new(false),
        }
    }
}

/// Per-record queue of pending thread modifications, appended to in
/// enqueue order (spec §4.4: "ordering within a record is preserved for
/// diagnostics only"). Precondition checks happen here, at enqueue time,
/// not at flush time.
#[derive(Debug, Clone, Default)]
pub struct ThreadModQueue {
    mods: Vec<ThreadMod>,
}

impl ThreadModQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadMod> {
        self.mods.iter()
    }

    pub fn reset_all_used(&self) {
        for m in &self.mods {
            m.reset_used();
        }
    }

    /// Queues an Add. Fails if `record` already has a thread of `id` and
    /// `id` is a singleton kind (filename; a second filename thread is
    /// never legal) or if a ThreadMod for that id is already pending.
    pub fn add(
        &mut self,
        record: &Record,
        id: ThreadId,
        target_format: ThreadFormat,
        source: DataSource,
    ) -> Result<()> {
        if id == ThreadId::FILENAME
            && (record.threads.iter().any(|t| t.id() == ThreadId::FILENAME)
                || self.mods.iter().any(|m| matches!(&m.kind, ThreadModKind::Add { id, .. } if *id == ThreadId::FILENAME)))
        {
            return Err(Error::RecordExists);
        }
        let is_presized = is_presized(id);
        self.mods.push(ThreadMod::new(ThreadModKind::Add {
            id,
            target_format,
            source,
            is_presized,
        }));
        Ok(())
    }

    /// Queues an Update of an existing pre-sized thread. Fails if the
    /// thread doesn't exist in `record`, isn't pre-sized, or already has a
    /// pending mod (spec §4.4, §3 "ThreadMod" invariants: "at most one mod
    /// per existing thread").
    pub fn update(&mut self, record: &Record, thread_idx: ThreadIdx, source: DataSource) -> Result<()> {
        let thread = record
            .threads
            .iter()
            .find(|t| t.thread_idx == thread_idx)
            .ok_or(Error::ThreadIdxNotFound(thread_idx))?;
        if !thread.is_presized() {
            return Err(Error::NotPresized);
        }
        self.ensure_untargeted(thread_idx)?;
        self.mods.push(ThreadMod::new(ThreadModKind::Update { thread_idx, source }));
        Ok(())
    }

    /// Queues a Delete of an existing thread.
    pub fn delete(&mut self, record: &Record, thread_idx: ThreadIdx) -> Result<()> {
        let thread = record
            .threads
            .iter()
            .find(|t| t.thread_idx == thread_idx)
            .ok_or(Error::ThreadIdxNotFound(thread_idx))?;
        self.ensure_untargeted(thread_idx)?;
        self.mods.push(ThreadMod::new(ThreadModKind::Delete {
            thread_idx,
            id: thread.id(),
        }));
        Ok(())
    }

    fn ensure_untargeted(&self, thread_idx: ThreadIdx) -> Result<()> {
        let already_targeted = self.mods.iter().any(|m| match &m.kind {
            ThreadModKind::Update { thread_idx: t, .. } => *t == thread_idx,
            ThreadModKind::Delete { thread_idx: t, .. } => *t == thread_idx,
            ThreadModKind::Add { .. } => false,
        });
        if already_targeted {
            Err(Error::ModifiedThreadChange)
        } else {
            Ok(())
        }
    }

    /// Net thread count after applying every queued mod to `existing`
    /// (spec §4.6 Step 2 "empty-record purge": existing − deletes + adds).
    pub fn resulting_thread_count(&self, existing: usize) -> usize {
        let deletes = self
            .mods
            .iter()
            .filter(|m| matches!(m.kind, ThreadModKind::Delete { .. }))
            .count();
        let adds = self
            .mods
            .iter()
            .filter(|m| matches!(m.kind, ThreadModKind::Add { .. }))
            .count();
        existing + adds - deletes.min(existing + adds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::AccessFlags;
    use crate::model::thread::empty_thread;
    use crate::model::{RecordIdx, ThreadClass, ThreadKind};
    use crate::source_sink::SourceMeta;

    fn record_with_one_data_thread() -> Record {
        Record {
            record_idx: RecordIdx(0),
            version: 3,
            create_when: crate::byteio::NuDateTime::ZERO,
            mod_when: crate::byteio::NuDateTime::ZERO,
            archive_when: crate::byteio::NuDateTime::ZERO,
            file_sys_id: 1,
            file_sys_info: b'/' as u16,
            access: AccessFlags::UNLOCKED,
            file_type: 0,
            aux_type: 0,
            storage_type: 0,
            option_list: Vec::new(),
            extra_bytes: Vec::new(),
            header_filename: String::new(),
            thread_filename: Some("F".into()),
            header_crc: 0,
            byte_offset: 0,
            attrib_count: 0,
            threads: vec![empty_thread(ThreadIdx(0), ThreadId::DATA_FORK)],
            dirty_header: false,
        }
    }

    #[test]
    fn update_rejects_non_presized_thread() {
        let record = record_with_one_data_thread();
        let mut queue = ThreadModQueue::new();
        let source = DataSource::from_buffer(b"hi".to_vec(), SourceMeta::new(ThreadFormat::Uncompressed, 2));
        let err = queue.update(&record, ThreadIdx(0), source).unwrap_err();
        assert!(matches!(err, Error::NotPresized));
    }

    #[test]
    fn delete_then_delete_again_rejected() {
        let record = record_with_one_data_thread();
        let mut queue = ThreadModQueue::new();
        queue.delete(&record, ThreadIdx(0)).unwrap();
        let err = queue.delete(&record, ThreadIdx(0)).unwrap_err();
        assert!(matches!(err, Error::ModifiedThreadChange));
    }

    #[test]
    fn delete_missing_thread_rejected() {
        let record = record_with_one_data_thread();
        let mut queue = ThreadModQueue::new();
        let err = queue.delete(&record, ThreadIdx(99)).unwrap_err();
        assert!(matches!(err, Error::ThreadIdxNotFound(_)));
    }

    #[test]
    fn resulting_thread_count_tracks_adds_and_deletes() {
        let record = record_with_one_data_thread();
        let mut queue = ThreadModQueue::new();
        queue.delete(&record, ThreadIdx(0)).unwrap();
        let source = DataSource::from_buffer(b"hi".to_vec(), SourceMeta::new(ThreadFormat::Uncompressed, 2));
        queue
            .add(&record, ThreadId::new(ThreadClass::Data, ThreadKind::RSRC_FORK), ThreadFormat::Uncompressed, source)
            .unwrap();
        assert_eq!(queue.resulting_thread_count(1), 1);
    }
}
