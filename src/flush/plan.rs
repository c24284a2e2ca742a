//! Trivial-change detection, empty-record purge, the ShrinkIt-compatibility
//! hook, and in-place-vs-rebuild path selection (spec §4.6 steps 1-4).
//!
//! Grounded on `Nu_ResetCopySetIfUntouched`, `Nu_PurgeEmptyRecords`,
//! `Nu_AddCommentToFirstNewRecord`, and `Nu_NoHeavyUpdates` in
//! `original_source/nufxlib/Deferred.c`, realized without the doubly-linked
//! record-set walk the original uses (this crate's record sets are plain
//! `Vec<Record>`, see `model::record::RecordSet`).

use crate::archive::options::OptionFlags;
use crate::archive::Archive;
use crate::error::Result;
use crate::model::{ThreadClass, ThreadFormat, ThreadId};
use crate::source_sink::{DataSource, SourceMeta};
use crate::threadmod::ThreadModKind;

/// Default pre-sized comment capacity the "mimic ShrinkIt" hook uses
/// (`kNuDefaultCommentSize`).
pub const DEFAULT_COMMENT_CAPACITY: u64 = 200;
/// Default pre-sized filename capacity used when §4.6 Step 6 synthesizes a
/// filename thread for a `new` record that has none (`kNuDefaultFilenameThreadSize`).
pub const DEFAULT_FILENAME_CAPACITY: u64 = 32;
/// Name given to a `new` record with no filename at all (`kNuDefaultRecordName`).
pub const DEFAULT_RECORD_NAME: &str = "UNKNOWN";

/// Step 1: discards `copy` if every record in it is an unmodified,
/// same-count mirror of `orig` (spec §4.6 Step 1).
pub fn reset_copy_if_untouched(archive: &mut Archive) {
    let untouched = match &archive.copy {
        Some(copy) => {
            let mods_empty = archive.thread_mods.values().all(|q| q.is_empty());
            let headers_clean = copy.records.iter().all(|r| !r.dirty_header);
            mods_empty && headers_clean && copy.records.len() == archive.orig.records.len()
        }
        None => false,
    };
    if untouched {
        archive.copy = None;
    }
}

/// Step 2: drops records from `copy`/`new` whose post-mod thread count
/// reaches zero (spec §4.6 Step 2).
pub fn purge_empty_records(archive: &mut Archive) {
    let thread_mods = &archive.thread_mods;
    let purge = |set: &mut crate::model::RecordSet| {
        set.records.retain(|r| {
            let existing = r.threads.len();
            let resulting = match thread_mods.get(&r.record_idx) {
                Some(q) => q.resulting_thread_count(existing),
                None => existing,
            };
            resulting > 0
        });
    };
    if let Some(copy) = archive.copy.as_mut() {
        purge(copy);
    }
    purge(&mut archive.new);
}

/// Step 3: attaches a default empty pre-sized comment thread to the first
/// `new` record if it has none yet (spec §4.6 Step 3).
pub fn mimic_shk_hook(archive: &mut Archive) -> Result<()> {
    if !archive.options.flags.contains(OptionFlags::MIMIC_SHK) {
        return Ok(());
    }
    let Some(first) = archive.new.records.first() else {
        return Ok(());
    };
    let record_idx = first.record_idx;
    let has_comment = archive
        .thread_mods
        .get(&record_idx)
        .map(|q| {
            q.iter().any(|m| {
                matches!(&m.kind, ThreadModKind::Add { id, .. } if *id == ThreadId::COMMENT)
            })
        })
        .unwrap_or(false);
    if has_comment {
        return Ok(());
    }
    let source = DataSource::from_buffer(Vec::new(), SourceMeta::new(ThreadFormat::Uncompressed, 0));
    let mut source = source;
    source.set_other_len(DEFAULT_COMMENT_CAPACITY);
    let mods = archive.thread_mods.entry(record_idx).or_default();
    mods.add(first, ThreadId::COMMENT, ThreadFormat::Uncompressed, source)
}

/// Step 6: every `new` record without an explicit filename ThreadMod gets
/// one synthesized from its stored filename, padded to the larger of the
/// name's length and the default capacity (spec §4.6 Step 6,
/// `Nu_CreateNewRecords`'s "if there's no filename thread, make one").
pub fn synthesize_filename_threads(archive: &mut Archive) -> Result<()> {
    let record_idxs: Vec<_> = archive.new.records.iter().map(|r| r.record_idx).collect();
    for record_idx in record_idxs {
        let has_filename_thread = archive
            .thread_mods
            .get(&record_idx)
            .map(|q| {
                q.iter().any(|m| {
                    matches!(&m.kind, ThreadModKind::Add { id, .. } if id.class == ThreadClass::Filename)
                })
            })
            .unwrap_or(false);
        if has_filename_thread {
            continue;
        }
        let record = archive
            .new
            .records
            .iter()
            .find(|r| r.record_idx == record_idx)
            .expect("record_idx collected from archive.new.records above");
        let name = match record.thread_filename.as_deref() {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => DEFAULT_RECORD_NAME.to_string(),
        };
        let name_bytes = name.into_bytes();
        let len = name_bytes.len() as u64;
        let capacity = len.max(DEFAULT_FILENAME_CAPACITY);
        let mut source = DataSource::from_buffer(name_bytes, SourceMeta::new(ThreadFormat::Uncompressed, len));
        source.set_other_len(capacity);
        let mods = archive.thread_mods.entry(record_idx).or_default();
        mods.add(record, ThreadId::FILENAME, ThreadFormat::Uncompressed, source)?;
    }
    Ok(())
}

/// Step 4: chooses the in-place path when every pending mod on `copy` is an
/// `Update` and the caller hasn't asked to discard the wrapper (spec §4.6
/// Step 4, `Nu_NoHeavyUpdates`).
pub fn needs_rebuild(archive: &Archive) -> bool {
    if archive.options.discard_wrapper() {
        return true;
    }
    let Some(copy) = &archive.copy else {
        return false;
    };
    for record in &copy.records {
        if record.dirty_header {
            return true;
        }
        if let Some(mods) = archive.thread_mods.get(&record.record_idx) {
            if mods.iter().any(|m| !matches!(m.kind, ThreadModKind::Update { .. })) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::callbacks::Callbacks;
    use crate::archive::options::Options;
    use crate::archive::OpenMode;
    use crate::byteio::NuDateTime;
    use crate::model::header::MASTER_HEADER_SIZE;
    use crate::model::record::AccessFlags;
    use crate::model::thread::empty_thread;
    use crate::model::{MasterHeader, Record, RecordIdx, RecordIdxSeed, RecordSet, ThreadIdx, ThreadIdxSeed};
    use std::cell::Cell;

    fn bare_archive() -> Archive {
        let mut orig = RecordSet::new();
        orig.loaded = true;
        Archive {
            mode: OpenMode::ReadWrite,
            wrapper_kind: crate::wrapper::WrapperKind::None,
            wrapper_offset: 0,
            master_header: MasterHeader::new(0, MASTER_HEADER_SIZE as u32, NuDateTime::ZERO),
            orig,
            copy: None,
            new: RecordSet::new(),
            thread_mods: Default::default(),
            record_seed: RecordIdxSeed::default(),
            thread_seed: ThreadIdxSeed::default(),
            options: Options::new(),
            callbacks: Callbacks::new(),
            path: None,
            busy: Cell::new(false),
        }
    }

    fn one_thread_record(idx: RecordIdx) -> Record {
        Record {
            record_idx: idx,
            version: 3,
            create_when: NuDateTime::ZERO,
            mod_when: NuDateTime::ZERO,
            archive_when: NuDateTime::ZERO,
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
            threads: vec![empty_thread(ThreadIdx(0), crate::model::ThreadId::DATA_FORK)],
            dirty_header: false,
        }
    }

    #[test]
    fn untouched_copy_is_discarded() {
        let mut archive = bare_archive();
        let idx = archive.record_seed.next();
        archive.orig.append(one_thread_record(idx));
        archive.copy = Some(archive.orig.clone());
        reset_copy_if_untouched(&mut archive);
        assert!(archive.copy.is_none());
    }

    #[test]
    fn in_place_eligible_for_update_only_mods() {
        let mut archive = bare_archive();
        let idx = archive.record_seed.next();
        let mut record = one_thread_record(idx);
        record.threads = vec![empty_thread(ThreadIdx(0), crate::model::ThreadId::FILENAME)];
        archive.orig.append(record.clone());
        archive.copy = Some(archive.orig.clone());
        let source = DataSource::from_buffer(b"hi".to_vec(), SourceMeta::new(ThreadFormat::Uncompressed, 2));
        archive
            .thread_mods
            .entry(idx)
            .or_default()
            .update(&record, ThreadIdx(0), source)
            .unwrap();
        assert!(!needs_rebuild(&archive));
    }
}
