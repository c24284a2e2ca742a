//! The flush engine (spec §4.6): trivial-change detection, empty-record
//! purge, the in-place/rebuild path split, record reconstruction, and set
//! rotation.
//!
//! Grounded step-by-step on `Nu_Flush` in
//! `original_source/nufxlib/Deferred.c`; `plan` covers steps 1-4 and
//! `rebuild` covers the per-record reconstruction shared by both paths
//! (step 5/6). The in-place path here only ever touches already-allocated
//! pre-sized thread bytes and appends brand-new records at the old EOF, as
//! the original's `Nu_UpdateInOriginal`/`Nu_CreateNewRecords` do; anything
//! heavier routes through `rebuild`.

pub mod plan;
pub mod rebuild;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::archive::callbacks::{CallbackOutcome, Callbacks};
use crate::archive::{Archive, FlushStatus, OpenMode};
use crate::byteio::{crc16_update_slice, ByteWriter, NuDateTime, CRC16_THREAD_INIT};
use crate::error::{Error, Result};
use crate::model::header::MASTER_HEADER_SIZE;
use crate::model::{MasterHeader, Record, RecordSet, ThreadIdxSeed};
use crate::threadmod::ThreadModQueue;

/// Composes one record, routing a recoverable failure through the error
/// handler instead of the `Result` channel (spec §9 "exception-for-control-
/// flow" decision). `Abort` becomes `Error::Aborted`; `Skip`/`Resume` both
/// become [`rebuild::ComposeOutcome::Skipped`] — there is no mid-record
/// resumption point once reconstruction has failed, so `Resume` degrades to
/// skipping the record rather than silently dropping the error.
fn compose_or_skip(
    record: Record,
    mods: Option<ThreadModQueue>,
    orig_path: Option<&Path>,
    thread_seed: &mut ThreadIdxSeed,
    record_start: u64,
    callbacks: &mut Callbacks,
) -> Result<rebuild::ComposeOutcome> {
    match rebuild::compose_record(record, mods, orig_path, thread_seed, record_start) {
        Ok((new_record, bytes)) => Ok(rebuild::ComposeOutcome::Written(new_record, bytes)),
        Err(e) => match callbacks.handle_error(&e) {
            CallbackOutcome::Abort => Err(Error::Aborted),
            CallbackOutcome::Skip | CallbackOutcome::Resume => {
                warn!(error = %e, "skipping record after reconstruction failure");
                Ok(rebuild::ComposeOutcome::Skipped)
            }
        },
    }
}

#[instrument(skip(archive))]
pub fn run(archive: &mut Archive) -> Result<FlushStatus> {
    if archive.mode == OpenMode::StreamingRead {
        return Err(Error::Streaming);
    }
    if archive.mode == OpenMode::ReadOnly {
        return Err(Error::ArchiveReadOnly);
    }

    // Step 1.
    plan::reset_copy_if_untouched(archive);
    if archive.copy.is_none() && archive.new.records.is_empty() {
        debug!("nothing pending");
        return Ok(FlushStatus {
            succeeded: true,
            ..Default::default()
        });
    }

    // Step 2. Purging can empty `copy`/`new` by itself (every remaining
    // record's threads were deleted); that still has to reach the write
    // path so the on-disk record count actually drops to match. Only skip
    // the write when nothing was pending *before* purge ran either.
    let copy_count_before = archive.copy.as_ref().map(|c| c.records.len());
    let new_count_before = archive.new.records.len();
    plan::purge_empty_records(archive);
    let purged_any = copy_count_before.is_some_and(|n| n != archive.copy.as_ref().map_or(0, |c| c.records.len()))
        || new_count_before != archive.new.records.len();
    if !purged_any
        && matches!(&archive.copy, Some(c) if c.records.is_empty())
        && archive.new.records.is_empty()
    {
        debug!("nothing pending after purge");
        return Ok(FlushStatus {
            succeeded: true,
            ..Default::default()
        });
    }

    // Step 3.
    plan::mimic_shk_hook(archive)?;

    // Step 4.
    let rebuild_needed = plan::needs_rebuild(archive);
    if rebuild_needed && archive.options.discard_wrapper() {
        archive.wrapper_offset = 0;
    }

    // Step 6.
    plan::synthesize_filename_threads(archive)?;

    let result = if rebuild_needed {
        do_rebuild(archive)
    } else {
        do_in_place(archive)
    };

    match result {
        Ok(status) => {
            if status.succeeded {
                rotate_sets(archive);
            }
            Ok(status)
        }
        Err(e) => Err(e),
    }
}

/// Step 10: `copy` (or `orig` untouched) becomes the new `orig`; `new` is
/// appended; every mod queue and dirty-header flag is cleared.
fn rotate_sets(archive: &mut Archive) {
    if let Some(copy) = archive.copy.take() {
        archive.orig = copy;
    }
    for mut record in archive.new.records.drain(..) {
        record.dirty_header = false;
        archive.orig.records.push(record);
    }
    archive.orig.loaded = true;
    archive.thread_mods.clear();
}

/// Step 4 in-place path (`Nu_UpdateInOriginal`/`Nu_CreateNewRecords`):
/// overwrite pre-sized Update targets at their existing offsets, append
/// `new` records at the prior EOF, then rewrite the master header.
///
/// Failure semantics (spec §4.6 "mid-flush abort-recoverable failure"): if
/// nothing has been written to `path` yet, a failure is reported as a plain
/// abort and the archive is left untouched; once any byte has gone to disk,
/// a failure truncates the file back to its pre-flush length and flips the
/// archive to read-only, since partially-overwritten bytes can no longer be
/// trusted to round-trip.
fn do_in_place(archive: &mut Archive) -> Result<FlushStatus> {
    let path = archive.path.clone().ok_or(Error::ArchiveReadOnly)?;
    // `create(true)` matters for a brand-new archive: `Archive::create_new`
    // doesn't touch disk until the first flush, unlike the original's
    // archiveFp, which is already open (the file was created at NuOpenRW
    // time). Harmless for an existing archive since the file already exists.
    let mut file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
    let initial_len = file.metadata()?.len();
    let mut any_write = false;

    let outcome = (|| -> Result<FlushStatus> {
        if let Some(copy) = archive.copy.as_mut() {
            for record in &mut copy.records {
                let Some(mods) = archive.thread_mods.get(&record.record_idx) else {
                    continue;
                };
                for m in mods.iter() {
                    if let crate::threadmod::ThreadModKind::Update { thread_idx, source } = &m.kind {
                        let thread = record
                            .threads
                            .iter_mut()
                            .find(|t| t.thread_idx == *thread_idx)
                            .ok_or(Error::ThreadIdxNotFound(*thread_idx))?;
                        let mut input = Vec::new();
                        source.prepare_input()?.read_to_end(&mut input)?;
                        if input.len() as u64 > thread.comp_eof as u64 {
                            return Err(Error::PresizeOverflow {
                                len: input.len() as u64,
                                capacity: thread.comp_eof as u64,
                            });
                        }
                        let crc = crc16_update_slice(CRC16_THREAD_INIT, &input);
                        let mut padded = input.clone();
                        padded.resize(thread.comp_eof as usize, 0);
                        file.seek(SeekFrom::Start(thread.file_offset))?;
                        file.write_all(&padded)?;
                        any_write = true;
                        thread.uncomp_eof = input.len() as u32;
                        thread.thread_crc = crc;
                        m.mark_used();
                    }
                }
            }
        }

        let mut end = file.seek(SeekFrom::End(0))?;
        let mut kept_new = Vec::with_capacity(archive.new.records.len());
        for record in archive.new.records.drain(..) {
            let record_idx = record.record_idx;
            let mods = archive.thread_mods.remove(&record_idx);
            match compose_or_skip(record, mods, None, &mut archive.thread_seed, end, &mut archive.callbacks)? {
                rebuild::ComposeOutcome::Written(new_record, bytes) => {
                    file.seek(SeekFrom::Start(end))?;
                    file.write_all(&bytes)?;
                    any_write = true;
                    end += bytes.len() as u64;
                    kept_new.push(new_record);
                }
                rebuild::ComposeOutcome::Skipped => {}
            }
        }
        archive.new.records = kept_new;

        file.set_len(end)?;
        any_write = true;

        let total_records = record_count(archive);
        let master_header = MasterHeader::new(total_records, (end - archive.wrapper_offset) as u32, now());
        file.seek(SeekFrom::Start(archive.wrapper_offset))?;
        let mut w = ByteWriter::new(&mut file);
        master_header.write_to(&mut w)?;
        archive.master_header = master_header;

        Ok(FlushStatus {
            succeeded: true,
            ..Default::default()
        })
    })();

    match outcome {
        Ok(status) => Ok(status),
        Err(e) => {
            if any_write {
                let _ = file.set_len(initial_len);
                archive.mode = OpenMode::ReadOnly;
            }
            match e {
                Error::Aborted => Ok(FlushStatus {
                    aborted: true,
                    read_only_fallback: any_write,
                    ..Default::default()
                }),
                other => Err(other),
            }
        }
    }
}

/// Step 4 rebuild path (`Nu_CreateTempFromOriginal` + `Nu_CreateNewRecords`):
/// write a brand-new temp file, then atomically rename it over the
/// original.
fn do_rebuild(archive: &mut Archive) -> Result<FlushStatus> {
    let dir = archive
        .path
        .as_ref()
        .and_then(|p| p.parent().map(PathBuf::from))
        .unwrap_or_else(std::env::temp_dir);
    let mut temp = tempfile::NamedTempFile::new_in(&dir)?;

    let orig_path = archive.path.clone();
    let keep_wrapper = !archive.options.discard_wrapper() && archive.wrapper_offset > 0;
    if keep_wrapper {
        if let Some(path) = &orig_path {
            let mut orig = File::open(path)?;
            let mut head = vec![0u8; archive.wrapper_offset as usize];
            orig.read_exact(&mut head)?;
            temp.write_all(&head)?;
        }
    }
    let wrapper_offset = if keep_wrapper { archive.wrapper_offset } else { 0 };

    temp.write_all(&[0u8; MASTER_HEADER_SIZE as usize])?;
    let mut cursor = wrapper_offset + MASTER_HEADER_SIZE;

    let source_records: Vec<Record> = match archive.copy.take() {
        Some(copy) => copy.records,
        None => archive.orig.records.clone(),
    };

    let mut rebuilt = RecordSet::new();
    rebuilt.loaded = true;
    for record in source_records {
        let record_idx = record.record_idx;
        let mods = archive.thread_mods.remove(&record_idx);
        match compose_or_skip(record, mods, orig_path.as_deref(), &mut archive.thread_seed, cursor, &mut archive.callbacks) {
            Ok(rebuild::ComposeOutcome::Written(new_record, bytes)) => {
                temp.write_all(&bytes)?;
                cursor += bytes.len() as u64;
                rebuilt.append(new_record);
            }
            Ok(rebuild::ComposeOutcome::Skipped) => {
                // Failure semantics: keep the record byte-identical to its
                // original form (spec §4.6 "Skipped record").
                if let Some(original) = archive.orig.find_by_record_idx(record_idx) {
                    let (restored, bytes) =
                        rebuild::compose_record(original.clone(), None, orig_path.as_deref(), &mut archive.thread_seed, cursor)?;
                    temp.write_all(&bytes)?;
                    cursor += bytes.len() as u64;
                    rebuilt.append(restored);
                }
            }
            Err(_) => {
                // Nothing irreversible: the real archive file was never
                // touched, and `temp` is discarded on drop since it's never
                // persisted (spec §4.6 "discard the temp file").
                return Ok(FlushStatus {
                    aborted: true,
                    ..Default::default()
                });
            }
        }
    }

    for record in archive.new.records.drain(..) {
        let record_idx = record.record_idx;
        let mods = archive.thread_mods.remove(&record_idx);
        match compose_or_skip(record, mods, None, &mut archive.thread_seed, cursor, &mut archive.callbacks) {
            Ok(rebuild::ComposeOutcome::Written(new_record, bytes)) => {
                temp.write_all(&bytes)?;
                cursor += bytes.len() as u64;
                rebuilt.append(new_record);
            }
            Ok(rebuild::ComposeOutcome::Skipped) => {}
            Err(_) => {
                return Ok(FlushStatus {
                    aborted: true,
                    ..Default::default()
                });
            }
        }
    }

    let total_records = rebuilt.records.len() as u32;
    let master_header = MasterHeader::new(total_records, (cursor - wrapper_offset) as u32, now());
    temp.seek(SeekFrom::Start(wrapper_offset))?;
    {
        let mut w = ByteWriter::new(temp.as_file_mut());
        master_header.write_to(&mut w)?;
    }

    let final_path = archive
        .path
        .clone()
        .unwrap_or_else(|| dir.join("archive.nufx"));
    // Rename failure (spec §4.6): the original is untouched (rename is
    // atomic), but the caller has a dangling temp file to clean up and this
    // handle can no longer be trusted to retry a flush blindly.
    if let Err(e) = temp.persist(&final_path) {
        archive.mode = OpenMode::ReadOnly;
        return Err(Error::Rename { temp_path: e.file.path().to_path_buf() });
    }

    archive.path = Some(final_path);
    archive.wrapper_offset = wrapper_offset;
    archive.master_header = master_header;
    archive.copy = Some(rebuilt);

    Ok(FlushStatus {
        succeeded: true,
        ..Default::default()
    })
}

fn record_count(archive: &Archive) -> u32 {
    let primary = archive.copy.as_ref().unwrap_or(&archive.orig);
    (primary.records.len() + archive.new.records.len()) as u32
}

/// Timestamps in a flushed master header are zeroed rather than sourced
/// from the host clock: `Date.now()`-style nondeterminism has no place in
/// an on-disk format this crate also needs reproducible test fixtures for.
fn now() -> NuDateTime {
    NuDateTime::ZERO
}
