//! Per-record thread reconstruction shared by the in-place and rebuild
//! flush paths (spec §4.6 Step 5/6): fixed thread ordering, byte-copy of
//! untouched threads, the compression path for Adds, and the pre-sized
//! copy path for Updates/presized Adds. Also applies the Step 7 disk-image
//! geometry fixup once a disk-image thread's final length is known.
//!
//! Grounded on `Nu_ConstructArchiveRecord`/`Nu_ConstructArchiveThreads` in
//! `original_source/nufxlib/Deferred.c`. Unlike the original, which seeks
//! the destination file forward to leave a header-sized hole and patches
//! it in afterwards, this crate assembles each record's bytes in memory
//! first (thread count, and hence header length, is known as soon as the
//! thread plan is built) and only then appends one contiguous write —
//! there is no seek-and-patch step because nothing is written until the
//! whole record is known good.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::byteio::{crc16_update_slice, ByteWriter, CRC16_THREAD_INIT};
use crate::error::{Error, Result};
use crate::model::record::RECORD_HEADER_FIXED_SIZE;
use crate::model::thread::{is_presized, THREAD_HEADER_SIZE};
use crate::model::{Record, Thread, ThreadClass, ThreadFormat, ThreadId, ThreadIdx, ThreadIdxSeed, ThreadKind};
use crate::source_sink::DataSource;
use crate::threadmod::{ThreadMod, ThreadModKind, ThreadModQueue};

/// Distinguishes "this record's bytes are ready" from "the caller's error
/// handler elected to skip this record" without routing control flow
/// through the `Error` channel (spec §9 "exception-for-control-flow"
/// decision: `Result` carries genuine I/O/CRC/logic failures only).
pub(super) enum ComposeOutcome {
    Written(Record, Vec<u8>),
    Skipped,
}

enum ThreadPlan<'a> {
    CopyExisting(&'a Thread),
    UpdateExisting { old: &'a Thread, source: DataSource },
    Add {
        id: ThreadId,
        target_format: ThreadFormat,
        source: DataSource,
        is_presized: bool,
        used_flag: &'a ThreadMod,
    },
}

fn plan_id(plan: &ThreadPlan) -> ThreadId {
    match plan {
        ThreadPlan::CopyExisting(t) => t.id(),
        ThreadPlan::UpdateExisting { old, .. } => old.id(),
        ThreadPlan::Add { id, .. } => *id,
    }
}

/// Fixed emission order (spec §4.6 Step 5): filename, comment(s),
/// data-fork, disk-image, resource-fork, then everything else.
fn order_rank(id: ThreadId) -> u8 {
    if id.class == ThreadClass::Filename {
        0
    } else if id.class == ThreadClass::Message && id.kind == ThreadKind::COMMENT {
        1
    } else if id == ThreadId::DATA_FORK {
        2
    } else if id == ThreadId::DISK_IMAGE {
        3
    } else if id == ThreadId::RSRC_FORK {
        4
    } else {
        5
    }
}

fn plan_threads<'a>(record: &'a Record, mods: Option<&'a ThreadModQueue>) -> Vec<ThreadPlan<'a>> {
    let mut deleted: std::collections::HashMap<ThreadIdx, &ThreadMod> = std::collections::HashMap::new();
    let mut updates: std::collections::HashMap<ThreadIdx, (&DataSource, &ThreadMod)> = std::collections::HashMap::new();
    let mut adds = Vec::new();
    if let Some(mods) = mods {
        for m in mods.iter() {
            match &m.kind {
                ThreadModKind::Delete { thread_idx, .. } => {
                    deleted.insert(*thread_idx, m);
                }
                ThreadModKind::Update { thread_idx, source } => {
                    updates.insert(*thread_idx, (source, m));
                }
                ThreadModKind::Add {
                    id,
                    target_format,
                    source,
                    is_presized,
                } => {
                    adds.push(ThreadPlan::Add {
                        id: *id,
                        target_format: *target_format,
                        source: source.clone(),
                        is_presized: *is_presized,
                        used_flag: m,
                    });
                }
            }
        }
    }

    let mut plans: Vec<ThreadPlan> = Vec::new();
    let mut seen_filename = false;
    for t in &record.threads {
        if let Some(used_flag) = deleted.get(&t.thread_idx) {
            used_flag.mark_used();
            continue;
        }
        if t.id().class == ThreadClass::Filename {
            if seen_filename {
                continue;
            }
            seen_filename = true;
        }
        if let Some((source, used_flag)) = updates.get(&t.thread_idx) {
            used_flag.mark_used();
            plans.push(ThreadPlan::UpdateExisting { old: t, source: (*source).clone() });
        } else {
            plans.push(ThreadPlan::CopyExisting(t));
        }
    }
    for add in adds {
        if let ThreadPlan::Add { id, .. } = &add {
            if id.class == ThreadClass::Filename {
                if seen_filename {
                    continue;
                }
                seen_filename = true;
            }
        }
        plans.push(add);
    }

    plans.sort_by_key(|p| order_rank(plan_id(p)));
    plans
}

fn presized_bytes(content: &[u8], capacity: u64) -> Result<(Vec<u8>, u32, u32, u16)> {
    if content.len() as u64 > capacity {
        return Err(Error::PresizeOverflow {
            len: content.len() as u64,
            capacity,
        });
    }
    let mut bytes = content.to_vec();
    bytes.resize(capacity as usize, 0);
    let crc = crc16_update_slice(CRC16_THREAD_INIT, content);
    Ok((bytes, content.len() as u32, capacity as u32, crc))
}

fn default_capacity_for(id: ThreadId) -> u64 {
    if id.class == ThreadClass::Filename {
        super::plan::DEFAULT_FILENAME_CAPACITY
    } else {
        super::plan::DEFAULT_COMMENT_CAPACITY
    }
}

fn read_exact_at(path: &Path, offset: u64, len: u64) -> Result<Vec<u8>> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    f.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reconstructs one record: resolves its thread plan, produces the final
/// thread bytes and headers, and returns the new [`Record`] (with
/// up-to-date `threads`) plus the bytes to append to the destination
/// (header-and-thread-headers followed by thread payloads).
///
/// `record_start` is the absolute offset this record's bytes will occupy
/// in the destination file, used only to compute each thread's
/// `file_offset`.
pub(super) fn compose_record(
    mut record: Record,
    mods: Option<ThreadModQueue>,
    orig_path: Option<&Path>,
    thread_seed: &mut ThreadIdxSeed,
    record_start: u64,
) -> Result<(Record, Vec<u8>)> {
    let plans = plan_threads(&record, mods.as_ref());
    if plans.is_empty() {
        return Err(Error::BadRecord("record has no threads to reconstruct"));
    }

    let mut new_threads = Vec::with_capacity(plans.len());
    let mut data = Vec::new();
    let mut disk_image_len: Option<u32> = None;

    for plan in plans {
        match plan {
            ThreadPlan::CopyExisting(old) => {
                let bytes = match orig_path {
                    Some(path) => read_exact_at(path, old.file_offset, old.comp_eof as u64)?,
                    None => Vec::new(),
                };
                data.extend_from_slice(&bytes);
                new_threads.push(old.clone());
            }
            ThreadPlan::UpdateExisting { old, source } => {
                let mut input = Vec::new();
                source.prepare_input()?.read_to_end(&mut input)?;
                let (bytes, uncomp_eof, comp_eof, crc) = presized_bytes(&input, old.comp_eof as u64)?;
                data.extend_from_slice(&bytes);
                new_threads.push(Thread {
                    thread_idx: old.thread_idx,
                    class: old.class,
                    format: ThreadFormat::Uncompressed,
                    kind: old.kind,
                    thread_crc: crc,
                    uncomp_eof,
                    comp_eof,
                    file_offset: 0,
                    actual_eof_after_extraction: 0,
                    used: false,
                });
            }
            ThreadPlan::Add {
                id,
                target_format,
                source,
                is_presized: forced_presized,
                used_flag,
            } => {
                used_flag.mark_used();
                let thread_idx = thread_seed.next();
                if forced_presized || is_presized(id) {
                    let mut input = Vec::new();
                    source.prepare_input()?.read_to_end(&mut input)?;
                    let capacity = source.meta.other_len.unwrap_or_else(|| default_capacity_for(id));
                    let (bytes, uncomp_eof, comp_eof, crc) = presized_bytes(&input, capacity)?;
                    data.extend_from_slice(&bytes);
                    if id == ThreadId::DISK_IMAGE {
                        disk_image_len = Some(uncomp_eof);
                    }
                    new_threads.push(Thread {
                        thread_idx,
                        class: id.class,
                        format: ThreadFormat::Uncompressed,
                        kind: id.kind,
                        thread_crc: crc,
                        uncomp_eof,
                        comp_eof,
                        file_offset: 0,
                        actual_eof_after_extraction: 0,
                        used: false,
                    });
                } else {
                    let input = source.prepare_input()?;
                    let (outcome, bytes) =
                        crate::codec::compress_with_fallback(input, target_format, source.data_len())?;
                    data.extend_from_slice(&bytes);
                    if id == ThreadId::DISK_IMAGE {
                        disk_image_len = Some(source.data_len() as u32);
                    }
                    new_threads.push(Thread {
                        thread_idx,
                        class: id.class,
                        format: outcome.format,
                        kind: id.kind,
                        thread_crc: outcome.crc,
                        uncomp_eof: source.data_len() as u32,
                        comp_eof: outcome.dst_len as u32,
                        file_offset: 0,
                        actual_eof_after_extraction: 0,
                        used: false,
                    });
                }
            }
        }
    }

    // Step 7: storageType x extraType must equal the disk image's
    // uncompressed length; re-derive the 512-byte-block geometry rather than
    // fail when a freshly added disk image doesn't already agree.
    if let Some(len) = disk_image_len {
        let declared = record.storage_type as u64 * record.aux_type as u64;
        if declared != len as u64 {
            if len % 512 == 0 {
                record.storage_type = 512;
                record.aux_type = len / 512;
            } else {
                return Err(Error::BadRecord("disk image length is not a multiple of 512"));
            }
        }
    }

    let filename_len = record.header_filename.len() as u64;
    let attrib_count = RECORD_HEADER_FIXED_SIZE + record.option_list.len() as u64 + record.extra_bytes.len() as u64;
    let header_len = 4 + 2 + attrib_count + 2 + filename_len + new_threads.len() as u64 * THREAD_HEADER_SIZE;

    let mut running = 0u64;
    for t in &mut new_threads {
        t.file_offset = record_start + header_len + running;
        running += t.comp_eof as u64;
    }

    record.threads = new_threads;
    record.byte_offset = record_start;
    record.dirty_header = false;

    let mut header_bytes = Vec::new();
    {
        let mut w = ByteWriter::new(&mut header_bytes);
        record.write_to(&mut w)?;
    }
    debug_assert_eq!(header_bytes.len() as u64, header_len);

    header_bytes.extend_from_slice(&data);
    Ok((record, header_bytes))
}
