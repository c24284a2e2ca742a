//! Archive open: wrapper detection, master-header parse, TOC construction
//! (spec §4.3). Seekable opens (`open_file`) and the streaming-read path
//! (`open_streaming`) are kept as separate functions rather than one
//! generic over `Seek`, mirroring the original's split between random-
//! access and sequential consumption (spec §4.3 "In streaming mode, the
//! TOC is built incrementally... seeks are not used").

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::archive::{Archive, OpenMode};
use crate::archive::options::Options;
use crate::byteio::{streaming_skip_forward, ByteReader};
use crate::error::{Error, Result};
use crate::model::header::MASTER_MAGIC;
use crate::model::record::RECORD_MAGIC;
use crate::model::{MasterHeader, Record, RecordIdxSeed, RecordSet, ThreadClass, ThreadIdxSeed};
use crate::wrapper::{self, WrapperKind};

fn assign_thread_offsets(record: &mut Record, data_start: u64) -> u64 {
    let mut offset = data_start;
    for thread in &mut record.threads {
        thread.file_offset = offset;
        offset += thread.comp_eof as u64;
    }
    offset
}

/// Populates `thread_filename` from the record's filename thread, if it
/// has one (spec §3 "Record": two filename slots, "one taken from a
/// filename thread (preferred)"). Filename threads are always pre-sized
/// and stored uncompressed, so this is a direct read at a known offset,
/// not a decompression.
fn read_filename_thread(file: &mut File, record: &mut Record) -> Result<()> {
    let Some(thread) = record.threads.iter().find(|t| t.class == ThreadClass::Filename) else {
        return Ok(());
    };
    file.seek(SeekFrom::Start(thread.file_offset))?;
    let mut buf = vec![0u8; thread.uncomp_eof as usize];
    file.read_exact(&mut buf)?;
    record.thread_filename = Some(String::from_utf8_lossy(&buf).into_owned());
    Ok(())
}

/// Opens a seekable file for read-only or read-write access.
pub fn open_file(path: impl AsRef<Path>, mode: OpenMode, options: Options) -> Result<Archive> {
    let path = path.as_ref().to_path_buf();
    let mut file = File::open(&path)?;

    let probe_len = options.junk_skip_max.max(MASTER_MAGIC.len() as u64 + wrapper::BINARY2_BLOCK_SIZE);
    let mut head = vec![0u8; probe_len as usize];
    let n = read_up_to(&mut file, &mut head)?;
    head.truncate(n);

    let (wrapper_kind, wrapper_offset) = wrapper::detect(&head).ok_or(Error::NotNufx)?;

    file.seek(SeekFrom::Start(wrapper_offset))?;
    let mut reader = ByteReader::new(&mut file);
    let magic = reader.bytes(MASTER_MAGIC.len())?;
    if magic != MASTER_MAGIC {
        return Err(Error::NotNufx);
    }
    let master_header = MasterHeader::read_from(&mut reader, options.ignore_crc())?;

    let mut orig = RecordSet::new();
    orig.loaded = true;
    let mut record_seed = RecordIdxSeed::default();
    let mut thread_seed = ThreadIdxSeed::default();

    let mut pos = wrapper_offset + crate::model::header::MASTER_HEADER_SIZE;
    for _ in 0..master_header.total_records {
        file.seek(SeekFrom::Start(pos))?;
        let mut reader = ByteReader::new(&mut file);
        let magic = reader.bytes(RECORD_MAGIC.len())?;
        if magic != RECORD_MAGIC {
            return Err(Error::RecordHeaderNotFound(pos));
        }
        let record_idx = record_seed.next();
        let header_start = pos;
        let mut record = Record::read_from(
            &mut reader,
            record_idx,
            header_start,
            &mut thread_seed,
            options.ignore_crc(),
        )?;
        let data_start = reader.stream_position()?;
        let data_end = assign_thread_offsets(&mut record, data_start);
        read_filename_thread(&mut file, &mut record)?;
        orig.append(record);
        pos = data_end;
    }

    Ok(Archive {
        mode,
        wrapper_kind,
        wrapper_offset,
        master_header,
        orig,
        copy: None,
        new: RecordSet::new(),
        thread_mods: Default::default(),
        record_seed,
        thread_seed,
        options,
        callbacks: Default::default(),
        path: Some(path),
        busy: std::cell::Cell::new(false),
    })
}

/// Creates a brand-new, empty archive backed by `path` (not yet written to
/// disk until the first flush).
pub fn create_new(path: impl Into<PathBuf>, options: Options) -> Archive {
    let mut orig = RecordSet::new();
    orig.loaded = true;
    Archive {
        mode: OpenMode::ReadWrite,
        wrapper_kind: WrapperKind::None,
        wrapper_offset: 0,
        master_header: MasterHeader::new(0, crate::model::header::MASTER_HEADER_SIZE as u32, crate::byteio::NuDateTime::ZERO),
        orig,
        copy: None,
        new: RecordSet::new(),
        thread_mods: Default::default(),
        record_seed: RecordIdxSeed::default(),
        thread_seed: ThreadIdxSeed::default(),
        options,
        callbacks: Default::default(),
        path: Some(path.into()),
        busy: std::cell::Cell::new(false),
    }
}

/// Opens a non-seekable stream in streaming-read mode (spec §4.3
/// "streaming mode"). The whole TOC is built incrementally by consuming
/// the stream once; no modification is possible afterwards (spec §6
/// "Streaming mode rejects any modification with a distinct error").
pub fn open_streaming<R: Read>(mut reader: R, options: Options) -> Result<Archive> {
    let mut head = vec![0u8; options.junk_skip_max as usize];
    let n = read_up_to(&mut reader, &mut head)?;
    head.truncate(n);
    let (wrapper_kind, wrapper_offset) = wrapper::detect(&head).ok_or(Error::NotNufx)?;

    // `head` already consumed `wrapper_offset + magic` worth of bytes from
    // `reader`; resume past what we've buffered but not yet parsed.
    let mut br = ByteReader::new(std::io::Cursor::new(head).chain(reader));
    br.bytes(wrapper_offset as usize)?; // skip wrapper / leading junk
    br.bytes(MASTER_MAGIC.len())?; // already matched by wrapper::detect
    let master_header = MasterHeader::read_from(&mut br, options.ignore_crc())?;

    let mut orig = RecordSet::new();
    orig.loaded = true;
    let mut record_seed = RecordIdxSeed::default();
    let mut thread_seed = ThreadIdxSeed::default();

    for _ in 0..master_header.total_records {
        let magic = br.bytes(RECORD_MAGIC.len())?;
        if magic != RECORD_MAGIC {
            return Err(Error::RecordHeaderNotFound(0));
        }
        let record_idx = record_seed.next();
        let mut record = Record::read_from(&mut br, record_idx, 0, &mut thread_seed, options.ignore_crc())?;
        assign_thread_offsets(&mut record, 0);
        let total_thread_bytes: u64 = record.threads.iter().map(|t| t.comp_eof as u64).sum();
        streaming_skip_forward(&mut br.inner, total_thread_bytes)?;
        orig.append(record);
    }

    Ok(Archive {
        mode: OpenMode::StreamingRead,
        wrapper_kind,
        wrapper_offset,
        master_header,
        orig,
        copy: None,
        new: RecordSet::new(),
        thread_mods: Default::default(),
        record_seed,
        thread_seed,
        options,
        callbacks: Default::default(),
        path: None,
        busy: std::cell::Cell::new(false),
    })
}

fn read_up_to(r: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = r.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
