//! Record header (de)serialization, access flags, and record sets (spec §3
//! "Record", §3 "Record sets", §6 "Record header").

use bitflags::bitflags;

use crate::byteio::{ByteReader, ByteWriter, NuDateTime};
use crate::error::{Error, Result};
use crate::model::thread::{Thread, THREAD_HEADER_SIZE};
use crate::model::{RecordIdx, ThreadIdx, ThreadIdxSeed};

pub const RECORD_MAGIC: [u8; 4] = [0x4E, 0xF5, 0xE6, 0xD8];
/// Fixed portion of the record header, from `attribCount` through the
/// 2-byte option-list size field (inclusive), not counting the leading
/// magic or CRC.
pub const RECORD_HEADER_FIXED_SIZE: u64 = 2 + 2 + 4 + 2 + 2 + 4 + 4 + 4 + 2 + 8 + 8 + 8 + 2;

bitflags! {
    /// ProDOS-style access bits carried verbatim in the record header's
    /// `recAccess` field (spec §3 "Record": "access flags").
    pub struct AccessFlags: u32 {
        const READ = 0x01;
        const WRITE = 0x02;
        const INVISIBLE = 0x04;
        const RESERVED_1 = 0x08;
        const RESERVED_2 = 0x10;
        const BACKUP_NEEDED = 0x20;
        const RENAME = 0x40;
        const DESTROY = 0x80;
        /// The conventional "fully unlocked" value ShrinkIt writes for new
        /// files: destroy + rename + backup-needed + write + read.
        const UNLOCKED = 0xE3;
    }
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::UNLOCKED
    }
}

/// One logical file (spec §3 "Record").
#[derive(Debug, Clone)]
pub struct Record {
    pub record_idx: RecordIdx,
    pub version: u16,
    pub create_when: NuDateTime,
    pub mod_when: NuDateTime,
    pub archive_when: NuDateTime,
    pub file_sys_id: u16,
    pub file_sys_info: u16,
    pub access: AccessFlags,
    pub file_type: u32,
    pub aux_type: u32,
    pub storage_type: u16,
    /// Opaque GS/OS option list, preserved verbatim on rewrite.
    pub option_list: Vec<u8>,
    /// Opaque trailer between the option list and the legacy filename,
    /// present when `attribCount` names a header larger than this crate's
    /// fixed fields plus option list account for.
    pub extra_bytes: Vec<u8>,
    /// Legacy header-resident filename; empty when a filename thread
    /// carries the name instead.
    pub header_filename: String,
    /// Preferred filename, taken from a filename thread if present, else
    /// mirrors `header_filename`.
    pub thread_filename: Option<String>,
    pub header_crc: u16,
    pub byte_offset: u64,
    /// Verbatim on-disk header length (`attribCount`), kept so
    /// unrecognised optional sections round-trip unchanged.
    pub attrib_count: u16,
    pub threads: Vec<Thread>,
    /// Set when the header must be rewritten even though no thread data
    /// changed (e.g. an access-flag or timestamp update).
    pub dirty_header: bool,
}

impl Record {
    pub fn filename(&self) -> &str {
        self.thread_filename
            .as_deref()
            .unwrap_or(&self.header_filename)
    }

    pub fn total_compressed_len(&self) -> u64 {
        self.threads.iter().map(|t| t.comp_eof as u64).sum()
    }

    /// Reads one record header plus its thread-header array. The leading
    /// 4-byte magic must already have been peeked/consumed by the caller
    /// at `offset` (spec §4.3 "TOC construction" reads records strictly in
    /// sequence, no scanning).
    pub fn read_from<R: std::io::Read>(
        r: &mut ByteReader<R>,
        record_idx: RecordIdx,
        offset: u64,
        thread_seed: &mut ThreadIdxSeed,
        ignore_crc: bool,
    ) -> Result<Record> {
        let stored_crc = r.u16()?;
        let mut crc: u16 = 0x0000;
        let mut c = Some(&mut crc);

        let attrib_count = r.u16_crc(&mut c)?;
        let version = r.u16_crc(&mut c)?;
        let total_threads = r.u32_crc(&mut c)?;
        let file_sys_id = r.u16_crc(&mut c)?;
        let file_sys_info = r.u16_crc(&mut c)?;
        let access = r.u32_crc(&mut c)?;
        let file_type = r.u32_crc(&mut c)?;
        let aux_type = r.u32_crc(&mut c)?;
        let storage_type = r.u16_crc(&mut c)?;
        let create_when = r.date_time_crc(&mut c)?;
        let mod_when = r.date_time_crc(&mut c)?;
        let archive_when = r.date_time_crc(&mut c)?;

        let option_size = r.u16_crc(&mut c)?;
        let option_list = if option_size > 2 {
            r.bytes_crc(option_size as usize - 2, &mut c)?
        } else {
            Vec::new()
        };

        let consumed_before_filename = RECORD_HEADER_FIXED_SIZE + option_list.len() as u64;
        let extra_bytes = if (attrib_count as u64) > consumed_before_filename {
            let extra_len = (attrib_count as u64 - consumed_before_filename) as usize;
            r.bytes_crc(extra_len, &mut c)?
        } else {
            Vec::new()
        };

        let filename_len = r.u16_crc(&mut c)?;
        let filename_bytes = r.bytes_crc(filename_len as usize, &mut c)?;
        let header_filename = String::from_utf8_lossy(&filename_bytes).into_owned();

        let mut threads = Vec::with_capacity(total_threads as usize);
        for _ in 0..total_threads {
            let idx = thread_seed.next();
            threads.push(Thread::read_header(r, idx, &mut c)?);
        }

        drop(c);
        if !ignore_crc && crc != stored_crc {
            return Err(Error::BadRecordCrc {
                stored: stored_crc,
                computed: crc,
            });
        }

        let header_len_on_disk =
            4 + 2 + attrib_count as u64 + 2 + filename_len as u64 + total_threads as u64 * THREAD_HEADER_SIZE;
        let _ = header_len_on_disk; // derivable from attrib_count; not separately stored.

        Ok(Record {
            record_idx,
            version,
            create_when,
            mod_when,
            archive_when,
            file_sys_id,
            file_sys_info,
            access: AccessFlags::from_bits_truncate(access),
            file_type,
            aux_type,
            storage_type,
            option_list,
            extra_bytes,
            header_filename,
            thread_filename: None,
            header_crc: stored_crc,
            byte_offset: offset,
            attrib_count,
            threads,
            dirty_header: false,
        })
    }

    /// Writes the record header plus thread-header array, recomputing the
    /// CRC. `attrib_count` is recomputed from the current option list /
    /// extra-bytes / filename lengths rather than trusted from a prior
    /// read, so edits to those fields stay internally consistent.
    pub fn write_to<W: std::io::Write>(&self, w: &mut ByteWriter<W>) -> Result<()> {
        let option_size = self.option_list.len() as u16 + 2;
        let attrib_count = (RECORD_HEADER_FIXED_SIZE
            + self.option_list.len() as u64
            + self.extra_bytes.len() as u64) as u16;

        let mut crc: u16 = 0x0000;
        let mut buf = Vec::new();
        {
            let mut bw = ByteWriter::new(&mut buf);
            let mut c = Some(&mut crc);
            bw.u16_crc(attrib_count, &mut c)?;
            bw.u16_crc(self.version, &mut c)?;
            bw.u32_crc(self.threads.len() as u32, &mut c)?;
            bw.u16_crc(self.file_sys_id, &mut c)?;
            bw.u16_crc(self.file_sys_info, &mut c)?;
            bw.u32_crc(self.access.bits(), &mut c)?;
            bw.u32_crc(self.file_type, &mut c)?;
            bw.u32_crc(self.aux_type, &mut c)?;
            bw.u16_crc(self.storage_type, &mut c)?;
            bw.date_time_crc(self.create_when, &mut c)?;
            bw.date_time_crc(self.mod_when, &mut c)?;
            bw.date_time_crc(self.archive_when, &mut c)?;
            bw.u16_crc(option_size, &mut c)?;
            bw.bytes_crc(&self.option_list, &mut c)?;
            bw.bytes_crc(&self.extra_bytes, &mut c)?;
            bw.u16_crc(self.header_filename.len() as u16, &mut c)?;
            bw.bytes_crc(self.header_filename.as_bytes(), &mut c)?;
            for thread in &self.threads {
                thread.write_header(&mut bw, &mut c)?;
            }
        }

        w.bytes(&RECORD_MAGIC)?;
        w.u16(crc)?;
        w.bytes(&buf)?;
        Ok(())
    }
}

/// One of `orig` / `copy` / `new` (spec §3 "Record sets"). Realized as an
/// arena `Vec<Record>` with stable `RecordIdx` keys rather than the
/// original's doubly-linked list (DESIGN.md "Cyclic references").
#[derive(Debug, Default, Clone)]
pub struct RecordSet {
    pub records: Vec<Record>,
    /// Distinguishes "empty because unused" from "empty because fully
    /// drained" (spec §4.2).
    pub loaded: bool,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn append(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn find_by_record_idx(&self, idx: RecordIdx) -> Option<&Record> {
        self.records.iter().find(|r| r.record_idx == idx)
    }

    pub fn find_by_record_idx_mut(&mut self, idx: RecordIdx) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.record_idx == idx)
    }

    pub fn find_by_thread_idx(&self, idx: ThreadIdx) -> Option<(&Record, &Thread)> {
        self.records.iter().find_map(|r| {
            r.threads
                .iter()
                .find(|t| t.thread_idx == idx)
                .map(|t| (r, t))
        })
    }

    pub fn remove_by_record_idx(&mut self, idx: RecordIdx) -> Option<Record> {
        let pos = self.records.iter().position(|r| r.record_idx == idx)?;
        Some(self.records.remove(pos))
    }

    /// Transfers this set's records onto `dst` in `O(1)` amortized time
    /// (`Vec::append`), then clears `self`. Mirrors the original's
    /// head/tail/count pointer swap (spec §4.2 "move-all").
    pub fn move_all_into(&mut self, dst: &mut RecordSet) {
        dst.records.append(&mut self.records);
        self.loaded = false;
    }

    /// Deep-copies `src` in place of the record at `idx`, used by the
    /// skipped-record recovery path (spec §4.6 "Failure semantics").
    pub fn replace_record(&mut self, idx: RecordIdx, src: &Record) {
        if let Some(slot) = self.find_by_record_idx_mut(idx) {
            *slot = src.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ThreadClass, ThreadFormat, ThreadId, ThreadKind};

    fn sample_record() -> Record {
        Record {
            record_idx: RecordIdx(0),
            version: 3,
            create_when: NuDateTime::ZERO,
            mod_when: NuDateTime::ZERO,
            archive_when: NuDateTime::ZERO,
            file_sys_id: 1,
            file_sys_info: b'/' as u16,
            access: AccessFlags::UNLOCKED,
            file_type: 0x04,
            aux_type: 0,
            storage_type: 1,
            option_list: Vec::new(),
            extra_bytes: Vec::new(),
            header_filename: String::new(),
            thread_filename: Some("HELLO".to_string()),
            header_crc: 0,
            byte_offset: 0,
            attrib_count: 0,
            threads: vec![crate::model::thread::empty_thread(
                ThreadIdx(0),
                ThreadId::new(ThreadClass::Data, ThreadKind::DATA_FORK),
            )],
            dirty_header: false,
        }
    }

    #[test]
    fn header_roundtrip_verifies_crc() {
        let record = sample_record();
        let mut buf = Vec::new();
        {
            let mut w = ByteWriter::new(&mut buf);
            record.write_to(&mut w).unwrap();
        }

        let mut r = ByteReader::new(&buf[4..]); // skip magic, caller's job
        let mut seed = ThreadIdxSeed::default();
        let back = Record::read_from(&mut r, RecordIdx(0), 0, &mut seed, false).unwrap();
        assert_eq!(back.version, 3);
        assert_eq!(back.threads.len(), 1);
        assert_eq!(back.threads[0].format, ThreadFormat::Uncompressed);
    }

    #[test]
    fn corrupted_crc_detected_unless_ignored() {
        let record = sample_record();
        let mut buf = Vec::new();
        {
            let mut w = ByteWriter::new(&mut buf);
            record.write_to(&mut w).unwrap();
        }
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let mut seed = ThreadIdxSeed::default();
        let mut r = ByteReader::new(&buf[4..]);
        let err = Record::read_from(&mut r, RecordIdx(0), 0, &mut seed, false).unwrap_err();
        assert!(matches!(err, Error::BadRecordCrc { .. }));

        let mut seed = ThreadIdxSeed::default();
        let mut r = ByteReader::new(&buf[4..]);
        assert!(Record::read_from(&mut r, RecordIdx(0), 0, &mut seed, true).is_ok());
    }
}
