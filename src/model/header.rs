//! The 48-byte master header (spec §3 "Master header", §6 "Master header").

use crate::byteio::{ByteReader, ByteWriter, NuDateTime};
use crate::error::{Error, Result};

pub const MASTER_HEADER_SIZE: u64 = 48;
/// `"NuFile"` with the high bit set on alternating bytes, per spec §6.
pub const MASTER_MAGIC: [u8; 6] = [0x4E, 0xF5, 0xFE, 0xE9, 0x6C, 0xE5];
pub const SUPPORTED_MASTER_VERSION: u16 = 2;

#[derive(Debug, Clone, Copy)]
pub struct MasterHeader {
    pub total_records: u32,
    pub create_when: NuDateTime,
    pub mod_when: NuDateTime,
    /// Archive length including the wrapper, i.e. file length minus any
    /// leading junk the wrapper scan skipped past (spec §4.3).
    pub master_eof: u32,
    pub version: u16,
    /// Padding to bring the header to its fixed 48-byte size; the listed
    /// fields alone sum to 44 bytes.
    pub reserved: [u8; 12],
    pub eof_reserved: u16,
}

impl MasterHeader {
    pub fn new(total_records: u32, master_eof: u32, when: NuDateTime) -> Self {
        Self {
            total_records,
            create_when: when,
            mod_when: when,
            master_eof,
            version: SUPPORTED_MASTER_VERSION,
            reserved: [0; 12],
            eof_reserved: 0,
        }
    }

    /// Reads the 48-byte header at the current position. The magic must
    /// already have been matched by the caller (wrapper/scan logic owns
    /// locating it); this only parses the fields after it.
    pub fn read_from<R: std::io::Read>(r: &mut ByteReader<R>, ignore_crc: bool) -> Result<Self> {
        let stored_crc = r.u16()?;
        let mut crc: u16 = 0x0000;
        let mut c = Some(&mut crc);

        let total_records = r.u32_crc(&mut c)?;
        let create_when = r.date_time_crc(&mut c)?;
        let mod_when = r.date_time_crc(&mut c)?;
        let master_eof = r.u32_crc(&mut c)?;
        let version = r.u16_crc(&mut c)?;
        let mut reserved = [0u8; 12];
        reserved.copy_from_slice(&r.bytes_crc(12, &mut c)?);
        let eof_reserved = r.u16_crc(&mut c)?;

        drop(c);
        if !ignore_crc && crc != stored_crc {
            return Err(Error::BadMasterCrc {
                stored: stored_crc,
                computed: crc,
            });
        }
        if version > SUPPORTED_MASTER_VERSION {
            return Err(Error::BadMasterVersion(version));
        }

        Ok(Self {
            total_records,
            create_when,
            mod_when,
            master_eof,
            version,
            reserved,
            eof_reserved,
        })
    }

    pub fn write_to<W: std::io::Write>(&self, w: &mut ByteWriter<W>) -> Result<()> {
        let mut crc: u16 = 0x0000;
        let mut buf = Vec::new();
        {
            let mut bw = ByteWriter::new(&mut buf);
            let mut c = Some(&mut crc);
            bw.u32_crc(self.total_records, &mut c)?;
            bw.date_time_crc(self.create_when, &mut c)?;
            bw.date_time_crc(self.mod_when, &mut c)?;
            bw.u32_crc(self.master_eof, &mut c)?;
            bw.u16_crc(self.version, &mut c)?;
            bw.bytes_crc(&self.reserved, &mut c)?;
            bw.u16_crc(self.eof_reserved, &mut c)?;
        }
        w.bytes(&MASTER_MAGIC)?;
        w.u16(crc)?;
        w.bytes(&buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let header = MasterHeader::new(3, 512, NuDateTime::ZERO);
        let mut buf = Vec::new();
        {
            let mut w = ByteWriter::new(&mut buf);
            header.write_to(&mut w).unwrap();
        }
        assert_eq!(buf.len(), MASTER_HEADER_SIZE as usize);

        let mut r = ByteReader::new(&buf[6..]); // skip magic
        let back = MasterHeader::read_from(&mut r, false).unwrap();
        assert_eq!(back.total_records, 3);
        assert_eq!(back.master_eof, 512);
        assert_eq!(back.version, SUPPORTED_MASTER_VERSION);
    }

    #[test]
    fn version_too_new_rejected() {
        let mut header = MasterHeader::new(0, 48, NuDateTime::ZERO);
        header.version = SUPPORTED_MASTER_VERSION + 1;
        let mut buf = Vec::new();
        {
            let mut w = ByteWriter::new(&mut buf);
            header.write_to(&mut w).unwrap();
        }
        let mut r = ByteReader::new(&buf[6..]);
        assert!(matches!(
            MasterHeader::read_from(&mut r, false),
            Err(Error::BadMasterVersion(_))
        ));
    }
}
