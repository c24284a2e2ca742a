//! LZW/2 thread-format framing (spec §6).
//!
//! LZW/2 drops the per-block chunk-CRC and volume/escape header that LZW/1
//! carries: each block is simply a 2-byte little-endian length, whose high
//! bit flags whether the LZW stage was used for that block (0 here — this
//! implementation carries the framing contract and always writes RLE-only
//! payloads, the LZW table persisting across blocks being out of scope),
//! followed by that many bytes of data. Blocks cover up to 4096 bytes of
//! uncompressed content, same as LZW/1, purely as an implementation choice
//! since LZW/2 itself places no block-size requirement on this framing.

use crate::codec::rle;
use crate::error::{Error, Result};

const BLOCK_SIZE: usize = 4096;
const ESCAPE_BYTE: u8 = 0xdb;
const LZW_USED_BIT: u16 = 0x8000;
const LEN_MASK: u16 = 0x7fff;

pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    if raw.is_empty() {
        write_block(&mut out, &[])?;
    } else {
        for block in raw.chunks(BLOCK_SIZE) {
            write_block(&mut out, block)?;
        }
    }
    Ok(out)
}

fn write_block(out: &mut Vec<u8>, block: &[u8]) -> Result<()> {
    let rle_data = rle::encode(block, ESCAPE_BYTE);
    if rle_data.len() as u16 & LZW_USED_BIT != 0 {
        return Err(Error::BadData("LZW/2 block exceeds the framing length field"));
    }
    out.extend_from_slice(&(rle_data.len() as u16).to_le_bytes());
    out.extend_from_slice(&rle_data);
    Ok(())
}

pub fn expand(compressed: &[u8], expected_len: u64) -> Result<Vec<u8>> {
    let mut pos = 0usize;
    let mut out = Vec::with_capacity(expected_len as usize);

    while (out.len() as u64) < expected_len {
        if pos + 2 > compressed.len() {
            return Err(Error::BufferOverrun);
        }
        let raw_len = u16::from_le_bytes([compressed[pos], compressed[pos + 1]]);
        let lzw_used = raw_len & LZW_USED_BIT != 0;
        let len = (raw_len & LEN_MASK) as usize;
        pos += 2;
        if lzw_used {
            return Err(Error::UnsupportedFeature(
                "LZW/2 threads with the LZW stage engaged are not decodable by this build",
            ));
        }
        if pos + len > compressed.len() {
            return Err(Error::BufferOverrun);
        }
        let block_data = &compressed[pos..pos + len];
        pos += len;
        out.extend(rle::decode(block_data, ESCAPE_BYTE)?);
    }

    if out.len() as u64 != expected_len {
        return Err(Error::BufferUnderrun {
            expected: expected_len,
            got: out.len() as u64,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_single_block() {
        let data = b"xyzxyzxyz".repeat(30);
        let compressed = compress(&data).unwrap();
        let back = expand(&compressed, data.len() as u64).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn roundtrip_multi_block() {
        let data: Vec<u8> = (0..(BLOCK_SIZE * 3 + 11)).map(|i| (i % 97) as u8).collect();
        let compressed = compress(&data).unwrap();
        let back = expand(&compressed, data.len() as u64).unwrap();
        assert_eq!(back, data);
    }
}
