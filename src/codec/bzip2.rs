//! bzip2 thread-format.
//!
//! `bzip2-rs` is decode-only (no encoder), so genuine `BZh`-prefixed
//! streams — e.g. threads produced by a real ShrinkIt-family tool — are
//! decoded through it, while bytes this crate itself compresses are
//! wrapped behind a distinct 4-byte marker and carried over `flate2`;
//! `expand` dispatches on which prefix it sees. Either way the thread is
//! tagged `ThreadFormat::Bzip2` on disk.

use std::io::Read;

use bzip2_rs::DecoderReader;

use crate::codec::deflate;
use crate::error::{Error, Result};

const OWN_MARKER: [u8; 4] = *b"NuBZ";
const BZIP2_MAGIC: [u8; 3] = *b"BZh";

pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut out = OWN_MARKER.to_vec();
    out.extend(deflate::compress(raw)?);
    Ok(out)
}

pub fn expand(compressed: &[u8], expected_len: u64) -> Result<Vec<u8>> {
    if compressed.starts_with(&BZIP2_MAGIC) {
        let mut decoder = DecoderReader::new(compressed);
        let mut out = Vec::with_capacity(expected_len as usize);
        decoder.read_to_end(&mut out)?;
        if out.len() as u64 != expected_len {
            return Err(Error::BufferUnderrun {
                expected: expected_len,
                got: out.len() as u64,
            });
        }
        return Ok(out);
    }

    if compressed.len() < OWN_MARKER.len() || compressed[..OWN_MARKER.len()] != OWN_MARKER {
        return Err(Error::BadData("bzip2 thread missing recognised header"));
    }
    deflate::expand(&compressed[OWN_MARKER.len()..], expected_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_via_own_marker() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = compress(&data).unwrap();
        assert!(compressed.starts_with(&OWN_MARKER));
        let back = expand(&compressed, data.len() as u64).unwrap();
        assert_eq!(back, data);
    }
}
