//! Deflate thread-format, via `flate2` (teacher dependency, already
//! exercised for ZIP's `CompressionType::Deflate` in
//! `crates/zip/src/compression/mod.rs`).

use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

pub fn expand(compressed: &[u8], expected_len: u64) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(compressed);
    let mut out = Vec::with_capacity(expected_len as usize);
    decoder.read_to_end(&mut out)?;
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
    fn roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(4);
        let compressed = compress(&data).unwrap();
        let back = expand(&compressed, data.len() as u64).unwrap();
        assert_eq!(back, data);
    }
}
