//! Byte-oriented run-length encoding shared by the LZW/1 and LZW/2 framing
//! layers (spec §6): runs of four or more identical bytes collapse to a
//! 3-byte `[escape, byte, count]` triple; a literal occurrence of the
//! escape byte itself is encoded as `[escape, escape, 0]` so the decoder
//! never has to guess.

use crate::error::{Error, Result};

const MIN_RUN: usize = 4;

pub(crate) fn encode(raw: &[u8], escape: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        let mut run = 1;
        while i + run < raw.len() && raw[i + run] == b && run < 255 {
            run += 1;
        }
        if b == escape {
            // Escape byte is always emitted run-encoded, even a lone one,
            // so the decoder can tell it apart from a literal escape.
            let mut remaining = run;
            while remaining > 0 {
                let chunk = remaining.min(255);
                out.push(escape);
                out.push(escape);
                out.push(chunk as u8);
                remaining -= chunk;
            }
        } else if run >= MIN_RUN {
            out.push(escape);
            out.push(b);
            out.push(run as u8);
        } else {
            out.extend(std::iter::repeat(b).take(run));
        }
        i += run;
    }
    out
}

pub(crate) fn decode(data: &[u8], escape: u8) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b == escape {
            if i + 2 >= data.len() {
                return Err(Error::BadData("truncated RLE escape sequence"));
            }
            let val = data[i + 1];
            let count = data[i + 2];
            if count == 0 {
                return Err(Error::BadData("RLE escape count of zero"));
            }
            out.extend(std::iter::repeat(val).take(count as usize));
            i += 3;
        } else {
            out.push(b);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_runs_and_literal_escape() {
        const ESC: u8 = 0xDB;
        let mut data = vec![1, 2, 3];
        data.extend(std::iter::repeat(b'x').take(10));
        data.push(ESC);
        data.extend_from_slice(b"tail");
        let encoded = encode(&data, ESC);
        let decoded = decode(&encoded, ESC).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn short_runs_stay_literal() {
        const ESC: u8 = 0xDB;
        let data = b"aabbccdd".to_vec();
        let encoded = encode(&data, ESC);
        assert_eq!(encoded, data);
        assert_eq!(decode(&encoded, ESC).unwrap(), data);
    }
}
