//! The "stored" pseudo-codec: an identity pass-through, used both as a
//! real thread-format and as the universal fallback target (spec §4.5
//! "Fallback to stored").

use crate::error::Result;

pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    Ok(raw.to_vec())
}

pub fn expand(compressed: &[u8]) -> Result<Vec<u8>> {
    Ok(compressed.to_vec())
}
