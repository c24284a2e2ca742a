//! Binary II / Self-Extracting wrapper detection (spec §4.3, §6 "Wrapper
//! formats").
//!
//! Generalizes the teacher's `find_next_signature` scanning idiom
//! (`crates/zip/src/header/central_directory_file.rs`) from a backward
//! scan for a trailing signature to a forward probe for a magic at a
//! known offset, since NuFX wrappers (unlike a ZIP end-of-central-
//! directory record) are always anchored at byte 0.

use crate::model::header::MASTER_MAGIC;

/// Binary II block size; wrapper padding is rounded up to a multiple of
/// this (spec §2.2, `kNuBinary2BlockSize`).
pub const BINARY2_BLOCK_SIZE: u64 = 128;

const BINARY2_MAGIC_OFFSET: usize = 0;
const BINARY2_MAGIC: [u8; 2] = [0x0a, 0x47];
/// Offset of the NuFX magic within a Self-Extracting wrapper, historically
/// fixed by the size of the ShrinkIt.SEA loader stub (spec §2.2,
/// `kNuSEAOffset`).
pub const SEA_OFFSET: u64 = 0x2ee5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    None,
    BinaryTwo,
    SelfExtracting,
}

/// Probes the first `probe` bytes (already read into `head`) for a known
/// wrapper, or for the bare NuFX magic at offset 0. Returns the wrapper
/// kind and the byte offset at which the master header magic begins.
///
/// `head` must be at least `junk_skip_max` bytes long, or the whole file
/// if shorter; the caller is responsible for reading that much up front
/// (spec §4.3: "scan up to a tunable maximum number of leading bytes").
pub fn detect(head: &[u8]) -> Option<(WrapperKind, u64)> {
    if starts_with_master_magic(head, 0) {
        return Some((WrapperKind::None, 0));
    }

    if head.len() >= BINARY2_MAGIC_OFFSET + 2
        && head[BINARY2_MAGIC_OFFSET] == BINARY2_MAGIC[0]
        && head[BINARY2_MAGIC_OFFSET + 1] == BINARY2_MAGIC[1]
    {
        // A Binary II wrapper carries one 128-byte block per contained
        // file; without parsing the block count we conservatively scan
        // forward block-by-block for the NuFX magic, same as the
        // original's junk-skip loop.
        let mut offset = BINARY2_BLOCK_SIZE;
        while (offset as usize) + MASTER_MAGIC.len() <= head.len() {
            if starts_with_master_magic(head, offset as usize) {
                return Some((WrapperKind::BinaryTwo, offset));
            }
            offset += BINARY2_BLOCK_SIZE;
        }
        return None;
    }

    if head.len() as u64 > SEA_OFFSET && starts_with_master_magic(head, SEA_OFFSET as usize) {
        return Some((WrapperKind::SelfExtracting, SEA_OFFSET));
    }

    scan_for_master_magic(head).map(|offset| (WrapperKind::None, offset))
}

fn starts_with_master_magic(head: &[u8], at: usize) -> bool {
    head.len() >= at + MASTER_MAGIC.len() && head[at..at + MASTER_MAGIC.len()] == MASTER_MAGIC
}

/// Last-resort scan for leading junk ahead of the magic, bounded by the
/// `junk-skip-max` option (spec §6).
fn scan_for_master_magic(head: &[u8]) -> Option<u64> {
    if head.len() < MASTER_MAGIC.len() {
        return None;
    }
    head.windows(MASTER_MAGIC.len())
        .position(|w| w == MASTER_MAGIC)
        .map(|p| p as u64)
}

/// Rounds a wrapper's byte length up to the next Binary II block boundary
/// (spec §4.6 Step 8, "adjust its padding block").
pub fn round_up_to_block(len: u64) -> u64 {
    let rem = len % BINARY2_BLOCK_SIZE;
    if rem == 0 {
        len
    } else {
        len + (BINARY2_BLOCK_SIZE - rem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_bare_archive() {
        let mut head = MASTER_MAGIC.to_vec();
        head.extend_from_slice(&[0u8; 42]);
        assert_eq!(detect(&head), Some((WrapperKind::None, 0)));
    }

    #[test]
    fn detects_binary_two_wrapper() {
        let mut head = vec![0u8; BINARY2_BLOCK_SIZE as usize];
        head[0] = BINARY2_MAGIC[0];
        head[1] = BINARY2_MAGIC[1];
        head.extend_from_slice(&MASTER_MAGIC);
        assert_eq!(
            detect(&head),
            Some((WrapperKind::BinaryTwo, BINARY2_BLOCK_SIZE))
        );
    }

    #[test]
    fn round_up_block_boundary() {
        assert_eq!(round_up_to_block(0), 0);
        assert_eq!(round_up_to_block(1), BINARY2_BLOCK_SIZE);
        assert_eq!(round_up_to_block(BINARY2_BLOCK_SIZE), BINARY2_BLOCK_SIZE);
        assert_eq!(
            round_up_to_block(BINARY2_BLOCK_SIZE + 1),
            2 * BINARY2_BLOCK_SIZE
        );
    }
}
