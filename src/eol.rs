//! Content-driven EOL and high-bit auto-detection and conversion (spec
//! §4.8). Invoked from [`crate::source_sink::DataSink::put_block`] as an
//! explicit filter stage rather than a mode bit scattered through the
//! write path (DESIGN.md "Hand-rolled streams").

const CR: u8 = 0x0d;
const LF: u8 = 0x0a;
const HIGH_ASCII_CR: u8 = 0x8d;
const SAMPLE_LIMIT: usize = 16 * 1024;
const MIN_SAMPLE_FOR_BINARY_CHECK: usize = 40;
const BINARY_THRESHOLD_PERCENT: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEol {
    Lf,
    Cr,
    CrLf,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EolMode {
    /// No conversion, no high-bit stripping; bytes pass through verbatim.
    None,
    Off,
    On,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEol {
    Cr,
    Lf,
    CrLf,
}

impl TargetEol {
    fn bytes(self) -> &'static [u8] {
        match self {
            TargetEol::Cr => &[CR],
            TargetEol::Lf => &[LF],
            TargetEol::CrLf => &[CR, LF],
        }
    }
}

/// A 256-entry "is this byte plausibly text" table used by the binary
/// sniffer (spec §4.8 "Binary detection"). Printable ASCII, common
/// whitespace, and high-ASCII equivalents of the same are "text"; other
/// control characters are "binary".
fn is_text_byte(b: u8) -> bool {
    match b {
        0x09 | 0x0a | 0x0d | 0x20..=0x7e => true,
        0x89 | 0x8a | 0x8d | 0xa0..=0xfe => true,
        _ => false,
    }
}

/// Classifies a content sample and remembers enough state to convert
/// subsequent blocks (spec §4.8). Classification happens once, from the
/// first block written into a sink whose mode is `Auto`.
pub struct EolFilter {
    mode: EolMode,
    target: TargetEol,
    high_ascii: bool,
    convert: bool,
    /// Carries "the previous block's last byte was an unconverted CR"
    /// across block boundaries (spec §4.8 "During emission").
    last_was_cr: bool,
}

impl EolFilter {
    /// Builds a filter for a non-auto mode without sampling `first_block`.
    pub fn fixed(mode: EolMode, target: TargetEol, strip_high_ascii: bool) -> Self {
        EolFilter {
            mode,
            target,
            high_ascii: strip_high_ascii,
            convert: matches!(mode, EolMode::On),
            last_was_cr: false,
        }
    }

    /// Classifies `first_block` (spec §4.8) and returns a filter ready to
    /// process it and all following blocks. `target`/`strip_high_ascii`
    /// come from the archive's [`crate::archive::options::Options`].
    pub fn classify_auto(first_block: &[u8], target: TargetEol, strip_high_ascii: bool) -> Self {
        let sample = &first_block[..first_block.len().min(SAMPLE_LIMIT)];

        let high_ascii = !sample.is_empty()
            && sample
                .iter()
                .all(|&b| b & 0x80 != 0 || b == b' ');

        let mut binary_count = 0u64;
        for &b in sample {
            let unmasked = if high_ascii { b & 0x7f } else { b };
            if !is_text_byte(unmasked) {
                binary_count += 1;
            }
        }
        let is_binary = sample.len() >= MIN_SAMPLE_FOR_BINARY_CHECK
            && binary_count * 100 >= sample.len() as u64 * BINARY_THRESHOLD_PERCENT;

        let mut cr_count = 0u64;
        let mut lf_count = 0u64;
        if !is_binary {
            for &b in sample {
                let unmasked = if high_ascii { b & 0x7f } else { b };
                match unmasked {
                    CR => cr_count += 1,
                    LF => lf_count += 1,
                    _ => {}
                }
            }
        }

        let source_eol = if sample.len() < MIN_SAMPLE_FOR_BINARY_CHECK || is_binary {
            SourceEol::Unknown
        } else if cr_count > 0 && lf_count == 0 {
            SourceEol::Cr
        } else if lf_count > 0 && cr_count == 0 {
            SourceEol::Lf
        } else if cr_count > 0 && cr_count == lf_count {
            SourceEol::CrLf
        } else {
            SourceEol::Unknown
        };

        let matches_target = matches!(
            (source_eol, target),
            (SourceEol::Cr, TargetEol::Cr)
                | (SourceEol::Lf, TargetEol::Lf)
                | (SourceEol::CrLf, TargetEol::CrLf)
        );
        let convert = !(matches_target && !high_ascii) && !is_binary && source_eol != SourceEol::Unknown;

        EolFilter {
            mode: EolMode::Auto,
            target,
            high_ascii: high_ascii && strip_high_ascii,
            convert,
            last_was_cr: false,
        }
    }

    pub fn apply(&mut self, block: &[u8]) -> Vec<u8> {
        if matches!(self.mode, EolMode::None) {
            return block.to_vec();
        }
        if !self.convert && !self.high_ascii {
            return block.to_vec();
        }

        let mut out = Vec::with_capacity(block.len());
        for &raw in block {
            let b = if self.high_ascii { raw & 0x7f } else { raw };

            if !self.convert {
                out.push(b);
                continue;
            }

            match b {
                CR => {
                    out.extend_from_slice(self.target.bytes());
                    self.last_was_cr = true;
                }
                LF => {
                    if !self.last_was_cr {
                        out.extend_from_slice(self.target.bytes());
                    }
                    self.last_was_cr = false;
                }
                other => {
                    out.push(other);
                    self.last_was_cr = false;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_high_ascii_and_strips() {
        let mut content = vec![b'A' | 0x80; 511];
        content.push(HIGH_ASCII_CR);
        let mut filter = EolFilter::classify_auto(&content, TargetEol::Lf, true);
        let out = filter.apply(&content);
        assert!(out.iter().all(|&b| b & 0x80 == 0));
        assert_eq!(out.last(), Some(&LF));
    }

    #[test]
    fn cr_then_lf_suppressed() {
        let mut filter = EolFilter::fixed(EolMode::On, TargetEol::Lf, false);
        filter.convert = true;
        let out = filter.apply(b"a\r\nb");
        assert_eq!(out, b"a\nb");
    }

    #[test]
    fn cr_lf_split_across_blocks_suppressed() {
        let mut filter = EolFilter::fixed(EolMode::On, TargetEol::Lf, false);
        filter.convert = true;
        let mut out = filter.apply(b"a\r");
        out.extend(filter.apply(b"\nb"));
        assert_eq!(out, b"a\nb");
    }

    #[test]
    fn binary_sample_disables_conversion() {
        let content: Vec<u8> = (0u8..=255).cycle().take(200).collect();
        let filter = EolFilter::classify_auto(&content, TargetEol::Lf, true);
        assert!(!filter.convert);
    }

    #[test]
    fn short_sample_below_minimum_no_conversion() {
        let content = b"\r\n\r\n";
        let filter = EolFilter::classify_auto(content, TargetEol::Lf, true);
        assert!(!filter.convert);
    }
}
