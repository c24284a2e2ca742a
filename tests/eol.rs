//! End-to-end EOL auto-detection + high-ASCII stripping through the
//! public `DataSink` surface (spec §4.8), rather than the crate-internal
//! `EolFilter` the unit tests exercise directly.

use nufx::{DataSink, EolMode, TargetEol};

#[test]
fn auto_mode_strips_high_ascii_and_converts_trailing_cr_to_lf() {
    let mut content = vec![b'A' | 0x80; 511];
    content.push(0x8d);
    let mut sink = DataSink::to_buffer_with_eol(None, true, EolMode::Auto, TargetEol::Lf, true);
    sink.put_block(&content).unwrap();
    assert!(sink.get_error().is_none());
    let out = sink.into_buffer().unwrap();
    assert!(out.iter().all(|&b| b & 0x80 == 0), "high bit must be stripped from every byte");
    assert_eq!(out.last(), Some(&0x0a), "the high-ASCII CR must convert to the target LF");
}
