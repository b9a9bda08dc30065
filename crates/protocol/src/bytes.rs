//! Fixed-width integer helpers and in-buffer comparisons.
//!
//! All conversions are big-endian (network order). Readers take a slice and
//! an offset and panic if the slice is too short, mirroring slice indexing;
//! callers decode from fixed-size arrays whose length is checked up front.

/// Encodes a `u16` as 2 big-endian bytes.
pub fn u16_to_bytes(value: u16) -> [u8; 2] {
    value.to_be_bytes()
}

/// Encodes a `u64` as 8 big-endian bytes.
pub fn u64_to_bytes(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decodes a big-endian `u16` starting at `offset`.
pub fn u16_from_bytes(buf: &[u8], offset: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&buf[offset..offset + 2]);
    u16::from_be_bytes(raw)
}

/// Decodes a big-endian `u64` starting at `offset`.
pub fn u64_from_bytes(buf: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_be_bytes(raw)
}

/// Returns `true` if `buf` contains `pattern` starting at `offset`.
///
/// Out-of-range offsets simply do not match.
pub fn region_matches(buf: &[u8], offset: usize, pattern: &[u8]) -> bool {
    match offset.checked_add(pattern.len()) {
        Some(end) if end <= buf.len() => &buf[offset..end] == pattern,
        _ => false,
    }
}

/// Truncates `s` to at most `max` bytes without splitting a UTF-8 sequence.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
