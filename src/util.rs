//! Small input conversion helpers.
//!
//! The parser operates on integer code points, not on text; these helpers
//! bridge from and to Rust strings for hosts and tests. Full transcoding of
//! other encodings is an external concern.

/// Convert a string to the code point sequence the parser consumes.
pub fn string_to_chars(s: &str) -> Vec<u32> {
    s.chars().map(|c| c as u32).collect()
}

/// Convert a code point sequence back to a string. Invalid code points are
/// replaced with U+FFFD.
pub fn chars_to_string(chars: &[u32]) -> String {
    chars
        .iter()
        .map(|&c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
