//! Filesystem-safe naming
//!
//! Scratch directory names and scheduler job names are built from subject
//! identifiers that may contain spaces and punctuation.

/// Default maximum length of a single path component on common filesystems
pub const DEFAULT_MAX_FILENAME_LEN: usize = 255;

const UNSAFE_CHARS: &[char] = &['(', ')', ',', '/'];

/// Replaces whitespace and `(),/` with underscores
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_whitespace() || UNSAFE_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Truncates `name` to at most `max_len` bytes without splitting a character
pub fn truncate(name: &str, max_len: usize) -> &str {
    if name.len() <= max_len {
        return name;
    }
    let mut end = max_len;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Builds a sanitized name of at most `max_len` bytes
///
/// The `suffix` carries the disambiguating part (timestamp, instance id), so
/// when the result is too long the base is shortened and the suffix is kept.
/// Only if the suffix alone exceeds `max_len` is it cut as well.
pub fn safe_name(base: &str, suffix: &str, max_len: usize) -> String {
    let base = sanitize(base);
    let suffix = sanitize(suffix);

    if suffix.len() >= max_len {
        return truncate(&suffix, max_len).to_string();
    }

    let budget = max_len - suffix.len();
    format!("{}{}", truncate(&base, budget), suffix)
}
