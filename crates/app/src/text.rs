//! Text helpers

/// Longest response or error body kept in storage, in characters.
pub const MAX_STORED_BODY_CHARS: usize = 2_000;

/// Truncate `value` to at most `max_chars` characters, on a char boundary.
#[must_use]
pub fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((end, _)) => value.get(..end).unwrap_or(value).to_string(),
        None => value.to_string(),
    }
}
