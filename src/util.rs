//! Shared utility functions

/// Shorten a string for log output.
///
/// Cuts after `max_chars` characters (not bytes) and appends "..." when
/// anything was removed, so multi-byte text never splits mid-character.
pub fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &s[..byte_idx]),
        None => s.to_string(),
    }
}
