/// Cuts `text` to at most `max_chars` characters and appends `suffix` when
/// anything was removed. Counts chars, not bytes, so multi-byte input never
/// splits a code point.
pub fn truncate_with_suffix(text: &str, max_chars: usize, suffix: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], suffix),
        None => text.to_string(),
    }
}

/// Same as [`truncate_with_suffix`] with an ellipsis of three dots.
pub fn ellipsize(text: &str, max_chars: usize) -> String {
    truncate_with_suffix(text, max_chars, "...")
}

/// Trims `value` and returns `None` if nothing is left.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
