/// Split `text` into chunks of at most `max_len` bytes, preferring to break
/// on a newline boundary. The boundary newline itself is dropped; rejoining
/// the chunks reconstructs the text modulo those newlines.
///
/// When no newline falls inside the window the cut lands exactly at
/// `max_len` (backed off to a UTF-8 char boundary), possibly mid-word.
/// An empty input yields a single empty chunk.
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > max_len {
        let window = floor_char_boundary(remaining, max_len);
        let split_at = remaining[..window].rfind('\n').unwrap_or(window);
        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start_matches('\n');
    }

    chunks.push(remaining.to_string());
    chunks
}

/// Largest index `<= index` that sits on a char boundary of `s`.
fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
