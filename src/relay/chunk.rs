//! Splitting outbound text to fit Telegram's message size limit.

/// Telegram rejects messages above 4096 characters; stay well below.
pub const MAX_CHUNK_CHARS: usize = 3800;

/// Split `text` into consecutive pieces of at most `max_chars` characters.
///
/// Pieces never split a code point and concatenate back to `text`.
/// Empty input yields no pieces.
pub fn chunk(text: &str, max_chars: usize) -> Vec<&str> {
    assert!(max_chars > 0, "chunk size must be positive");

    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == max_chars {
            pieces.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
