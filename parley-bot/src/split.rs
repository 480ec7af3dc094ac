//! Message splitting for size-bounded transports.
//!
//! Two strategies:
//! - [`split_response`] cuts a model response into word-safe chunks for the
//!   channel message limit.
//! - [`pack_lines`] packs whole transcript lines into larger chunks without
//!   ever breaking a line.
//!
//! Lengths are counted in characters, never bytes, so multi-byte text is not
//! cut inside a character.

/// Split a response into chunks of at most `max_len` characters.
///
/// A split lands on the last whitespace at or before `max_len`; the
/// whitespace run at the split point is dropped. Without whitespace in that
/// window the text is cut hard at `max_len`. Chunks holding nothing but
/// whitespace are dropped, since transports reject blank messages.
pub fn split_response(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_len {
        let split_at = find_split_point(remaining, max_len);
        let (head, tail) = remaining.split_at(split_at);
        if !head.trim().is_empty() {
            chunks.push(head.to_string());
        }
        remaining = tail.trim_start();
    }

    if !remaining.trim().is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

/// Byte offset to split `text` at. Caller guarantees more than `max_len` chars.
fn find_split_point(text: &str, max_len: usize) -> usize {
    let mut hard_cut = text.len();
    let mut last_space = None;

    for (index, (offset, ch)) in text.char_indices().enumerate() {
        if index > max_len {
            break;
        }
        if index == max_len {
            hard_cut = offset;
        }
        // A split at 0 would emit an empty chunk.
        if index > 0 && ch.is_whitespace() {
            last_space = Some(offset);
        }
    }

    last_space.unwrap_or(hard_cut)
}

/// Pack newline-separated lines into chunks of at most `max_len` characters.
///
/// A new chunk starts whenever appending the next line (and its newline)
/// would exceed the bound. A single line longer than `max_len` is kept whole
/// as its own chunk.
pub fn pack_lines(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Option<(String, usize)> = None;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        current = match current.take() {
            None => Some((line.to_string(), line_len)),
            Some((mut chunk, len)) if len + 1 + line_len <= max_len => {
                chunk.push('\n');
                chunk.push_str(line);
                Some((chunk, len + 1 + line_len))
            }
            Some((chunk, _)) => {
                push_non_empty(&mut chunks, chunk);
                Some((line.to_string(), line_len))
            }
        };
    }

    if let Some((chunk, _)) = current {
        push_non_empty(&mut chunks, chunk);
    }

    chunks
}

fn push_non_empty(chunks: &mut Vec<String>, chunk: String) {
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
}
