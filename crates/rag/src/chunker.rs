//! Text chunking for ingestion.

/// Default target characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default overlap between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Split text into overlapping chunks.
///
/// Chunk boundaries prefer a paragraph break, then a sentence break, as long
/// as the break lands past the halfway point of the chunk; otherwise the
/// chunk is cut at `chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text.len() {
        let mut end = (start + chunk_size).min(text.len());
        // Keep the cut on a char edge before slicing non-ASCII input.
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }

        if end < text.len() {
            let window = &text[start..end];
            let half = chunk_size / 2;

            // Paragraph break first
            if let Some(pos) = window.rfind("\n\n") {
                if pos > half {
                    end = start + pos + 2;
                } else {
                    end = start + sentence_break(window, half).unwrap_or(window.len());
                }
            } else {
                end = start + sentence_break(window, half).unwrap_or(window.len());
            }
        }

        let chunk = text[start..end].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= text.len() {
            break;
        }
        let mut next = end.saturating_sub(chunk_overlap).max(start + 1);
        while !text.is_char_boundary(next) {
            next += 1;
        }
        start = next;
    }

    chunks
}

/// Position just past the last sentence separator after `min_pos`, if any.
fn sentence_break(window: &str, min_pos: usize) -> Option<usize> {
    for sep in [". ", "! ", "? ", "\n"] {
        if let Some(pos) = window.rfind(sep) {
            if pos > min_pos {
                return Some(pos + sep.len());
            }
        }
    }
    None
}
