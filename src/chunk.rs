//! Fixed-size overlapping window chunker.
//!
//! Splits document text into windows of `chunk_chars` characters advancing
//! by `chunk_chars - overlap_chars` each step, so consecutive chunks share
//! an overlap region. Windows are trimmed of surrounding whitespace and
//! dropped when empty, and the emission order defines each chunk's
//! sequential index.
//!
//! Offsets are counted in characters, never raw bytes, so a window edge can
//! never land inside a multi-byte UTF-8 scalar.

/// Split `text` into overlapping windows of `chunk_chars` characters.
///
/// `step = max(1, chunk_chars - overlap_chars)`; an overlap at or above the
/// chunk size degenerates to a step of one character (near-maximal
/// redundancy) rather than an error or an infinite loop.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    if text.is_empty() || chunk_chars == 0 {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end-of-text sentinel.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());
    let total_chars = boundaries.len() - 1;

    let step = 1.max(chunk_chars.saturating_sub(overlap_chars));

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < total_chars {
        let end = (start + chunk_chars).min(total_chars);
        let window = text[boundaries[start]..boundaries[end]].trim();
        if !window.is_empty() {
            chunks.push(window.to_string());
        }
        start += step;
    }

    chunks
}

/// Build the stable identity key for a chunk.
///
/// The same content at the same position in the same document always maps
/// to the same ID, which is what makes re-ingestion idempotent.
pub fn stable_chunk_id(file_stem: &str, index: usize, digest: &str) -> String {
    format!("{}_{}_{}", file_stem, index, digest)
}
