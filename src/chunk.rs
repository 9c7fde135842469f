//! Boundary-aware sliding-window chunker.
//!
//! Splits loaded [`Segment`]s into [`Chunk`]s of at most `max_chunk_size`
//! characters. Each segment is its own run: chunks never straddle two pages
//! or two table rows.
//!
//! # Algorithm
//!
//! 1. Trim the segment; skip it if nothing is left.
//! 2. A run that fits in one window becomes one chunk.
//! 3. Otherwise take a window of `max_chunk_size` characters and cut it at
//!    the latest boundary past the middle of the window, trying in order:
//!    paragraph break, sentence end, line break, space. With no boundary
//!    available, hard-cut at `max_chunk_size`.
//! 4. Start the next window `overlap` characters before the previous cut,
//!    so neighbouring chunks share exactly `overlap` characters.
//!
//! Chunk text is always an exact slice of the run. Lengths are counted in
//! characters, never bytes, so multi-byte text is never split mid-char.
//!
//! Chunk ids are UUIDv5 of `(document_id, chunk_index)`: splitting the same
//! input twice yields identical chunks.
//!
//! # Example
//!
//! ```rust
//! use docask::chunk::split;
//! use docask::models::{Locator, Segment};
//!
//! let segment = Segment {
//!     document_id: "notes.txt".into(),
//!     locator: Locator::Whole,
//!     text: "Hello world.\n\nSecond paragraph.".into(),
//! };
//! let chunks = split(&[segment], 1000, 200).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::QaError;
use crate::models::{Chunk, Segment};

/// Split segments into overlapping chunks.
///
/// Returns chunks with contiguous indices starting at 0.
///
/// # Errors
///
/// - [`QaError::InvalidConfig`] if `max_chunk_size == 0` or
///   `overlap >= max_chunk_size`.
/// - [`QaError::EmptyInput`] if there are no segments, or every segment is
///   blank after trimming.
pub fn split(
    segments: &[Segment],
    max_chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, QaError> {
    if max_chunk_size == 0 {
        return Err(QaError::InvalidConfig(
            "max_chunk_size must be > 0".to_string(),
        ));
    }
    if overlap >= max_chunk_size {
        return Err(QaError::InvalidConfig(format!(
            "overlap ({}) must be smaller than max_chunk_size ({})",
            overlap, max_chunk_size
        )));
    }

    let mut chunks = Vec::new();
    for segment in segments {
        let run = segment.text.trim();
        if run.is_empty() {
            continue;
        }
        for piece in windows(run, max_chunk_size, overlap) {
            if piece.trim().is_empty() {
                continue;
            }
            let index = chunks.len() as i64;
            chunks.push(make_chunk(segment, index, piece));
        }
    }

    if chunks.is_empty() {
        return Err(QaError::EmptyInput);
    }
    Ok(chunks)
}

/// Cut one run into overlapping windows.
fn windows(run: &str, max_chars: usize, overlap: usize) -> Vec<&str> {
    // Byte offset of every char boundary, including the end of the string.
    let offsets: Vec<usize> = run
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(run.len()))
        .collect();
    let chars: Vec<char> = run.chars().collect();
    let total = chars.len();

    if total <= max_chars {
        return vec![run];
    }

    // A boundary closer to the window start than this is not worth taking;
    // it must also lie past the overlap so every step moves forward.
    let min_len = (max_chars / 2).max(overlap + 1);

    let mut pieces = Vec::new();
    let mut start = 0usize;
    loop {
        let hard_end = (start + max_chars).min(total);
        if hard_end == total {
            pieces.push(&run[offsets[start]..]);
            break;
        }
        let end = find_break(&chars[start..hard_end], min_len)
            .map(|len| start + len)
            .unwrap_or(hard_end);
        pieces.push(&run[offsets[start]..offsets[end]]);
        start = end - overlap;
    }
    pieces
}

type BoundaryTest = fn(&[char], usize) -> bool;

/// Find the longest prefix of `window` (at least `min_len` chars) that ends
/// on a boundary, trying stronger boundary kinds first.
fn find_break(window: &[char], min_len: usize) -> Option<usize> {
    const LEVELS: [BoundaryTest; 4] = [
        ends_paragraph,
        ends_sentence,
        ends_line,
        ends_word,
    ];
    LEVELS.iter().find_map(|ends_at| {
        (min_len..=window.len())
            .rev()
            .find(|&len| ends_at(window, len))
    })
}

fn ends_paragraph(c: &[char], len: usize) -> bool {
    len >= 2 && c[len - 2] == '\n' && c[len - 1] == '\n'
}

fn ends_sentence(c: &[char], len: usize) -> bool {
    len >= 2 && matches!(c[len - 2], '.' | '!' | '?') && c[len - 1].is_whitespace()
}

fn ends_line(c: &[char], len: usize) -> bool {
    len >= 1 && c[len - 1] == '\n'
}

fn ends_word(c: &[char], len: usize) -> bool {
    len >= 1 && c[len - 1] == ' '
}

/// Create a single [`Chunk`] with a deterministic id and SHA-256 content hash.
fn make_chunk(segment: &Segment, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let name = format!("{}#{}", segment.document_id, index);
    Chunk {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string(),
        document_id: segment.document_id.clone(),
        chunk_index: index,
        locator: segment.locator,
        text: text.to_string(),
        hash,
    }
}
