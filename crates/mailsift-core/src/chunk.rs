//! Paragraph-aware text chunker.
//!
//! Splits a cleaned message body into chunks of at most `max_chars`
//! characters. Paragraphs (`\n\n`) are kept together when they fit, so a
//! chunk usually holds several whole paragraphs of one message.
//!
//! # Algorithm
//!
//! 1. Split text on `\n\n` paragraph boundaries and trim each paragraph.
//! 2. Accumulate paragraphs into a buffer until adding the next paragraph
//!    would exceed `max_chars`.
//! 3. When exceeded, flush the buffer as a chunk and start a new one.
//! 4. A single paragraph longer than `max_chars` is hard-split at the last
//!    whitespace inside the window, or mid-word if the window has none.
//! 5. Empty or whitespace-only text yields no chunks at all.
//!
//! Only whitespace is ever dropped at a boundary: concatenating the chunks
//! reproduces every non-whitespace character of the input, in order.
//!
//! # Example
//!
//! ```rust
//! use mailsift_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("Hello world.\n\nSecond paragraph.", 1000);
//! assert_eq!(chunks, vec!["Hello world.\n\nSecond paragraph.".to_string()]);
//! assert!(chunk_text("", 1000).is_empty());
//! ```

use sha2::{Digest, Sha256};

/// Separator re-inserted between paragraphs that share a chunk.
const PARAGRAPH_SEP: &str = "\n\n";

/// Split text into chunks of at most `max_chars` characters.
///
/// Lengths are counted in `char`s, never bytes, so multi-byte text is never
/// cut inside a code point. A `max_chars` of zero is treated as one.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for para in text.split(PARAGRAPH_SEP) {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }
        let para_len = trimmed.chars().count();

        let would_be = if current.is_empty() {
            para_len
        } else {
            current_len + PARAGRAPH_SEP.len() + para_len
        };

        if would_be > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if para_len > max_chars {
            split_oversized(trimmed, max_chars, &mut chunks);
        } else {
            if !current.is_empty() {
                current.push_str(PARAGRAPH_SEP);
                current_len += PARAGRAPH_SEP.len();
            }
            current.push_str(trimmed);
            current_len += para_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Hard-split one paragraph that does not fit in a single chunk.
fn split_oversized(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = paragraph.trim_start();

    while !remaining.is_empty() {
        let window_end = byte_offset_of_char(remaining, max_chars);
        if window_end == remaining.len() {
            let piece = remaining.trim_end();
            if !piece.is_empty() {
                out.push(piece.to_string());
            }
            break;
        }

        let cut = if remaining[window_end..].starts_with(char::is_whitespace) {
            window_end
        } else {
            match remaining[..window_end].rfind(char::is_whitespace) {
                Some(pos) if pos > 0 => pos,
                _ => window_end,
            }
        };

        let piece = remaining[..cut].trim_end();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = remaining[cut..].trim_start();
    }
}

/// Byte offset of the `n`-th char, or `s.len()` if `s` is shorter.
fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// SHA-256 of a chunk's text, hex encoded.
///
/// Stored with each record so a re-ingested chunk can be compared to the
/// indexed one.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
