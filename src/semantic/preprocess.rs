//! Text preprocessing for queries and ingested files.
//!
//! - Query normalization and hashing for cache keys
//! - Chunking long files into overlapping pieces before indexing

use sha2::{Digest, Sha256};

/// Separators tried in order when splitting text into chunks
const SEPARATORS: &[&str] = &["\n\n", "\n", " "];

/// Normalize a query for cache lookups: trim, lowercase and collapse runs of
/// whitespace into a single space.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable 64-bit hash of a query string (first 8 bytes of its SHA-256).
///
/// Unlike `DefaultHasher` this does not change between processes or
/// toolchain versions.
pub fn query_hash(query: &str) -> u64 {
    let digest = Sha256::digest(query.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Split text into chunks of at most `chunk_size` characters, with roughly
/// `overlap` characters shared between neighbouring chunks.
///
/// Splits prefer paragraph breaks, then line breaks, then spaces, and only
/// cut inside a word when a single word exceeds `chunk_size`. Blank chunks
/// are dropped.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    split_recursive(text, chunk_size, overlap, SEPARATORS)
        .into_iter()
        .map(|chunk| chunk.trim().to_string())
        .filter(|chunk| !chunk.is_empty())
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(text: &str, chunk_size: usize, overlap: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let Some((separator, rest)) = separators.split_first() else {
        return split_chars(text, chunk_size, overlap);
    };

    if !text.contains(separator) {
        return split_recursive(text, chunk_size, overlap, rest);
    }

    // pieces that are still too long get split with the finer separators
    let mut pieces = Vec::new();
    for piece in text.split(separator).filter(|p| !p.is_empty()) {
        if char_len(piece) > chunk_size {
            pieces.extend(split_recursive(piece, chunk_size, overlap, rest));
        } else {
            pieces.push(piece.to_string());
        }
    }

    merge_pieces(&pieces, separator, chunk_size, overlap)
}

/// Greedily pack pieces into chunks, carrying trailing pieces over as overlap.
fn merge_pieces(pieces: &[String], separator: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut window_len = 0usize;

    for piece in pieces {
        let piece_len = char_len(piece);
        let joined_len = if window.is_empty() {
            piece_len
        } else {
            window_len + sep_len + piece_len
        };

        if joined_len > chunk_size && !window.is_empty() {
            chunks.push(window.join(separator));

            // drop from the front until the carried-over tail fits the overlap
            // and leaves room for the next piece
            while !window.is_empty()
                && (window_len > overlap || window_len + sep_len + piece_len > chunk_size)
            {
                let first = window.remove(0);
                window_len = window_len.saturating_sub(char_len(first) + sep_len);
                if window.is_empty() {
                    window_len = 0;
                }
            }
        }

        window_len = if window.is_empty() {
            piece_len
        } else {
            window_len + sep_len + piece_len
        };
        window.push(piece);
    }

    if !window.is_empty() {
        chunks.push(window.join(separator));
    }

    chunks
}

fn split_chars(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Addition   FUNCTION\t"), "addition function");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_query_hash_consistency() {
        assert_eq!(query_hash("addition function"), query_hash("addition function"));
        assert_ne!(query_hash("addition function"), query_hash("subtraction function"));
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = split_text("fn main() {}", 1000, 200);
        assert_eq!(chunks, vec!["fn main() {}"]);
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(split_text("   \n\n  ", 100, 10).is_empty());
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let text = "first paragraph here\n\nsecond paragraph here";
        let chunks = split_text(text, 25, 0);
        assert_eq!(chunks, vec!["first paragraph here", "second paragraph here"]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = (0..200).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let chunks = split_text(&text, 50, 10);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 50));
    }

    #[test]
    fn test_chunks_overlap() {
        let text = "aaa bbb ccc ddd eee fff ggg hhh";
        let chunks = split_text(text, 11, 4);

        assert_eq!(chunks[0], "aaa bbb ccc");
        // last word of a chunk is carried into the next one
        assert!(chunks[1].starts_with("ccc"));
    }

    #[test]
    fn test_long_word_split_by_chars() {
        let text = "x".repeat(25);
        let chunks = split_text(&text, 10, 2);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert!(chunks.iter().all(|c| c.len() <= 10));
    }
}
