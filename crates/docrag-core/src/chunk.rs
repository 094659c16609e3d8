//! Paragraph-boundary text chunker.
//!
//! Splits a document into [`Chunk`]s, one per paragraph. Paragraphs are
//! separated by a blank line (`\n\n`); surrounding whitespace is stripped and
//! empty or whitespace-only paragraphs are discarded before indexing.
//!
//! Each chunk receives a deterministic UUIDv5 derived from its document ID
//! and index, so re-chunking an unchanged document reproduces the same
//! identifiers and re-upserting overwrites instead of duplicating. A SHA-256
//! hash of the text is carried along as metadata.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_bytes` using a 4 chars/token ratio.
//! 2. Split text on `\n\n` and trim each piece.
//! 3. Drop empty pieces.
//! 4. If a paragraph exceeds `max_bytes`, hard-split it at the nearest
//!    newline or space boundary.
//! 5. Number the surviving pieces contiguously from 0.
//!
//! # Example
//!
//! ```rust
//! use docrag_core::chunk::chunk_document;
//! use docrag_core::models::Document;
//!
//! let doc = Document::new("doc1.txt", "Paris is the capital of France.\n\nIt is on the Seine.");
//! let chunks = chunk_document(&doc, 700);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].text, "It is on the Seine.");
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Document};

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Paragraph separator.
pub const PARAGRAPH_BREAK: &str = "\n\n";

/// Namespace for chunk identifiers.
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b3d_4c57_a0e8_51d2_7c3b_9e04);

/// Split a document into paragraph chunks with contiguous indices.
///
/// A document made only of blank paragraphs yields no chunks.
pub fn chunk_document(doc: &Document, max_tokens: usize) -> Vec<Chunk> {
    let max_bytes = max_tokens.max(1) * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    for para in doc.text.split(PARAGRAPH_BREAK) {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.len() <= max_bytes {
            chunks.push(make_chunk(&doc.id, chunks.len() as i64, trimmed));
            continue;
        }

        for piece in split_oversized(trimmed, max_bytes) {
            chunks.push(make_chunk(&doc.id, chunks.len() as i64, piece));
        }
    }

    chunks
}

/// Deterministic identifier for the chunk at `chunk_index` of `document_id`.
pub fn chunk_id(document_id: &str, chunk_index: i64) -> String {
    let name = format!("{}#{}", document_id, chunk_index);
    Uuid::new_v5(&CHUNK_NAMESPACE, name.as_bytes()).to_string()
}

fn split_oversized(text: &str, max_bytes: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_bytes {
            pieces.push(remaining);
            break;
        }

        let mut limit = max_bytes;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        // A single char wider than the limit still has to go somewhere.
        if limit == 0 {
            limit = remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len());
        }

        let split_at = remaining[..limit]
            .rfind('\n')
            .or_else(|| remaining[..limit].rfind(' '))
            .map(|pos| pos + 1)
            .unwrap_or(limit);

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = remaining[split_at..].trim_start();
    }

    pieces
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("doc1.txt", text)
    }

    #[test]
    fn test_single_paragraph() {
        let chunks = chunk_document(&doc("Hello, world!"), 700);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].document_id, "doc1.txt");
    }

    #[test]
    fn test_one_chunk_per_paragraph() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_document(&doc(text), 700);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["First paragraph.", "Second paragraph.", "Third paragraph."]
        );
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(chunk_document(&doc(""), 700).is_empty());
    }

    #[test]
    fn test_blank_paragraphs_discarded() {
        let chunks = chunk_document(&doc("\n\n   \n\n\t\n\n  "), 700);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_indices_contiguous_after_discarding_blanks() {
        let text = "Alpha\n\n\n\n  \n\nBeta\n\n\n\nGamma";
        let chunks = chunk_document(&doc(text), 700);
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_paragraphs_are_trimmed() {
        let chunks = chunk_document(&doc("  padded  \n\n\nline with leading newline "), 700);
        assert_eq!(chunks[0].text, "padded");
        assert_eq!(chunks[1].text, "line with leading newline");
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_document(&doc(text), 700);
        let c2 = chunk_document(&doc(text), 700);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_ids_unique_within_document() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_document(&doc(&text), 700);
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn test_ids_differ_across_documents() {
        assert_ne!(chunk_id("a.txt", 0), chunk_id("b.txt", 0));
        assert_eq!(chunk_id("a.txt", 3), chunk_id("a.txt", 3));
    }

    #[test]
    fn test_oversized_paragraph_split_on_spaces() {
        // max_tokens=5 => max_bytes=20
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk_document(&doc(text), 5);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 20, "chunk too long: {:?}", c.text);
            assert!(!c.text.is_empty());
        }
        let rejoined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_oversized_multibyte_does_not_panic() {
        let text = "é".repeat(40);
        let chunks = chunk_document(&doc(&text), 2);
        let total: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(total, text);
    }

    #[test]
    fn test_hash_tracks_text() {
        let a = chunk_document(&doc("same"), 700);
        let b = chunk_document(&Document::new("other.txt", "same"), 700);
        assert_eq!(a[0].hash, b[0].hash);
        assert_ne!(a[0].id, b[0].id);
    }
}
