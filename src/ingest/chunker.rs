//! Fixed-size character windowing over loaded documents.
//!
//! Windows are counted in `char`s, so multi-byte scripts chunk the same
//! way single-byte text does and a window can never split a code point.
//! Chunks are exact slices of the source text: no trimming, no boundary
//! snapping. Concatenating chunk 0 with every later chunk minus its
//! leading `overlap` chars reproduces the document exactly.

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

/// One window of a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Identifier of the document this window came from.
    pub source_id: String,
    /// Position of this window within its document, starting at 0.
    pub chunk_index: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// `overlap` must be strictly smaller than `chunk_size`; equal windows
    /// would never advance.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Splits `text` into overlapping windows. Empty input yields no chunks.
    ///
    /// The final window always ends exactly at the end of the text and is
    /// never a suffix already covered by its predecessor.
    pub fn split(&self, text: &str, source_id: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }

        let step = self.chunk_size - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(total);
            chunks.push(Chunk {
                text: chars[start..end].iter().collect(),
                source_id: source_id.to_string(),
                chunk_index: chunks.len(),
            });
            if end == total {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_texts(chunker: &Chunker, text: &str) -> Vec<String> {
        chunker
            .split(text, "doc")
            .into_iter()
            .map(|c| c.text)
            .collect()
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = Chunker::new(100, 20).unwrap();
        let chunks = chunker.split("hello world", "a.txt");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].source_id, "a.txt");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(10, 2).unwrap();
        assert!(chunker.split("", "a.txt").is_empty());
    }

    #[test]
    fn windows_advance_by_size_minus_overlap() {
        let chunker = Chunker::new(10, 3).unwrap();
        let text: String = ('a'..='x').collect(); // 24 chars
        let texts = chunk_texts(&chunker, &text);

        assert_eq!(texts, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx"]);
    }

    #[test]
    fn consecutive_chunks_share_overlap_chars() {
        let chunker = Chunker::new(10, 4).unwrap();
        let text: String = std::iter::repeat("0123456789").take(5).collect();
        let texts = chunk_texts(&chunker, &text);

        for pair in texts.windows(2) {
            let tail: String = pair[0].chars().rev().take(4).collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let head: String = pair[1].chars().take(4).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn deoverlapped_concatenation_reconstructs_the_text() {
        let chunker = Chunker::new(7, 2).unwrap();
        let text = "The quick brown fox jumps over the lazy dog";
        let chunks = chunker.split(text, "doc");

        let mut rebuilt = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.chars().skip(2));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn last_chunk_is_never_contained_in_its_predecessor() {
        // 11 chars with size 10: the final window must not be a pure suffix
        // re-emission.
        let chunker = Chunker::new(10, 5).unwrap();
        let texts = chunk_texts(&chunker, "abcdefghijk");
        assert_eq!(texts, vec!["abcdefghij", "fghijk"]);

        // Exact multiple of the window: no empty or duplicate tail chunk.
        let chunker = Chunker::new(5, 2).unwrap();
        let texts = chunk_texts(&chunker, "abcde");
        assert_eq!(texts, vec!["abcde"]);
    }

    #[test]
    fn multibyte_text_chunks_by_chars_not_bytes() {
        let chunker = Chunker::new(4, 1).unwrap();
        let text = "這是一段用來測試的中文句子";
        let chunks = chunker.split(text, "zh.txt");

        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 4);
        }
        let mut rebuilt = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.chars().skip(1));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn zero_overlap_partitions_the_text() {
        let chunker = Chunker::new(4, 0).unwrap();
        let texts = chunk_texts(&chunker, "abcdefghij");
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
        assert_eq!(texts.concat(), "abcdefghij");
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(matches!(
            Chunker::new(0, 0),
            Err(RagError::Configuration(_))
        ));
        assert!(matches!(
            Chunker::new(10, 10),
            Err(RagError::Configuration(_))
        ));
        assert!(matches!(
            Chunker::new(10, 11),
            Err(RagError::Configuration(_))
        ));
    }

    #[test]
    fn chunk_indexes_are_sequential_per_source() {
        let chunker = Chunker::new(5, 1).unwrap();
        let chunks = chunker.split("abcdefghijklmnop", "doc");
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }
}
