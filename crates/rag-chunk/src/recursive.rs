//! Recursive character splitter.
//!
//! Splits text by trying progressively smaller separators until pieces fit
//! within the character budget, then merges neighbouring pieces back into
//! windows of at most `chunk_size` characters with `chunk_overlap` characters
//! carried over between consecutive windows.

use std::collections::VecDeque;

use rag_core::{ChunkConfig, ChunkData, Chunker, RagError, Result};

/// Page separator inside extracted document text.
const PAGE_BREAK: char = '\u{000C}';

/// Separators tried in order: paragraph, line, sentence, word, character.
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Recursive chunker that splits text by multiple separators.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecursiveChunker;

impl RecursiveChunker {
    pub fn new() -> Self {
        Self
    }

    fn len(text: &str) -> usize {
        text.chars().count()
    }

    /// Split text by a separator, dropping empty pieces.
    fn split_by_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
        if separator.is_empty() {
            // Character-level split as last resort
            return text
                .char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect();
        }

        text.split(separator).filter(|s| !s.is_empty()).collect()
    }

    /// Recursively split text into windows.
    fn split_recursive(&self, text: &str, separators: &[&str], config: &ChunkConfig) -> Vec<String> {
        // First separator present in the text; "" always matches
        let sep_idx = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(sep_idx).copied().unwrap_or("");
        let remaining = separators.get(sep_idx + 1..).unwrap_or(&[]);

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for part in Self::split_by_separator(text, separator) {
            if Self::len(part) < config.chunk_size {
                fitting.push(part);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator, config));
                fitting.clear();
            }

            if remaining.is_empty() {
                chunks.push(part.to_string());
            } else {
                chunks.extend(self.split_recursive(part, remaining, config));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator, config));
        }

        chunks
    }

    /// Merge small pieces into windows, keeping up to `chunk_overlap`
    /// characters of the previous window at the start of the next.
    fn merge(&self, pieces: &[&str], separator: &str, config: &ChunkConfig) -> Vec<String> {
        let sep_len = Self::len(separator);
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let piece_len = Self::len(piece);
            let joiner = if current.is_empty() { 0 } else { sep_len };

            if total + piece_len + joiner > config.chunk_size && !current.is_empty() {
                Self::push_window(&mut windows, &current, separator);

                // Drop from the front until the carried-over tail fits
                while total > config.chunk_overlap
                    || (total > 0
                        && total + piece_len + if current.is_empty() { 0 } else { sep_len }
                            > config.chunk_size)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= Self::len(front) + if current.is_empty() { 0 } else { sep_len };
                }
            }

            let joiner = if current.is_empty() { 0 } else { sep_len };
            current.push_back(piece);
            total += piece_len + joiner;
        }

        Self::push_window(&mut windows, &current, separator);
        windows
    }

    fn push_window(windows: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
        let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            windows.push(trimmed.to_string());
        }
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, content: &str, config: &ChunkConfig) -> Result<Vec<ChunkData>> {
        if config.chunk_size == 0 || config.chunk_overlap >= config.chunk_size {
            return Err(RagError::chunking(format!(
                "invalid window: size {} overlap {}",
                config.chunk_size, config.chunk_overlap
            )));
        }

        let mut chunks = Vec::new();
        for (page, page_text) in content.split(PAGE_BREAK).enumerate() {
            if page_text.trim().is_empty() {
                continue;
            }
            for window in self.split_recursive(page_text, &SEPARATORS, config) {
                chunks.push(ChunkData {
                    content: window,
                    page: page as u32,
                });
            }
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn test_simple_chunk() {
        let chunker = RecursiveChunker::new();
        let text = "Hello world. This is a test.";
        let chunks = chunker.chunk(text, &config(100, 10)).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert_eq!(chunks[0].page, 0);
    }

    #[test]
    fn test_paragraph_split() {
        let chunker = RecursiveChunker::new();
        let text = "First paragraph with several words here.\n\nSecond paragraph also with words.\n\nThird paragraph too.";
        let chunks = chunker.chunk(text, &config(45, 0)).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "First paragraph with several words here.");
        assert_eq!(chunks[2].content, "Third paragraph too.");
    }

    #[test]
    fn test_chunks_respect_size() {
        let chunker = RecursiveChunker::new();
        let text = "word ".repeat(500);
        let chunks = chunker.chunk(&text, &config(100, 20)).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 100, "{}", chunk.content.len());
        }
    }

    #[test]
    fn test_overlap_carries_tail() {
        let chunker = RecursiveChunker::new();
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = chunker.chunk(text, &config(24, 12)).unwrap();

        assert!(chunks.len() >= 2);
        // The tail of one window reappears in the next one
        let first_last_word = chunks[0].content.split(' ').last().unwrap();
        assert!(chunks[1].content.contains(first_last_word));
        assert!(!chunks[1].content.starts_with("alpha"));
    }

    #[test]
    fn test_long_word_falls_back_to_characters() {
        let chunker = RecursiveChunker::new();
        let text = "x".repeat(25);
        let chunks = chunker.chunk(&text, &config(10, 0)).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "x".repeat(10));
        assert_eq!(chunks[2].content, "x".repeat(5));
    }

    #[test]
    fn test_pages_are_numbered() {
        let chunker = RecursiveChunker::new();
        let text = "Page one text.\u{000C}Page two text.\u{000C}\u{000C}Page four.";
        let chunks = chunker.chunk(text, &config(100, 0)).unwrap();

        let pages: Vec<u32> = chunks.iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![0, 1, 3]);
    }

    #[test]
    fn test_empty_content() {
        let chunker = RecursiveChunker::new();
        let chunks = chunker.chunk("", &ChunkConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_invalid_window() {
        let chunker = RecursiveChunker::new();
        assert!(chunker.chunk("text", &config(10, 10)).is_err());
    }
}
