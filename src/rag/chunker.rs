//! Recursive character chunker.
//!
//! Splits a document on a priority-ordered list of separators (section
//! headers first, single spaces last), descending to a finer separator only
//! for segments that are still larger than `chunk_size`. Small segments are
//! merged back into windows of at most `chunk_size` characters, and each
//! window repeats up to `chunk_overlap` trailing characters of the previous
//! one.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::RagError;
use crate::core::config::defaults::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_SEPARATORS};
use crate::core::config::AppConfig;

/// Configuration for the recursive chunker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks
    pub chunk_overlap: usize,
    /// Separators, coarsest first
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl From<&AppConfig> for ChunkerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: config.separators.clone(),
        }
    }
}

/// A text chunk with source information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Stable identifier: source fingerprint + chunk index
    pub chunk_id: String,
    /// The text content
    pub text: String,
    /// Source identifier (URL or path)
    pub source: String,
    /// Character offset in original document
    pub start_offset: usize,
    /// Chunk index within the source
    pub chunk_index: usize,
}

impl TextChunk {
    /// Character offset one past the last character of this chunk.
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.text.chars().count()
    }
}

/// Byte range into the document being split.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

pub struct RecursiveChunker {
    config: ChunkerConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split a document into ordered, overlapping chunks.
    pub fn split(&self, text: &str, source: &str) -> Result<Vec<TextChunk>, RagError> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyDocument(source.to_string()));
        }

        let mut spans = Vec::new();
        self.split_recursive(
            text,
            Span {
                start: 0,
                end: text.len(),
            },
            &self.config.separators,
            &mut spans,
        );

        let fingerprint = source_fingerprint(source);
        let mut chunks: Vec<TextChunk> = Vec::with_capacity(spans.len());
        // spans are strictly increasing, so char offsets are counted incrementally
        let mut cursor_byte = 0;
        let mut cursor_char = 0;
        let mut last_start_byte = None;

        for span in spans {
            let raw = &text[span.start..span.end];
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let start_byte = span.start + (raw.len() - raw.trim_start().len());

            // A window that only differed by leading whitespace is superseded
            // by the longer one starting at the same character.
            if last_start_byte == Some(start_byte) {
                if let Some(last) = chunks.last_mut() {
                    last.text = trimmed.to_string();
                    continue;
                }
            }
            last_start_byte = Some(start_byte);

            cursor_char += text[cursor_byte..start_byte].chars().count();
            cursor_byte = start_byte;

            let chunk_index = chunks.len();
            chunks.push(TextChunk {
                chunk_id: format!("{}-{}", fingerprint, chunk_index),
                text: trimmed.to_string(),
                source: source.to_string(),
                start_offset: cursor_char,
                chunk_index,
            });
        }

        if chunks.is_empty() {
            return Err(RagError::EmptyDocument(source.to_string()));
        }

        tracing::debug!(
            "Split {} ({} chars) into {} chunks",
            source,
            text.chars().count(),
            chunks.len()
        );
        Ok(chunks)
    }

    fn split_recursive(&self, text: &str, span: Span, separators: &[String], out: &mut Vec<Span>) {
        let segment = &text[span.start..span.end];
        let chosen = separators
            .iter()
            .position(|sep| segment.contains(sep.as_str()));

        let (pieces, finer) = match chosen {
            Some(idx) => (
                split_keeping_separator(segment, span.start, &separators[idx]),
                &separators[idx + 1..],
            ),
            None => (vec![span], &separators[separators.len()..]),
        };

        let mut pending: Vec<Span> = Vec::new();
        for piece in pieces {
            if char_len(text, piece) <= self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                out.extend(self.merge(text, &pending));
                pending.clear();
            }

            if finer.is_empty() {
                // nothing left to split on: emitted whole
                out.push(piece);
            } else {
                self.split_recursive(text, piece, finer, out);
            }
        }

        if !pending.is_empty() {
            out.extend(self.merge(text, &pending));
        }
    }

    /// Greedily packs contiguous pieces into windows no larger than `chunk_size`.
    fn merge(&self, text: &str, pieces: &[Span]) -> Vec<Span> {
        let chunk_size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut windows = Vec::new();
        let mut window: VecDeque<(Span, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(text, piece);

            if total + len > chunk_size && !window.is_empty() {
                windows.push(window_span(&window));

                while total > overlap || (total + len > chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, popped)) => total -= popped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, len));
            total += len;
        }

        if !window.is_empty() {
            windows.push(window_span(&window));
        }

        windows
    }
}

fn window_span(window: &VecDeque<(Span, usize)>) -> Span {
    let start = window.front().map(|(span, _)| span.start).unwrap_or(0);
    let end = window.back().map(|(span, _)| span.end).unwrap_or(start);
    Span { start, end }
}

/// Cuts `segment` in front of every occurrence of `separator`, so each piece
/// after the first begins with the separator it was split on.
fn split_keeping_separator(segment: &str, base: usize, separator: &str) -> Vec<Span> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, _) in segment.match_indices(separator) {
        if idx > start {
            pieces.push(Span {
                start: base + start,
                end: base + idx,
            });
        }
        start = idx;
    }
    if start < segment.len() {
        pieces.push(Span {
            start: base + start,
            end: base + segment.len(),
        });
    }

    pieces
}

fn char_len(text: &str, span: Span) -> usize {
    text[span.start..span.end].chars().count()
}

fn source_fingerprint(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(chunk_size: usize, chunk_overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkerConfig {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        })
    }

    fn sample_manual() -> String {
        let mut doc = String::from("# Руководство по эксплуатации\n");
        for section in 1..=6 {
            doc.push_str(&format!("\n## Раздел {}\n", section));
            for item in 1..=5 {
                doc.push_str(&format!(
                    "- Пункт {}.{}: проверьте питание контроллера и индикатор состояния перед повторным запуском.\n",
                    section, item
                ));
            }
            doc.push_str("Если индикатор мигает красным, отключите устройство на десять секунд.\n");
        }
        doc
    }

    fn chars_between(text: &str, from: usize, to: usize) -> String {
        text.chars().skip(from).take(to.saturating_sub(from)).collect()
    }

    #[test]
    fn empty_document_is_rejected() {
        let chunker = chunker(100, 10);
        assert!(matches!(
            chunker.split("", "doc"),
            Err(RagError::EmptyDocument(_))
        ));
        assert!(matches!(
            chunker.split("  \n\t \n", "doc"),
            Err(RagError::EmptyDocument(_))
        ));
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let chunks = chunker(100, 10).split("  Reset the router.  ", "doc").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Reset the router.");
        assert_eq!(chunks[0].start_offset, 2);
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn chunks_respect_size_and_overlap() {
        let doc = sample_manual();
        for (size, overlap) in [(80, 0), (120, 20), (200, 50), (400, 100), (1000, 100)] {
            let chunks = chunker(size, overlap).split(&doc, "manual").unwrap();
            assert!(chunks.len() > 1, "size {} should split the manual", size);

            for chunk in &chunks {
                assert!(
                    chunk.text.chars().count() <= size,
                    "chunk of {} chars exceeds {}",
                    chunk.text.chars().count(),
                    size
                );
            }

            for pair in chunks.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                let prev_end = prev.end_offset();
                assert!(next.start_offset > prev.start_offset);
                assert!(
                    next.start_offset + overlap >= prev_end,
                    "chunk {} starts too far before the end of chunk {}",
                    next.chunk_index,
                    prev.chunk_index
                );
                if next.start_offset > prev_end {
                    let gap = chars_between(&doc, prev_end, next.start_offset);
                    assert!(gap.trim().is_empty(), "non-whitespace gap {:?}", gap);
                }
            }
        }
    }

    #[test]
    fn offsets_point_at_chunk_text() {
        let doc = sample_manual();
        let chunks = chunker(150, 30).split(&doc, "manual").unwrap();
        for chunk in chunks {
            let len = chunk.text.chars().count();
            assert_eq!(
                chars_between(&doc, chunk.start_offset, chunk.start_offset + len),
                chunk.text
            );
        }
    }

    #[test]
    fn headers_take_priority_over_lines() {
        let doc = "# Intro\nshort intro text\n# Wiring\nconnect the red wire\n# Reset\nhold the button";
        let chunks = chunker(30, 0).split(doc, "doc").unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "# Intro\nshort intro text",
                "# Wiring\nconnect the red wire",
                "# Reset\nhold the button"
            ]
        );
    }

    #[test]
    fn indivisible_unit_may_exceed_chunk_size() {
        let word = "x".repeat(50);
        let doc = format!("tiny {} tail", word);
        let chunks = chunker(10, 2).split(&doc, "doc").unwrap();

        assert!(chunks.iter().any(|c| c.text == word));
        for chunk in chunks.iter().filter(|c| c.text != word) {
            assert!(chunk.text.chars().count() <= 10);
        }
    }

    #[test]
    fn splitting_is_deterministic() {
        let doc = sample_manual();
        let chunker = chunker(120, 25);
        let first = chunker.split(&doc, "manual").unwrap();
        let second = chunker.split(&doc, "manual").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn lengths_are_counted_in_characters() {
        // 3 Cyrillic words of 6 chars (12 bytes each)
        let doc = "привет привет привет";
        let chunks = chunker(13, 0).split(doc, "doc").unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "привет привет");
        assert_eq!(chunks[1].text, "привет");
        assert_eq!(chunks[1].start_offset, 14);
    }

    #[test]
    fn chunk_ids_share_source_fingerprint() {
        let chunks = chunker(30, 5).split(&sample_manual(), "https://example.com/manual").unwrap();
        let prefix = chunks[0].chunk_id.rsplit_once('-').unwrap().0.to_string();
        assert_eq!(prefix.len(), 12);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, format!("{}-{}", prefix, i));
        }
    }
}
