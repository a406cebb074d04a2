//! Overlapping fixed-size windows over document text

use crate::config::Config;
use crate::error::{Error, Result};

/// A window of the source text. Offsets count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Splits text into chunks of at most `chunk_size` characters.
///
/// Cuts prefer a paragraph break, then a line break, then any whitespace,
/// and fall back to a hard cut. Each chunk starts no later than the previous
/// one ended and overlaps it by at most `chunk_overlap` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than zero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n = chars.len();

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < n {
            let hard_end = (start + self.chunk_size).min(n);
            let end = if hard_end == n {
                n
            } else {
                // Cutting after start + overlap guarantees the next start moves forward
                self.cut_point(&chars, start, hard_end).unwrap_or(hard_end)
            };

            chunks.push(Chunk {
                index: chunks.len(),
                start,
                end,
                text: text[offsets[start]..offsets[end]].to_string(),
            });
            if end == n {
                break;
            }

            let mut next = end - self.chunk_overlap;
            if next > 0 && !chars[next - 1].is_whitespace() {
                if let Some(space) = (next..end).find(|&i| chars[i].is_whitespace()) {
                    next = space + 1;
                }
            }
            start = next;
        }
        chunks
    }

    fn cut_point(&self, chars: &[char], start: usize, hard_end: usize) -> Option<usize> {
        let lo = start + self.chunk_overlap + 1;
        let structural_lo = lo.max(start + self.chunk_size / 2);

        let paragraph = |e: usize| e >= 2 && chars[e - 1] == '\n' && chars[e - 2] == '\n';
        let line = |e: usize| chars[e - 1] == '\n';
        let space = |e: usize| chars[e - 1].is_whitespace();

        (structural_lo..=hard_end)
            .rev()
            .find(|&e| paragraph(e))
            .or_else(|| (structural_lo..=hard_end).rev().find(|&e| line(e)))
            .or_else(|| (lo..=hard_end).rev().find(|&e| space(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(chunks: &[Chunk]) -> String {
        let mut out: Vec<char> = Vec::new();
        let mut covered = 0;
        for chunk in chunks {
            let skip = covered - chunk.start;
            out.extend(chunk.text.chars().skip(skip));
            covered = chunk.end;
        }
        out.into_iter().collect()
    }

    fn assert_covers(text: &str, chunks: &[Chunk], size: usize, overlap: usize) {
        let n = text.chars().count();
        assert_eq!(chunks.first().map(|c| c.start), Some(0));
        assert_eq!(chunks.last().map(|c| c.end), Some(n));
        for chunk in chunks {
            assert!(chunk.text.chars().count() <= size, "chunk {} too long", chunk.index);
            assert_eq!(chunk.text.chars().count(), chunk.end - chunk.start);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start <= pair[0].end, "gap before chunk {}", pair[1].index);
            assert!(pair[1].start > pair[0].start);
            assert!(pair[0].end - pair[1].start <= overlap);
        }
        assert_eq!(reassemble(chunks), text);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = TextChunker::new(1000, 200).unwrap();
        let chunks = chunker.split("hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert!(chunker.split("").is_empty());
    }

    #[test]
    fn prose_covers_without_gaps() {
        let paragraph = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let text = format!("{}\n\n{}\nLast line.", paragraph, paragraph);
        let chunker = TextChunker::new(1000, 200).unwrap();
        let chunks = chunker.split(&text);

        assert!(chunks.len() > 1);
        assert_covers(&text, &chunks, 1000, 200);
    }

    #[test]
    fn unbroken_text_uses_hard_cuts() {
        let text = "x".repeat(2500);
        let chunker = TextChunker::new(1000, 200).unwrap();
        let chunks = chunker.split(&text);

        assert_eq!(chunks[0].end, 1000);
        assert_eq!(chunks[1].start, 800);
        assert_covers(&text, &chunks, 1000, 200);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "héllo wörld ünïcode ".repeat(30);
        let chunker = TextChunker::new(64, 16).unwrap();
        let chunks = chunker.split(&text);
        assert_covers(&text, &chunks, 64, 16);
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let text = format!("{}\n\n{}", "a ".repeat(40), "b ".repeat(40));
        let chunker = TextChunker::new(100, 10).unwrap();
        let chunks = chunker.split(&text);
        assert!(chunks[0].text.ends_with("\n\n"));
        assert_covers(&text, &chunks, 100, 10);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(TextChunker::new(10, 10).is_err());
        assert!(TextChunker::new(0, 0).is_err());
    }
}
