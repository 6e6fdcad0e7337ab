//! Cascading-separator text chunker.
//!
//! Splits extracted document text into overlapping windows bounded by
//! `chunk_size`. Splitting applies a cascade of separators from coarsest
//! (section breaks) to finest (character boundary): text is split on the
//! coarsest separator present, and only pieces that still exceed the size
//! bound are split again with the next separator. Pieces are then merged
//! back into windows, carrying `chunk_overlap` trailing content into the
//! next window.
//!
//! Window sizes are chosen per format class: wide windows with generous
//! overlap for tabular text, one large non-overlapping window for image
//! descriptions, a moderate window for prose.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::extract::FormatClass;
use crate::models::{Chunk, DocMetadata, ExtractedDocument};

/// Separator cascade, coarsest first. The empty string means a plain
/// character split and guarantees the cascade always terminates.
pub const SEPARATORS: [&str; 6] = ["\n\n\n", "\n\n", "\n", ". ", " ", ""];

/// Recursive-fallback splitter. Separators are kept attached to the start
/// of the piece that follows them, so re-joining pieces reproduces the
/// original text.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        // Overlap must leave room for new content in every window.
        let chunk_overlap = chunk_overlap.min(chunk_size.saturating_sub(1));
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into ordered windows of at most `chunk_size` bytes.
    /// Always returns at least one (possibly empty) window.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chunks = self.split_recursive(text, &SEPARATORS);
        if chunks.is_empty() {
            return vec![text.trim().to_string()];
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // Coarsest separator actually present in this text.
        let sep_idx = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let sep = separators.get(sep_idx).copied().unwrap_or("");
        let remaining = &separators[(sep_idx + 1).min(separators.len())..];

        let pieces = split_with_separator(text, sep);

        let mut final_chunks = Vec::new();
        let mut good: Vec<String> = Vec::new();

        for piece in pieces {
            if piece.len() <= self.chunk_size {
                good.push(piece);
                continue;
            }
            // Oversized piece: flush what we have, then fall back to the
            // next separator (or emit as-is when the cascade is exhausted).
            if !good.is_empty() {
                final_chunks.extend(self.merge_pieces(&good));
                good.clear();
            }
            if remaining.is_empty() {
                final_chunks.push(piece);
            } else {
                final_chunks.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !good.is_empty() {
            final_chunks.extend(self.merge_pieces(&good));
        }

        final_chunks
    }

    /// Merge small pieces into windows, keeping a trailing tail of up to
    /// `chunk_overlap` bytes as the head of the next window.
    fn merge_pieces(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = piece.len();
            if total + len > self.chunk_size && !window.is_empty() {
                push_window(&mut chunks, &window);
                // Shrink the window to the overlap budget, and further if
                // the incoming piece still would not fit.
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some(front) => total -= front.len(),
                        None => break,
                    }
                }
            }
            window.push_back(piece.as_str());
            total += len;
        }

        push_window(&mut chunks, &window);
        chunks
    }
}

fn push_window(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split on `sep`, attaching each separator occurrence to the piece that
/// follows it. An empty separator splits into individual characters.
fn split_with_separator(text: &str, sep: &str) -> Vec<String> {
    if sep.is_empty() {
        return text.chars().map(|c| c.to_string()).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    let mut search = 0;
    while let Some(pos) = text[search..].find(sep) {
        let at = search + pos;
        if at > start {
            pieces.push(text[start..at].to_string());
        }
        start = at;
        search = at + sep.len();
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }
    pieces
}

/// Window size and overlap for a format class.
pub fn chunk_policy(class: FormatClass, config: &ChunkingConfig) -> (usize, usize) {
    if class.is_tabular() {
        (config.tabular_chunk_size, config.tabular_overlap)
    } else if class == FormatClass::Image {
        (config.image_chunk_size, 0)
    } else {
        (config.prose_chunk_size, config.prose_overlap)
    }
}

/// Chunk a batch of extracted documents. Every chunk inherits its parent
/// document's metadata; indices restart at 0 per document.
pub fn split_documents(
    documents: &[ExtractedDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    let splitter = TextSplitter::new(chunk_size, chunk_overlap);
    let mut chunks = Vec::new();

    for doc in documents {
        for (index, text) in splitter.split_text(&doc.text).into_iter().enumerate() {
            chunks.push(make_chunk(index as i64, text, doc.metadata.clone()));
        }
    }

    chunks
}

fn make_chunk(index: i64, text: String, metadata: DocMetadata) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        chunk_index: index,
        text,
        hash,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Length of the longest suffix of `prev` that is a prefix of `next`.
    fn shared_overlap(prev: &str, next: &str) -> usize {
        let mut best = 0;
        for (i, _) in next.char_indices().skip(1) {
            if prev.ends_with(&next[..i]) {
                best = i;
            }
        }
        if prev.ends_with(next) {
            best = next.len();
        }
        best
    }

    #[test]
    fn small_text_single_chunk() {
        let splitter = TextSplitter::new(1200, 300);
        let chunks = splitter.split_text("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_yields_one_chunk() {
        let splitter = TextSplitter::new(1200, 300);
        let chunks = splitter.split_text("");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn respects_size_bound() {
        let text = (0..120)
            .map(|i| format!("Sentence number {} is here. ", i))
            .collect::<String>();
        let splitter = TextSplitter::new(200, 40);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(
                chunk.len() <= 200,
                "chunk exceeds bound: {} bytes",
                chunk.len()
            );
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let text = "First paragraph here.\n\nSecond paragraph here.\n\nThird paragraph here.";
        let splitter = TextSplitter::new(30, 0);
        let chunks = splitter.split_text(text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "First paragraph here.");
        assert_eq!(chunks[2], "Third paragraph here.");
    }

    #[test]
    fn falls_back_to_finer_separators() {
        // One long line with no paragraph breaks forces the sentence and
        // word separators into play.
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let splitter = TextSplitter::new(20, 0);
        let chunks = splitter.split_text(text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 20);
            assert!(!chunk.starts_with(' ') && !chunk.ends_with(' '));
        }
    }

    #[test]
    fn deterministic_boundaries() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let splitter = TextSplitter::new(120, 30);
        let a = splitter.split_text(&text);
        let b = splitter.split_text(&text);
        assert_eq!(a, b);
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let text = (0..80)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = TextSplitter::new(100, 30);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            assert!(
                shared_overlap(&pair[0], &pair[1]) > 0,
                "no overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn zero_overlap_never_repeats_content() {
        let text = (0..40)
            .map(|i| format!("item{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = TextSplitter::new(60, 0);
        let chunks = splitter.split_text(&text);
        let rejoined = chunks.join(" ");
        for i in 0..40 {
            let needle = format!("item{} ", i);
            let count = rejoined.matches(needle.trim_end()).count();
            // item4 also matches inside item40..item49; only check uniques
            if i >= 10 {
                assert_eq!(count, 1, "duplicated content for item{}", i);
            }
        }
    }

    #[test]
    fn policy_matches_format_class() {
        let config = ChunkingConfig::default();
        assert_eq!(
            chunk_policy(FormatClass::Spreadsheet, &config),
            (2000, 400)
        );
        assert_eq!(chunk_policy(FormatClass::Csv, &config), (2000, 400));
        assert_eq!(chunk_policy(FormatClass::Image, &config), (4000, 0));
        assert_eq!(chunk_policy(FormatClass::Pdf, &config), (1200, 300));
    }

    #[test]
    fn split_documents_carries_metadata() {
        let meta = DocMetadata {
            source: "report.pdf".to_string(),
            ..Default::default()
        };
        let docs = vec![ExtractedDocument::new(
            "Paragraph one.\n\nParagraph two.\n\nParagraph three.",
            meta,
        )];
        let chunks = split_documents(&docs, 25, 0);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
            assert_eq!(chunk.metadata.source, "report.pdf");
            assert!(!chunk.hash.is_empty());
        }
    }
}
