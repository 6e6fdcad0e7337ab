//! Core data models used throughout the docqa engine.
//!
//! These types represent the extracted documents, chunks, and responses that
//! flow through the ingestion and question-answering pipeline.

use serde::{Deserialize, Serialize};

/// Provenance metadata attached to an extracted document and inherited by
/// every chunk cut from it.
///
/// `source` is always the original upload filename — the ingestor overrides
/// whatever an extractor put there. The remaining fields are format-specific
/// and only set where they apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    /// Original filename of the ingested file.
    pub source: String,
    /// Content tag: `"image"`, `"error"`, `"unsupported"`, or absent for
    /// ordinary text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Worksheet name for spreadsheet-derived documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Row count for tabular documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    /// Column count for tabular documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
}

impl DocMetadata {
    pub fn for_source(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }
}

/// One logical unit of text produced by a content extractor.
///
/// A single file may yield several of these (one per spreadsheet sheet,
/// for example). Transient: exists only between extraction and chunking.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub metadata: DocMetadata,
}

impl ExtractedDocument {
    pub fn new(text: impl Into<String>, metadata: DocMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// A bounded text window cut from an [`ExtractedDocument`] — the atomic
/// retrieval unit. Adjacent chunks from the same document share
/// `chunk_overlap` content at their boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Position of this chunk within its source document, starting at 0.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of the chunk text, for staleness detection.
    pub hash: String,
    pub metadata: DocMetadata,
}

/// One question/answer turn of conversational memory.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Response shape returned by the query engine. `sources` is empty for
/// casual-chat answers and for all degraded failure answers.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Chunk>,
}

impl QueryResponse {
    /// An answer with no supporting chunks (casual chat or failure path).
    pub fn unsourced(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
        }
    }
}
