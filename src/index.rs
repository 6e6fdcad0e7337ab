//! In-memory vector index with JSON persistence.
//!
//! The index is a flat list of chunk/vector pairs scored by brute-force
//! cosine scan. Rebuilds replace the whole index; `clear` deletes the
//! persisted copy wholesale. The persisted file records the embedding
//! model name, and loading rejects an index written by a different model
//! since its vectors would be incomparable.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::Chunk;

const INDEX_FILE: &str = "index.json";
const INDEX_FORMAT_VERSION: u32 = 1;

#[derive(Debug)]
pub enum IndexError {
    /// `build` was called with no chunks. Always surfaced loudly so the
    /// caller can tell the user nothing was ingested.
    EmptyInput,
    /// Persisted index was written by a different embedding model.
    ModelMismatch { stored: String, active: String },
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::EmptyInput => {
                write!(f, "no chunks to index; ingest at least one document first")
            }
            IndexError::ModelMismatch { stored, active } => write!(
                f,
                "stored index was built with embedding model '{}' but '{}' is active; clear and re-ingest",
                stored, active
            ),
            IndexError::Corrupt(e) => write!(f, "stored index is unreadable: {}", e),
            IndexError::Io(e) => write!(f, "index I/O failed: {}", e),
        }
    }
}

impl std::error::Error for IndexError {}

/// One indexed chunk with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// On-disk shape of the index.
#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    embedding_model: String,
    built_at: chrono::DateTime<chrono::Utc>,
    entries: Vec<IndexEntry>,
}

/// A scored index entry borrowed during retrieval.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub chunk: &'a Chunk,
    pub vector: &'a [f32],
    pub score: f32,
}

/// Searchable chunk/vector pairs for one embedding model.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    embedding_model: String,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(embedding_model: impl Into<String>, entries: Vec<IndexEntry>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Owned copies of every indexed chunk, in index order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.entries.iter().map(|e| e.chunk.clone()).collect()
    }

    /// Distinct source filenames in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.chunk.metadata.source) {
                seen.push(entry.chunk.metadata.source.clone());
            }
        }
        seen
    }

    /// Best `k` entries by cosine similarity, highest first.
    pub fn top_candidates(&self, query: &[f32], k: usize) -> Vec<Candidate<'_>> {
        let mut scored: Vec<Candidate<'_>> = self
            .entries
            .iter()
            .map(|entry| Candidate {
                chunk: &entry.chunk,
                vector: &entry.vector,
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// Owns the live index and its persisted copy under one directory.
pub struct IndexManager {
    dir: PathBuf,
    index: Option<VectorIndex>,
}

impl IndexManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index: None,
        }
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn has_index(&self) -> bool {
        self.index.as_ref().map(|i| !i.is_empty()).unwrap_or(false)
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Embed `chunks` and replace the index wholesale. Fails loudly on
    /// empty input. Persistence failure is logged but does not fail the
    /// build; the in-memory index is still usable.
    pub async fn build(
        &mut self,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
    ) -> anyhow::Result<usize> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyInput.into());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        let count = entries.len();

        self.index = Some(VectorIndex::new(embedder.model_name(), entries));
        info!(chunks = count, "vector index rebuilt");

        if let Err(e) = self.persist() {
            warn!(error = %e, "failed to persist index; continuing with in-memory index");
        }

        Ok(count)
    }

    /// Write the current index to `<dir>/index.json` via a temp file and
    /// rename, so a crash never leaves a half-written index behind.
    pub fn persist(&self) -> Result<(), IndexError> {
        let index = match &self.index {
            Some(index) => index,
            None => return Ok(()),
        };

        std::fs::create_dir_all(&self.dir).map_err(|e| IndexError::Io(e.to_string()))?;

        let persisted = PersistedIndex {
            version: INDEX_FORMAT_VERSION,
            embedding_model: index.embedding_model.clone(),
            built_at: chrono::Utc::now(),
            entries: index.entries.clone(),
        };
        let json =
            serde_json::to_vec(&persisted).map_err(|e| IndexError::Io(e.to_string()))?;

        let tmp = self.dir.join(format!("{}.tmp", INDEX_FILE));
        std::fs::write(&tmp, &json).map_err(|e| IndexError::Io(e.to_string()))?;
        std::fs::rename(&tmp, self.index_path()).map_err(|e| IndexError::Io(e.to_string()))?;
        Ok(())
    }

    /// Load the persisted index, if any. Returns whether an index was
    /// loaded. `active_model` must match the model the index was built
    /// with.
    pub fn load(&mut self, active_model: &str) -> Result<bool, IndexError> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(false);
        }

        let json = std::fs::read(&path).map_err(|e| IndexError::Io(e.to_string()))?;
        let persisted: PersistedIndex =
            serde_json::from_slice(&json).map_err(|e| IndexError::Corrupt(e.to_string()))?;

        if persisted.version != INDEX_FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported index version {}",
                persisted.version
            )));
        }
        if persisted.embedding_model != active_model {
            return Err(IndexError::ModelMismatch {
                stored: persisted.embedding_model,
                active: active_model.to_string(),
            });
        }

        info!(
            chunks = persisted.entries.len(),
            built_at = %persisted.built_at,
            path = %path.display(),
            "loaded persisted index"
        );
        self.index = Some(VectorIndex::new(persisted.embedding_model, persisted.entries));
        Ok(true)
    }

    /// Drop the in-memory index and delete the persisted copy.
    pub fn clear(&mut self) -> Result<(), IndexError> {
        self.index = None;
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IndexError::Io(e.to_string())),
        }
    }
}
