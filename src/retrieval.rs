//! Retrieval strategies over the vector index.
//!
//! Three modes: plain similarity top-k, maximal marginal relevance (MMR)
//! for diversity, and similarity with a minimum score threshold. MMR
//! over-fetches a candidate pool (`fetch_k`) and greedily picks chunks
//! that balance relevance against redundancy with what is already picked.

use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::embedding::cosine_similarity;
use crate::index::VectorIndex;
use crate::models::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Top-k by cosine similarity.
    Similarity,
    /// Maximal marginal relevance: relevance traded against diversity.
    #[default]
    Mmr,
    /// Top-k by similarity, dropping results below `score_threshold`.
    Threshold,
}

impl std::str::FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "similarity" => Ok(RetrievalMode::Similarity),
            "mmr" => Ok(RetrievalMode::Mmr),
            "threshold" => Ok(RetrievalMode::Threshold),
            other => Err(format!(
                "unknown retrieval mode '{}' (expected similarity, mmr, or threshold)",
                other
            )),
        }
    }
}

impl std::fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalMode::Similarity => write!(f, "similarity"),
            RetrievalMode::Mmr => write!(f, "mmr"),
            RetrievalMode::Threshold => write!(f, "threshold"),
        }
    }
}

/// A retrieved chunk with its similarity score to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Executes the configured retrieval strategy against a vector index.
#[derive(Debug, Clone)]
pub struct Retriever {
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve the best chunks for an embedded query. Result order is the
    /// order chunks should appear in the prompt context.
    pub fn retrieve(&self, query: &[f32], index: &VectorIndex) -> Vec<ScoredChunk> {
        let k = self.config.effective_k();
        match self.config.mode {
            RetrievalMode::Similarity => self.scored(index, query, k),
            RetrievalMode::Threshold => {
                let mut results = self.scored(index, query, k);
                results.retain(|r| r.score >= self.config.score_threshold);
                results
            }
            RetrievalMode::Mmr => {
                let candidates = index.top_candidates(query, self.config.fetch_k());
                let vectors: Vec<&[f32]> =
                    candidates.iter().map(|c| c.vector).collect();
                maximal_marginal_relevance(query, &vectors, self.config.lambda, k)
                    .into_iter()
                    .map(|i| ScoredChunk {
                        chunk: candidates[i].chunk.clone(),
                        score: candidates[i].score,
                    })
                    .collect()
            }
        }
    }

    fn scored(&self, index: &VectorIndex, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        index
            .top_candidates(query, k)
            .into_iter()
            .map(|c| ScoredChunk {
                chunk: c.chunk.clone(),
                score: c.score,
            })
            .collect()
    }
}

/// Greedy MMR selection. Returns indices into `embeddings` in pick order.
///
/// Each step picks the candidate maximizing
/// `lambda * sim(query, candidate) - (1 - lambda) * max sim(candidate, picked)`.
/// `lambda = 1.0` degenerates to plain similarity ranking.
pub fn maximal_marginal_relevance(
    query: &[f32],
    embeddings: &[&[f32]],
    lambda: f32,
    k: usize,
) -> Vec<usize> {
    let relevance: Vec<f32> = embeddings
        .iter()
        .map(|e| cosine_similarity(query, e))
        .collect();

    let mut selected: Vec<usize> = Vec::new();
    while selected.len() < k.min(embeddings.len()) {
        let mut best: Option<(usize, f32)> = None;
        for (i, embedding) in embeddings.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let redundancy = selected
                .iter()
                .map(|&j| cosine_similarity(embedding, embeddings[j]))
                .fold(f32::NEG_INFINITY, f32::max)
                .max(0.0);
            let score = lambda * relevance[i] - (1.0 - lambda) * redundancy;
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((i, score));
            }
        }
        match best {
            Some((i, _)) => selected.push(i),
            None => break,
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_relevance_matches_similarity_order() {
        let query = [1.0, 0.0];
        let a = [1.0, 0.0];
        let b = [0.9, 0.1];
        let c = [0.0, 1.0];
        let embeddings: Vec<&[f32]> = vec![&c, &a, &b];
        let picks = maximal_marginal_relevance(&query, &embeddings, 1.0, 3);
        assert_eq!(picks, vec![1, 2, 0]);
    }

    #[test]
    fn diversity_avoids_near_duplicates() {
        let query = [1.0, 0.2];
        let a = [1.0, 0.0];
        let a_dup = [0.95, 0.05];
        let other = [0.5, 0.6];
        let embeddings: Vec<&[f32]> = vec![&a, &a_dup, &other];
        let picks = maximal_marginal_relevance(&query, &embeddings, 0.5, 2);
        // Most relevant candidate first; its near-duplicate then loses to
        // the diverse vector.
        assert_eq!(picks[0], 1);
        assert_eq!(picks[1], 2);
    }

    #[test]
    fn k_larger_than_pool_returns_everything() {
        let query = [1.0, 0.0];
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let embeddings: Vec<&[f32]> = vec![&a, &b];
        let picks = maximal_marginal_relevance(&query, &embeddings, 0.7, 10);
        assert_eq!(picks.len(), 2);
    }

    #[test]
    fn mode_parses_and_round_trips() {
        for mode in [
            RetrievalMode::Similarity,
            RetrievalMode::Mmr,
            RetrievalMode::Threshold,
        ] {
            let parsed: RetrievalMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
        assert!("nearest".parse::<RetrievalMode>().is_err());
        assert_eq!(RetrievalMode::default(), RetrievalMode::Mmr);
    }
}
