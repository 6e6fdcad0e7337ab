//! Model sessions and parameter tiers.
//!
//! Generation limits are derived from the model name: larger models get
//! more output tokens, a wider context window, and a longer deadline.
//! Matching is substring-based over the lowercased name, so `"qwen2.5:14b"`
//! lands in the large tier via its `14b` marker.

use std::time::Duration;

use crate::llm::GenerationParams;

/// Name markers for the large tier.
const LARGE_MARKERS: [&str; 6] = ["qwen3", "14b", "32b", "70b", "deepseek-r1", "90b"];
/// Name markers for the mid tier.
const MID_MARKERS: [&str; 5] = ["7b", "8b", "11b", "13b", "qwen2.5:latest"];

/// What a session is for. Casual chat runs warmer; the document-grounded
/// session runs cold so answers stick to the retrieved context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Chat,
    Retrieval,
}

impl SessionRole {
    pub fn temperature(&self) -> f32 {
        match self {
            SessionRole::Chat => 0.7,
            SessionRole::Retrieval => 0.2,
        }
    }
}

/// Generation parameters for a model name and session role.
///
/// Tiers: large markers → (512 predict, 4096 ctx, 600s); mid markers →
/// (384, 3072, 300s); everything else → (256, 2048, 180s).
pub fn model_params_for(model: &str, role: SessionRole) -> GenerationParams {
    let lower = model.to_lowercase();
    let (num_predict, num_ctx, timeout_secs) =
        if LARGE_MARKERS.iter().any(|m| lower.contains(m)) {
            (512, 4096, 600)
        } else if MID_MARKERS.iter().any(|m| lower.contains(m)) {
            (384, 3072, 300)
        } else {
            (256, 2048, 180)
        };

    GenerationParams {
        num_predict,
        num_ctx,
        temperature: role.temperature(),
        timeout: Duration::from_secs(timeout_secs),
    }
}

/// A named model bound to the parameters its tier and role dictate.
#[derive(Debug, Clone)]
pub struct ModelSession {
    model: String,
    role: SessionRole,
    params: GenerationParams,
}

impl ModelSession {
    pub fn new(model: impl Into<String>, role: SessionRole) -> Self {
        let model = model.into();
        let params = model_params_for(&model, role);
        Self {
            model,
            role,
            params,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_tier_by_marker() {
        for model in ["qwen3:latest", "llama3.1:70b", "deepseek-r1:32b", "QWEN2.5:14B"] {
            let params = model_params_for(model, SessionRole::Retrieval);
            assert_eq!(params.num_predict, 512, "model {}", model);
            assert_eq!(params.num_ctx, 4096);
            assert_eq!(params.timeout, Duration::from_secs(600));
        }
    }

    #[test]
    fn mid_tier_by_marker() {
        for model in ["qwen2.5:7b", "llama3.1:8b", "qwen2.5:latest"] {
            let params = model_params_for(model, SessionRole::Retrieval);
            assert_eq!(params.num_predict, 384, "model {}", model);
            assert_eq!(params.num_ctx, 3072);
            assert_eq!(params.timeout, Duration::from_secs(300));
        }
    }

    #[test]
    fn unknown_models_get_the_small_tier() {
        let params = model_params_for("tinyllama", SessionRole::Chat);
        assert_eq!(params.num_predict, 256);
        assert_eq!(params.num_ctx, 2048);
        assert_eq!(params.timeout, Duration::from_secs(180));
    }

    #[test]
    fn role_sets_temperature() {
        let chat = ModelSession::new("qwen2.5:7b", SessionRole::Chat);
        let rag = ModelSession::new("qwen2.5:7b", SessionRole::Retrieval);
        assert!((chat.params().temperature - 0.7).abs() < f32::EPSILON);
        assert!((rag.params().temperature - 0.2).abs() < f32::EPSILON);
        // Same tier otherwise
        assert_eq!(chat.params().num_ctx, rag.params().num_ctx);
    }
}
