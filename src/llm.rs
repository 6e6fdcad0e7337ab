//! Language-model collaborators: chat completion and image description.
//!
//! Both traits are implemented by [`OllamaClient`] over the Ollama HTTP
//! API (`POST /api/chat`, non-streaming). Timeouts are per-request and
//! surface as [`LlmError::Timeout`] so the engine can degrade to a hint
//! instead of failing the conversation.

use async_trait::async_trait;
use base64::Engine as _;
use std::time::Duration;

/// Generation knobs passed with every chat request. Values come from the
/// model parameter tiers in [`crate::session`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Maximum tokens to generate (`num_predict`).
    pub num_predict: u32,
    /// Context window size (`num_ctx`).
    pub num_ctx: u32,
    pub temperature: f32,
    /// Whole-request deadline.
    pub timeout: Duration,
}

/// One message of a chat transcript.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug)]
pub enum LlmError {
    /// The request hit its deadline. `elapsed` is whole seconds.
    Timeout { elapsed: u64 },
    Api(String),
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Timeout { elapsed } => {
                write!(f, "model request timed out after {}s", elapsed)
            }
            LlmError::Api(e) => write!(f, "model request failed: {}", e),
        }
    }
}

impl std::error::Error for LlmError {}

/// Text-generation collaborator.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, LlmError>;
}

/// Image-description collaborator.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn describe(
        &self,
        model: &str,
        image: &[u8],
        file_name: &str,
    ) -> Result<String, LlmError>;
}

/// Fixed settings for the vision path; image description is a one-shot
/// call, not part of the tiered chat sessions.
const VISION_TEMPERATURE: f32 = 0.3;
const VISION_TIMEOUT: Duration = Duration::from_secs(300);

fn vision_prompt(file_name: &str) -> String {
    format!(
        "Analyze this image in detail. Provide:\n\n\
         1. MAIN CONTENT: What is the primary subject or purpose?\n\
         2. TEXT CONTENT: Any visible text, labels, captions, or written information\n\
         3. KEY DETAILS: Important visual elements, data, diagrams, or specific information\n\
         4. TYPE: What kind of image is this? (chart, diagram, photo, screenshot, document, etc.)\n\n\
         Be thorough and specific so this description can answer questions about the image.\n\n\
         Image: {}",
        file_name
    )
}

/// Ollama HTTP client implementing both model traits.
pub struct OllamaClient {
    client: reqwest::Client,
    chat_endpoint: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        // No client-level timeout; each request carries its own deadline.
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            chat_endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
        })
    }

    async fn chat(
        &self,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.chat_endpoint)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_request_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body_text)));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| classify_request_error(e, timeout))?;
        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::Api("response missing message content".to_string()))
    }
}

fn classify_request_error(e: reqwest::Error, timeout: Duration) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout {
            elapsed: timeout.as_secs(),
        }
    } else {
        LlmError::Api(e.to_string())
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "num_predict": params.num_predict,
                "num_ctx": params.num_ctx,
                "temperature": params.temperature,
            },
        });
        self.chat(body, params.timeout).await
    }
}

#[async_trait]
impl VisionModel for OllamaClient {
    async fn describe(
        &self,
        model: &str,
        image: &[u8],
        file_name: &str,
    ) -> Result<String, LlmError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let body = serde_json::json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": vision_prompt(file_name),
                "images": [encoded],
            }],
            "stream": false,
            "options": {
                "temperature": VISION_TEMPERATURE,
            },
        });
        self.chat(body, VISION_TIMEOUT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_with_role_and_content() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::assistant("a").role, "assistant");
    }

    #[test]
    fn vision_prompt_names_the_file() {
        let prompt = vision_prompt("diagram.png");
        assert!(prompt.contains("MAIN CONTENT"));
        assert!(prompt.contains("Image: diagram.png"));
    }

    #[test]
    fn timeout_error_reports_seconds() {
        let err = LlmError::Timeout { elapsed: 300 };
        assert_eq!(err.to_string(), "model request timed out after 300s");
    }
}
