//! End-to-end engine behavior with mock model collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use docqa::config::Config;
use docqa::embedding::Embedder;
use docqa::engine::Engine;
use docqa::llm::{ChatMessage, ChatModel, GenerationParams, LlmError, VisionModel};
use docqa::retrieval::RetrievalMode;

#[derive(Debug, Clone)]
struct Call {
    model: String,
    num_predict: u32,
    temperature: f32,
    message_count: usize,
    last_content: String,
}

#[derive(Default)]
struct MockChat {
    timeout_next: AtomicBool,
    calls: Mutex<Vec<Call>>,
}

impl MockChat {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn last_call(&self) -> Call {
        self.calls.lock().unwrap().last().cloned().expect("no calls recorded")
    }

    fn fail_next_with_timeout(&self) {
        self.timeout_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatModel for MockChat {
    async fn generate(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call {
            model: model.to_string(),
            num_predict: params.num_predict,
            temperature: params.temperature,
            message_count: messages.len(),
            last_content: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
        });
        let n = calls.len();
        drop(calls);

        if self.timeout_next.swap(false, Ordering::SeqCst) {
            return Err(LlmError::Timeout {
                elapsed: params.timeout.as_secs(),
            });
        }
        Ok(format!("reply-{}", n))
    }
}

struct MockVision;

#[async_trait]
impl VisionModel for MockVision {
    async fn describe(
        &self,
        _model: &str,
        _image: &[u8],
        file_name: &str,
    ) -> Result<String, LlmError> {
        Ok(format!("A bar chart from {}", file_name))
    }
}

/// Deterministic embeddings: each marker word contributes one axis.
struct MockEmbedder;

fn toy_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let axes = ["revenue", "cats", "chart"];
    let mut v: Vec<f32> = axes
        .iter()
        .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
        .collect();
    v.push(0.1);
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.into_iter().map(|x| x / norm).collect()
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| toy_vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

struct Fixture {
    engine: Engine,
    chat: Arc<MockChat>,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.index.dir = dir.path().join("index");

    let chat = Arc::new(MockChat::default());
    let engine = Engine::new(
        config,
        chat.clone(),
        Arc::new(MockVision),
        Arc::new(MockEmbedder),
    )
    .unwrap();

    Fixture {
        engine,
        chat,
        _dir: dir,
    }
}

const REPORT: &[u8] = b"Revenue grew twelve percent in the third quarter.\n\n\
    Operating costs were flat against the previous year.";

const QUESTION: &str = "What does the quarterly report say about revenue growth?";

#[tokio::test]
async fn question_before_any_ingest_is_answered_directly() {
    let mut f = fixture();
    let response = f.engine.ask(QUESTION).await;

    assert!(response.sources.is_empty());
    let call = f.chat.last_call();
    assert_eq!(call.message_count, 1);
    assert_eq!(call.last_content, QUESTION);
    // Direct chat runs the warm session
    assert!((call.temperature - 0.7).abs() < f32::EPSILON);
    assert!(f.engine.memory().is_empty());
}

#[tokio::test]
async fn casual_message_skips_retrieval_even_with_documents() {
    let mut f = fixture();
    f.engine.ingest_file(REPORT, "report.txt").await.unwrap();
    assert!(f.engine.has_index());

    let response = f.engine.ask("hey, how's it going?").await;
    assert!(response.sources.is_empty());
    let call = f.chat.last_call();
    assert!((call.temperature - 0.7).abs() < f32::EPSILON);
    assert!(!call.last_content.contains("Context from documents"));
    assert!(f.engine.memory().is_empty());
}

#[tokio::test]
async fn document_question_is_grounded_in_retrieved_context() {
    let mut f = fixture();
    f.engine.ingest_file(REPORT, "report.txt").await.unwrap();

    let response = f.engine.ask(QUESTION).await;
    assert!(!response.sources.is_empty());
    assert_eq!(response.sources[0].metadata.source, "report.txt");

    let call = f.chat.last_call();
    assert!((call.temperature - 0.2).abs() < f32::EPSILON);
    assert!(call.last_content.contains("Context from documents:"));
    assert!(call.last_content.contains("Revenue grew twelve percent"));
    assert!(call.last_content.contains(QUESTION));
    assert_eq!(f.engine.memory().len(), 1);
}

#[tokio::test]
async fn conversation_memory_is_sent_with_later_questions() {
    let mut f = fixture();
    f.engine.ingest_file(REPORT, "report.txt").await.unwrap();

    f.engine.ask(QUESTION).await;
    f.engine.ask("How did the revenue compare with operating costs?").await;

    let call = f.chat.last_call();
    // one user/assistant pair of history plus the new prompt
    assert_eq!(call.message_count, 3);
    assert_eq!(f.engine.memory().len(), 2);
}

#[tokio::test]
async fn timeout_degrades_to_hint_and_leaves_memory_untouched() {
    let mut f = fixture();
    f.engine.ingest_file(REPORT, "report.txt").await.unwrap();
    f.engine.ask(QUESTION).await;
    assert_eq!(f.engine.memory().len(), 1);

    f.chat.fail_next_with_timeout();
    let response = f.engine.ask("What happened with revenue after the reorganization?").await;

    assert!(response.answer.contains("timed out after 300s"));
    assert!(response.sources.is_empty());
    assert_eq!(f.engine.memory().len(), 1);
}

#[tokio::test]
async fn switch_model_changes_tier_but_preserves_memory() {
    let mut f = fixture();
    f.engine.ingest_file(REPORT, "report.txt").await.unwrap();
    f.engine.ask(QUESTION).await;
    assert_eq!(f.chat.last_call().num_predict, 384); // qwen2.5:7b is mid tier

    f.engine.switch_model("qwen2.5:14b");
    assert_eq!(f.engine.memory().len(), 1);
    assert_eq!(f.engine.model(), "qwen2.5:14b");

    f.engine.ask("Did the revenue trend continue afterwards as well?").await;
    let call = f.chat.last_call();
    assert_eq!(call.model, "qwen2.5:14b");
    assert_eq!(call.num_predict, 512);
    // History from before the switch still rides along
    assert_eq!(call.message_count, 3);
}

#[tokio::test]
async fn retrieval_can_be_reconfigured_at_runtime() {
    let mut f = fixture();
    assert_eq!(f.engine.retrieval_config().mode, RetrievalMode::Mmr);

    let mut retrieval = f.engine.retrieval_config().clone();
    retrieval.mode = RetrievalMode::Similarity;
    retrieval.k = 3;
    f.engine.configure_retrieval(retrieval).unwrap();

    assert_eq!(f.engine.retrieval_config().mode, RetrievalMode::Similarity);
    assert_eq!(f.engine.retrieval_config().effective_k(), 3);

    let mut bad = f.engine.retrieval_config().clone();
    bad.lambda = 2.0;
    assert!(f.engine.configure_retrieval(bad).is_err());
    // Rejected settings leave the previous configuration in place
    assert_eq!(f.engine.retrieval_config().mode, RetrievalMode::Similarity);
}

#[tokio::test]
async fn unsupported_and_image_files_become_searchable_placeholders() {
    let mut f = fixture();
    let added = f.engine.ingest_file(b"\x00\x01", "firmware.bin").await.unwrap();
    assert_eq!(added, 1);
    let added = f.engine.ingest_file(b"\x89PNG", "sales-chart.png").await.unwrap();
    assert_eq!(added, 1);

    let sources = f.engine.indexed_sources();
    assert!(sources.contains(&"firmware.bin".to_string()));
    assert!(sources.contains(&"sales-chart.png".to_string()));

    let response = f.engine.ask("Which chart was included in the uploaded materials?").await;
    assert!(response
        .sources
        .iter()
        .any(|c| c.metadata.source == "sales-chart.png"));
}

#[tokio::test]
async fn clear_forgets_documents_and_conversation() {
    let mut f = fixture();
    f.engine.ingest_file(REPORT, "report.txt").await.unwrap();
    f.engine.ask(QUESTION).await;

    f.engine.clear();
    assert!(!f.engine.has_index());
    assert!(f.engine.processed_files().is_empty());
    assert!(f.engine.memory().is_empty());

    let response = f.engine.ask(QUESTION).await;
    assert!(response.sources.is_empty());
    assert!((f.chat.last_call().temperature - 0.7).abs() < f32::EPSILON);
}

#[tokio::test]
async fn persisted_index_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.index.dir = dir.path().join("index");

    {
        let mut engine = Engine::new(
            config.clone(),
            Arc::new(MockChat::default()),
            Arc::new(MockVision),
            Arc::new(MockEmbedder),
        )
        .unwrap();
        engine.ingest_file(REPORT, "report.txt").await.unwrap();
        assert!(engine.index_len() > 0);
    }

    let engine = Engine::new(
        config,
        Arc::new(MockChat::default()),
        Arc::new(MockVision),
        Arc::new(MockEmbedder),
    )
    .unwrap();
    assert!(engine.has_index());
    assert_eq!(engine.indexed_sources(), vec!["report.txt".to_string()]);
}
