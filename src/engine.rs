//! Conversational query engine.
//!
//! Owns the index, retrieval strategy, conversation memory, and the two
//! model sessions (warm casual chat, cold document-grounded answering).
//! [`Engine::ask`] never returns an error: timeouts and model failures
//! degrade into explanatory answer strings so the conversation survives.
//!
//! Routing per question:
//! 1. casual message → direct chat, memory untouched
//! 2. no index yet → direct chat
//! 3. otherwise → embed, retrieve, answer from context, remember the turn

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classify::CasualClassifier;
use crate::config::{Config, RetrievalConfig};
use crate::embedding::{embed_query, Embedder};
use crate::index::IndexManager;
use crate::ingest;
use crate::llm::{ChatMessage, ChatModel, LlmError, VisionModel};
use crate::models::{ChatTurn, Chunk, QueryResponse};
use crate::retrieval::Retriever;
use crate::session::{ModelSession, SessionRole};

/// Question/answer history carried into every document-grounded request.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    turns: Vec<ChatTurn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remember(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(ChatTurn {
            question: question.into(),
            answer: answer.into(),
        });
    }

    /// Render the history as alternating user/assistant messages.
    pub fn as_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() * 2);
        for turn in &self.turns {
            messages.push(ChatMessage::user(&turn.question));
            messages.push(ChatMessage::assistant(&turn.answer));
        }
        messages
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }
}

fn compose_prompt(context: &str, question: &str) -> String {
    format!(
        "You are answering questions based on provided document context. \
         Use ALL the context below to give a complete answer.\n\n\
         Context from documents:\n{}\n\n\
         Question: {}\n\n\
         Instructions:\n\
         - Read through ALL the context carefully\n\
         - If listing items (like questions), list ALL of them that appear in the context\n\
         - If the context contains images, use the image descriptions provided\n\
         - If information is incomplete, say so\n\
         - Answer based ONLY on the context above\n\
         - Be concise but complete\n\n\
         Answer:",
        context, question
    )
}

fn timeout_answer(elapsed: u64) -> String {
    format!(
        "⚠️ Query timed out after {}s. Try using a faster model or asking a simpler question.",
        elapsed
    )
}

fn failure_answer(error: &str) -> String {
    format!(
        "❌ Error processing query: {}\n\nTry using a different model or simpler question.",
        error
    )
}

pub struct Engine {
    config: Config,
    chat_model: Arc<dyn ChatModel>,
    vision_model: Arc<dyn VisionModel>,
    embedder: Arc<dyn Embedder>,
    index: IndexManager,
    retriever: Retriever,
    classifier: CasualClassifier,
    chat_session: ModelSession,
    rag_session: ModelSession,
    memory: ConversationMemory,
    chunks: Vec<Chunk>,
    processed: Vec<String>,
}

impl Engine {
    /// Build an engine and load any compatible persisted index. An
    /// incompatible or corrupt persisted index is ignored with a warning,
    /// not a failure.
    pub fn new(
        config: Config,
        chat_model: Arc<dyn ChatModel>,
        vision_model: Arc<dyn VisionModel>,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        let classifier = CasualClassifier::new()?;
        let chat_session = ModelSession::new(&config.models.chat, SessionRole::Chat);
        let rag_session = ModelSession::new(&config.models.chat, SessionRole::Retrieval);
        let retriever = Retriever::new(config.retrieval.clone());

        let mut index = IndexManager::new(config.index.dir.clone());
        let mut chunks = Vec::new();
        let mut processed = Vec::new();
        match index.load(embedder.model_name()) {
            Ok(true) => {
                // Re-seed the ingestion ledger so later ingests rebuild over
                // the restored documents instead of dropping them.
                if let Some(loaded) = index.index() {
                    chunks = loaded.chunks();
                    processed = loaded.sources();
                }
            }
            Ok(false) => debug!("no persisted index found"),
            Err(e) => warn!(error = %e, "ignoring persisted index"),
        }

        Ok(Self {
            config,
            chat_model,
            vision_model,
            embedder,
            index,
            retriever,
            classifier,
            chat_session,
            rag_session,
            memory: ConversationMemory::new(),
            chunks,
            processed,
        })
    }

    /// Ingest one file's bytes: extract, chunk, and rebuild the index over
    /// everything ingested so far. Extraction problems become placeholder
    /// chunks; only indexing itself can fail. Returns the number of chunks
    /// the file contributed.
    pub async fn ingest_file(&mut self, bytes: &[u8], file_name: &str) -> anyhow::Result<usize> {
        let new_chunks = ingest::chunk_file(
            bytes,
            file_name,
            self.vision_model.as_ref(),
            &self.config,
        )
        .await;
        let added = new_chunks.len();
        info!(file = file_name, chunks = added, "file ingested");

        self.chunks.extend(new_chunks);
        self.processed.push(file_name.to_string());
        self.rebuild_index().await?;
        Ok(added)
    }

    async fn rebuild_index(&mut self) -> anyhow::Result<()> {
        self.index
            .build(self.chunks.clone(), self.embedder.as_ref())
            .await?;
        Ok(())
    }

    /// Answer a question. Never returns an error: failures degrade into
    /// answer strings with empty sources.
    pub async fn ask(&mut self, question: &str) -> QueryResponse {
        if self.classifier.is_casual(question) {
            debug!("casual message, answering without retrieval");
            return self.chat_direct(question).await;
        }

        if !self.index.has_index() {
            info!("no documents indexed, answering without retrieval");
            return self.chat_direct(question).await;
        }

        self.answer_from_documents(question).await
    }

    async fn chat_direct(&self, message: &str) -> QueryResponse {
        let messages = vec![ChatMessage::user(message)];
        match self
            .chat_model
            .generate(self.chat_session.model(), &messages, self.chat_session.params())
            .await
        {
            Ok(answer) => QueryResponse::unsourced(answer),
            Err(LlmError::Timeout { elapsed }) => QueryResponse::unsourced(timeout_answer(elapsed)),
            Err(LlmError::Api(e)) => {
                warn!(error = %e, "direct chat failed");
                QueryResponse::unsourced(failure_answer(&e))
            }
        }
    }

    async fn answer_from_documents(&mut self, question: &str) -> QueryResponse {
        let query_vec = match embed_query(self.embedder.as_ref(), question).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "query embedding failed");
                return QueryResponse::unsourced(failure_answer(&e.to_string()));
            }
        };

        let retrieved = match self.index.index() {
            Some(index) => self.retriever.retrieve(&query_vec, index),
            None => return self.chat_direct(question).await,
        };
        debug!(chunks = retrieved.len(), "retrieved context");

        let context = retrieved
            .iter()
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut messages = self.memory.as_messages();
        messages.push(ChatMessage::user(compose_prompt(&context, question)));

        match self
            .chat_model
            .generate(self.rag_session.model(), &messages, self.rag_session.params())
            .await
        {
            Ok(answer) => {
                self.memory.remember(question, &answer);
                QueryResponse {
                    answer,
                    sources: retrieved.into_iter().map(|r| r.chunk).collect(),
                }
            }
            Err(LlmError::Timeout { elapsed }) => {
                warn!(elapsed, "document query timed out");
                QueryResponse::unsourced(timeout_answer(elapsed))
            }
            Err(LlmError::Api(e)) => {
                warn!(error = %e, "document query failed");
                QueryResponse::unsourced(failure_answer(&e))
            }
        }
    }

    /// Switch both sessions to a new model, re-deriving tier parameters.
    /// Conversation memory and the index are preserved.
    pub fn switch_model(&mut self, model: &str) {
        info!(from = self.chat_session.model(), to = model, "switching model");
        self.chat_session = ModelSession::new(model, SessionRole::Chat);
        self.rag_session = ModelSession::new(model, SessionRole::Retrieval);
        self.config.models.chat = model.to_string();
    }

    /// Replace the retrieval configuration. The document-grounded session
    /// is rebuilt so the new strategy applies from the next question.
    pub fn configure_retrieval(&mut self, retrieval: RetrievalConfig) -> anyhow::Result<()> {
        retrieval.validate()?;
        info!(
            mode = %retrieval.mode,
            k = retrieval.effective_k(),
            "retrieval reconfigured"
        );
        self.retriever = Retriever::new(retrieval.clone());
        self.config.retrieval = retrieval;
        self.rag_session = ModelSession::new(&self.config.models.chat, SessionRole::Retrieval);
        Ok(())
    }

    /// Forget everything: documents, index (memory and disk), ledger, and
    /// conversation history. Disk cleanup failure is logged, not fatal.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.processed.clear();
        self.memory.clear();
        if let Err(e) = self.index.clear() {
            warn!(error = %e, "failed to remove persisted index");
        }
        info!("all documents cleared");
    }

    pub fn processed_files(&self) -> &[String] {
        &self.processed
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn has_index(&self) -> bool {
        self.index.has_index()
    }

    /// Chunks in the live index (including a persisted index loaded at
    /// startup, which the in-memory ledger does not cover).
    pub fn index_len(&self) -> usize {
        self.index.index().map(|i| i.len()).unwrap_or(0)
    }

    /// Distinct source filenames known to the index.
    pub fn indexed_sources(&self) -> Vec<String> {
        self.index.index().map(|i| i.sources()).unwrap_or_default()
    }

    pub fn model(&self) -> &str {
        self.chat_session.model()
    }

    pub fn retrieval_config(&self) -> &RetrievalConfig {
        self.retriever.config()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_renders_alternating_messages() {
        let mut memory = ConversationMemory::new();
        memory.remember("q1", "a1");
        memory.remember("q2", "a2");

        let messages = memory.as_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content, "q1");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[3].content, "a2");

        memory.clear();
        assert!(memory.is_empty());
    }

    #[test]
    fn prompt_embeds_context_and_question() {
        let prompt = compose_prompt("CHUNK A\n\nCHUNK B", "what is A?");
        assert!(prompt.contains("Context from documents:\nCHUNK A\n\nCHUNK B"));
        assert!(prompt.contains("Question: what is A?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn degraded_answers_explain_the_failure() {
        assert!(timeout_answer(300).contains("timed out after 300s"));
        assert!(failure_answer("boom").contains("boom"));
    }
}
