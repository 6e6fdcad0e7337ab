//! # docqa
//!
//! A multi-format document question-answering engine with local
//! retrieval-augmented chat.
//!
//! docqa ingests heterogeneous files (PDF, Office documents, spreadsheets,
//! images, structured text), renders them into searchable text chunks,
//! indexes them for semantic retrieval, and answers natural-language
//! questions by combining retrieved context with a local language model
//! served by Ollama. Small talk is detected and routed straight to the
//! model, bypassing retrieval.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌────────────┐   ┌───────────┐
//! │  Files   │──▶│  Extract +   │──▶│   Vector    │──▶│ Retrieval │
//! │ any kind │   │   Chunk     │   │   Index    │   │ sim/mmr/… │
//! └──────────┘   └─────────────┘   └────────────┘   └─────┬─────┘
//!                                                         │
//!                      ┌──────────┐   ┌────────────┐      │
//!     question ───────▶│ Classify │──▶│   Engine   │◀─────┘
//!                      │ casual?  │   │ ask/switch │──▶ Ollama
//!                      └──────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa ingest ./reports        # extract, chunk, and index documents
//! docqa ask "what changed in Q3?"
//! docqa chat                    # interactive session
//! docqa status
//! docqa clear
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-format content extraction |
//! | [`chunk`] | Cascading-separator text chunking |
//! | [`embedding`] | Embedding collaborator and vector math |
//! | [`index`] | Vector index build/persist/load/clear |
//! | [`retrieval`] | Similarity, MMR, and threshold retrieval |
//! | [`llm`] | Chat and vision model collaborators |
//! | [`session`] | Model parameter tiers |
//! | [`classify`] | Casual-vs-document classifier |
//! | [`engine`] | Conversational query engine |
//! | [`ingest`] | File ingestion pipeline |

pub mod chunk;
pub mod classify;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod session;
