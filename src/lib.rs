//! PotterBuddy - Harry Potter Q&A over a retrieval-augmented pipeline
//!
//! A question is embedded, matched against indexed book passages, packed
//! into a bounded context, and answered by a Groq-hosted model.
//!
//! # Architecture
//!
//! - **Store / Embedding**: vector search over pre-indexed passages
//! - **RAG**: retrieval, context assembly, prompting, post-processing, orchestration
//! - **Streaming**: Groq chat-completions client with SSE parsing
//! - **Interface**: CLI, REPL, doctor, telemetry

pub mod errors;
pub mod config;
pub mod retry;

// Collaborators behind async traits
pub mod embedding;
pub mod store;
pub mod streaming;

// Answer pipeline
pub mod rag;

// Interface layer
pub mod telemetry;
pub mod bootstrap;
pub mod doctor;
pub mod cli;
pub mod repl;

pub use errors::{ErrorKind, PipelineError, Result};
