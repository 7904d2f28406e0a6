//! Text generation module
//!
//! Defines the [`Generator`] seam plus the Groq chat-completions client and
//! its incremental Server-Sent Events parser.

pub mod client;
pub mod parser;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::errors::Result;
use crate::rag::prompt::Prompt;

pub use client::{GroqClient, DEFAULT_GROQ_URL};
pub use parser::{SseEvent, SseParser, MAX_BUFFER_SIZE};

/// Lazy, finite stream of answer fragments
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Sampling options for a generation call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1500,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// Text produced by a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    /// Model that produced the text
    pub model: String,
}

/// Fragments of an answer still being generated
pub struct GenerationStream {
    pub fragments: TextStream,
    /// Model serving the stream
    pub model: String,
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream").field("model", &self.model).finish_non_exhaustive()
    }
}

/// Large language model behind the pipeline
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<Generation>;

    /// Stream the answer; the default emits the complete answer as one fragment
    async fn generate_stream(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<GenerationStream> {
        let Generation { text, model } = self.generate(prompt, options).await?;
        Ok(GenerationStream {
            fragments: Box::pin(futures_util::stream::once(async move { Ok(text) })),
            model,
        })
    }

    /// Primary model name
    fn model(&self) -> &str;
}
