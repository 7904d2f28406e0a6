//! Query embedding
//!
//! The embedder must produce vectors in the same space the chunk store was
//! indexed with; a model mismatch is not detected here.

pub mod engine;

use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::{PipelineError, Result};

pub use engine::EmbeddingEngine;

/// Converts text into a fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

/// Runs the CPU-bound candle engine off the async executor
#[async_trait]
impl Embedder for Arc<EmbeddingEngine> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let engine = Arc::clone(self);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || EmbeddingEngine::embed(&engine, &text))
            .await
            .map_err(|e| PipelineError::RetrievalUnavailable(format!("Embedding task failed: {}", e)))?
            .map_err(|e| PipelineError::RetrievalUnavailable(format!("Embedding failed: {:#}", e)))
    }

    fn dimension(&self) -> usize {
        EmbeddingEngine::dimension(self)
    }
}
