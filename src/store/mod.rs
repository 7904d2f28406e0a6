//! Chunk store abstraction
//!
//! The store owns passages and their embeddings; the pipeline only ever
//! reads from it through [`ChunkStore::search`].

pub mod in_memory;
pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub use in_memory::InMemoryChunkStore;
pub use qdrant::QdrantChunkStore;

/// Immutable unit of retrieved knowledge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Book/chapter reference
    #[serde(default)]
    pub source: String,
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            text: text.into(),
            category: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Case-insensitive category comparison
    pub fn has_category(&self, category: &str) -> bool {
        self.category
            .as_deref()
            .map(|c| c.trim().eq_ignore_ascii_case(category.trim()))
            .unwrap_or(false)
    }
}

/// A chunk paired with its relevance score in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl ScoredChunk {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk,
            score: normalize_score(score),
        }
    }
}

/// Clamp raw similarity into [0, 1]; NaN becomes 0
pub fn normalize_score(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Read-only nearest-neighbour search over stored chunks
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Top `k` chunks by similarity, best first
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of stored chunks
    async fn count(&self) -> Result<u64>;

    /// Human-readable backend description
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_score() {
        assert_eq!(normalize_score(1.4), 1.0);
        assert_eq!(normalize_score(-0.2), 0.0);
        assert_eq!(normalize_score(f32::NAN), 0.0);
        assert_eq!(normalize_score(0.42), 0.42);
    }

    #[test]
    fn test_has_category_ignores_case() {
        let chunk = Chunk::new("c1", "Book 1", "text").with_category("Character");
        assert!(chunk.has_category("character"));
        assert!(chunk.has_category(" CHARACTER "));
        assert!(!chunk.has_category("plot"));
        assert!(!Chunk::new("c2", "", "text").has_category("plot"));
    }

    #[test]
    fn test_chunk_deserializes_with_defaults() {
        let chunk: Chunk = serde_json::from_str(r#"{"id": "x", "text": "hello"}"#).unwrap();
        assert_eq!(chunk.id, "x");
        assert!(chunk.source.is_empty());
        assert!(chunk.category.is_none());
    }
}
