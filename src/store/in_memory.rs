// In-memory chunk store with brute-force cosine search
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{PipelineError, Result};
use crate::store::{Chunk, ChunkStore, ScoredChunk};

/// Chunk plus its precomputed embedding, as exported by the indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Chunk store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryChunkStore {
    entries: Vec<StoredChunk>,
    origin: Option<PathBuf>,
}

impl InMemoryChunkStore {
    pub fn new(entries: Vec<StoredChunk>) -> Self {
        Self {
            entries,
            origin: None,
        }
    }

    /// Load a JSON array of `{id, source, text, category?, embedding}` records
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chunk file {}", path.display()))?;
        let entries: Vec<StoredChunk> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse chunk file {}", path.display()))?;

        if let Some(first) = entries.first() {
            let dim = first.embedding.len();
            if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dim) {
                anyhow::bail!(
                    "Chunk {} has embedding dimension {} (expected {})",
                    bad.chunk.id,
                    bad.embedding.len(),
                    dim
                );
            }
        }

        tracing::info!(path = %path.display(), chunks = entries.len(), "loaded in-memory chunk store");
        Ok(Self {
            entries,
            origin: Some(path.to_path_buf()),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cosine similarity; zero vectors and length mismatches score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if let Some(first) = self.entries.first() {
            if first.embedding.len() != vector.len() {
                return Err(PipelineError::RetrievalUnavailable(format!(
                    "Query vector has dimension {} but store holds {}-dimensional embeddings",
                    vector.len(),
                    first.embedding.len()
                )));
            }
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| {
                ScoredChunk::new(entry.chunk.clone(), cosine_similarity(vector, &entry.embedding))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.entries.len() as u64)
    }

    fn describe(&self) -> String {
        match &self.origin {
            Some(path) => format!("in-memory ({})", path.display()),
            None => "in-memory".to_string(),
        }
    }
}
