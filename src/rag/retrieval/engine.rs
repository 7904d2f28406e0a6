// Retrieval engine: embed, search, filter, boost, dedupe, truncate
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::Embedder;
use crate::errors::{PipelineError, Result};
use crate::rag::lifecycle::RequestState;
use crate::rag::reranking::{deduplicate, ReRankConfig, ReRanker};
use crate::store::{ChunkStore, ScoredChunk};

/// What to do with candidates matching the category hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryPolicy {
    /// Raise matching candidates by `category_boost`
    Boost,
    /// Keep only matching candidates
    Filter,
}

/// Search parameters for retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Number of passages returned
    pub top_k: usize,
    /// Minimum similarity (0.0 to 1.0)
    pub threshold: f32,
    /// Candidates fetched per returned passage
    pub candidate_multiplier: usize,
    pub category_policy: CategoryPolicy,
    pub category_boost: f32,
    /// Word-overlap ratio at which two passages count as duplicates
    pub dedup_similarity: f32,
    /// Passages with fewer characters are ignored
    pub min_passage_chars: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: 0.3,
            candidate_multiplier: 2,
            category_policy: CategoryPolicy::Boost,
            category_boost: 0.1,
            dedup_similarity: 0.85,
            min_passage_chars: 51,
        }
    }
}

/// Ordered, duplicate-free retrieval output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    entries: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap entries that are already best-first and id-unique
    pub(crate) fn from_sorted(entries: Vec<ScoredChunk>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].score >= w[1].score));
        Self { entries }
    }

    pub fn entries(&self) -> &[ScoredChunk] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ScoredChunk> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.chunk.id.clone()).collect()
    }

    fn truncate(&mut self, k: usize) {
        self.entries.truncate(k);
    }
}

/// Retrieval engine over an embedder and a chunk store
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn ChunkStore>,
    reranker: ReRanker,
    default_params: SearchParams,
    timeout: Duration,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn ChunkStore>) -> Self {
        Self::with_params(
            embedder,
            store,
            SearchParams::default(),
            ReRankConfig::default(),
            Duration::from_secs(15),
        )
    }

    pub fn with_params(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        params: SearchParams,
        rerank: ReRankConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker: ReRanker::with_config(rerank),
            default_params: params,
            timeout,
        }
    }

    /// Retrieve up to `k` passages with the default parameters
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        category_hint: Option<&str>,
    ) -> Result<RetrievalResult> {
        self.retrieve_with_params(query, k, category_hint, &self.default_params, self.timeout)
            .await
    }

    /// Retrieve with explicit parameters and deadline
    pub async fn retrieve_with_params(
        &self,
        query: &str,
        k: usize,
        category_hint: Option<&str>,
        params: &SearchParams,
        timeout: Duration,
    ) -> Result<RetrievalResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::InvalidQuery("query is empty".to_string()));
        }
        if k == 0 {
            return Err(PipelineError::InvalidQuery("k must be positive".to_string()));
        }

        let candidate_count = k.saturating_mul(params.candidate_multiplier.max(1));
        let candidates = tokio::time::timeout(timeout, self.fetch_candidates(query, candidate_count))
            .await
            .map_err(|_| PipelineError::Timeout {
                stage: RequestState::Retrieving,
                duration_ms: timeout.as_millis() as u64,
            })??;
        let fetched = candidates.len();

        let mut candidates: Vec<ScoredChunk> = candidates
            .into_iter()
            .filter(|c| c.score >= params.threshold)
            .filter(|c| c.chunk.text.trim().chars().count() >= params.min_passage_chars)
            .collect();

        if let Some(category) = category_hint.map(str::trim).filter(|c| !c.is_empty()) {
            candidates = self.reranker.apply_category(
                candidates,
                category,
                params.category_policy,
                params.category_boost,
            );
        }

        let ranked = self.reranker.rerank(candidates, query);
        let mut result = deduplicate(ranked, params.dedup_similarity);
        result.truncate(k);

        tracing::debug!(
            fetched,
            kept = result.len(),
            threshold = params.threshold,
            "retrieval complete"
        );

        if result.is_empty() {
            return Err(PipelineError::NoResults);
        }

        Ok(result)
    }

    async fn fetch_candidates(&self, query: &str, count: usize) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed(query).await.map_err(as_unavailable)?;
        self.store.search(&vector, count).await.map_err(as_unavailable)
    }

    pub fn default_params(&self) -> &SearchParams {
        &self.default_params
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }
}

/// Collaborator failures surface as `RetrievalUnavailable`
fn as_unavailable(err: PipelineError) -> PipelineError {
    match err {
        PipelineError::RetrievalUnavailable(_)
        | PipelineError::Timeout { .. }
        | PipelineError::Cancelled { .. } => err,
        other => PipelineError::RetrievalUnavailable(other.to_string()),
    }
}
