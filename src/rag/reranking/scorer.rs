// Re-ranking: category policy, keyword boost, ordering and near-duplicate removal
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::rag::retrieval::{CategoryPolicy, RetrievalResult};
use crate::store::ScoredChunk;

/// Re-ranking strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingStrategy {
    /// Use similarity scores only
    Similarity,
    /// Similarity plus a capped keyword-overlap boost
    Hybrid,
}

/// Re-ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReRankConfig {
    pub strategy: RankingStrategy,
    /// Maximum boost for query keywords found in the passage
    pub keyword_boost: f32,
}

impl Default for ReRankConfig {
    fn default() -> Self {
        Self {
            strategy: RankingStrategy::Similarity,
            keyword_boost: 0.1,
        }
    }
}

/// Re-ranker for candidate passages
pub struct ReRanker {
    config: ReRankConfig,
}

impl ReRanker {
    /// Create new re-ranker with default config
    pub fn new() -> Self {
        Self {
            config: ReRankConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(config: ReRankConfig) -> Self {
        Self { config }
    }

    /// Apply the category hint policy
    ///
    /// Boost adds `boost` to matching candidates (capped at 1.0); Filter keeps
    /// only matching candidates.
    pub fn apply_category(
        &self,
        candidates: Vec<ScoredChunk>,
        category: &str,
        policy: CategoryPolicy,
        boost: f32,
    ) -> Vec<ScoredChunk> {
        match policy {
            CategoryPolicy::Filter => candidates
                .into_iter()
                .filter(|c| c.chunk.has_category(category))
                .collect(),
            CategoryPolicy::Boost => candidates
                .into_iter()
                .map(|mut c| {
                    if c.chunk.has_category(category) {
                        c.score = (c.score + boost).min(1.0);
                    }
                    c
                })
                .collect(),
        }
    }

    /// Rescore by strategy, then sort best first (ties broken by chunk id)
    pub fn rerank(&self, mut candidates: Vec<ScoredChunk>, query: &str) -> Vec<ScoredChunk> {
        if self.config.strategy == RankingStrategy::Hybrid {
            for candidate in &mut candidates {
                let boost = self.compute_keyword_boost(&candidate.chunk.text, query);
                candidate.score = (candidate.score + boost).min(1.0);
            }
        }

        sort_by_score(&mut candidates);
        candidates
    }

    /// Compute keyword boost for exact matches
    fn compute_keyword_boost(&self, text: &str, query: &str) -> f32 {
        let query_lower = query.to_lowercase();
        let content_lower = text.to_lowercase();

        let query_words: Vec<&str> = query_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if query_words.is_empty() {
            return 0.0;
        }

        let matches = query_words
            .iter()
            .filter(|word| word.len() > 3 && content_lower.contains(*word))
            .count();

        if matches > 0 {
            let boost_per_match = self.config.keyword_boost / query_words.len() as f32;
            (matches as f32 * boost_per_match).min(self.config.keyword_boost)
        } else {
            0.0
        }
    }

    pub fn config(&self) -> &ReRankConfig {
        &self.config
    }
}

impl Default for ReRanker {
    fn default() -> Self {
        Self::new()
    }
}

/// Descending score, ascending id on ties
pub fn sort_by_score(candidates: &mut [ScoredChunk]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
}

/// Lowercased alphanumeric word set used for overlap checks
fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Jaccard similarity of the two passages' word sets
pub fn text_overlap(a: &str, b: &str) -> f32 {
    let set_a = word_set(a);
    let set_b = word_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f32 / union as f32
}

/// Drop repeated ids and near-duplicate passages
///
/// Input must already be sorted best first, so the survivor of any
/// duplicate pair is the higher-scored one.
pub fn deduplicate(candidates: Vec<ScoredChunk>, similarity_cutoff: f32) -> RetrievalResult {
    let mut seen_ids = HashSet::new();
    let mut kept: Vec<(ScoredChunk, HashSet<String>)> = Vec::new();

    for candidate in candidates {
        if !seen_ids.insert(candidate.chunk.id.clone()) {
            continue;
        }

        let words = word_set(&candidate.chunk.text);
        let is_near_duplicate = kept.iter().any(|(_, existing)| {
            let union = existing.union(&words).count();
            if union == 0 {
                return true;
            }
            let overlap = existing.intersection(&words).count() as f32 / union as f32;
            overlap >= similarity_cutoff
        });

        if !is_near_duplicate {
            kept.push((candidate, words));
        }
    }

    RetrievalResult::from_sorted(kept.into_iter().map(|(c, _)| c).collect())
}
