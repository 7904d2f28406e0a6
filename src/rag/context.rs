// Context assembly: greedy packing of ranked passages into a character budget
use serde::{Deserialize, Serialize};

use crate::rag::retrieval::RetrievalResult;
use crate::store::ScoredChunk;

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum characters of assembled context
    pub budget_chars: usize,
    /// Placed between passages
    pub separator: String,
    /// Show relevance scores in citation markers
    pub include_scores: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_chars: 6000,
            separator: "\n\n---\n\n".to_string(),
            include_scores: false,
        }
    }
}

/// One passage as placed in the context block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPassage {
    /// 1-based citation number
    pub index: usize,
    pub chunk_id: String,
    pub source: String,
    pub score: f32,
    pub truncated: bool,
}

/// Assembled context for prompt construction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// The formatted context text
    pub text: String,
    pub passages: Vec<ContextPassage>,
    /// Ids of the chunks the text was built from, in order
    pub chunk_ids: Vec<String>,
    /// The leading passage was cut to fit the budget
    pub truncated: bool,
    pub budget: usize,
}

impl AssembledContext {
    pub fn empty(budget: usize) -> Self {
        Self {
            budget,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Rough token estimate (~4 chars per token)
    pub fn estimated_tokens(&self) -> usize {
        self.char_len() / 4
    }
}

/// Packs retrieval results into a bounded context block
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Assemble with the configured budget
    pub fn assemble_default(&self, results: &RetrievalResult) -> AssembledContext {
        self.assemble(results, self.config.budget_chars)
    }

    /// Greedily append passages, best first, while the text stays within `budget` chars
    ///
    /// Stops at the first passage that does not fit. When even the first
    /// passage does not fit, its text is cut so marker and text fill `budget`;
    /// budgets too small for the marker get the bare text.
    pub fn assemble(&self, results: &RetrievalResult, budget: usize) -> AssembledContext {
        let mut context = AssembledContext::empty(budget);
        if budget == 0 {
            return context;
        }

        let separator_len = self.config.separator.chars().count();
        let mut used = 0usize;

        for (position, entry) in results.entries().iter().enumerate() {
            let index = position + 1;
            let block = self.format_passage(index, entry);
            let block_len = block.chars().count();
            let joiner_len = if context.text.is_empty() { 0 } else { separator_len };

            if used + joiner_len + block_len > budget {
                if position == 0 {
                    let (text, dropped) = self.cut_to_budget(index, entry, budget);
                    context.text = text;
                    context.truncated = dropped;
                    context.passages.push(Self::passage(index, entry, dropped));
                    context.chunk_ids.push(entry.chunk.id.clone());
                }
                break;
            }

            if joiner_len > 0 {
                context.text.push_str(&self.config.separator);
            }
            context.text.push_str(&block);
            used += joiner_len + block_len;

            context.passages.push(Self::passage(index, entry, false));
            context.chunk_ids.push(entry.chunk.id.clone());
        }

        tracing::debug!(
            passages = context.passages.len(),
            chars = used.max(context.char_len()),
            budget,
            truncated = context.truncated,
            "context assembled"
        );

        context
    }

    fn passage(index: usize, entry: &ScoredChunk, truncated: bool) -> ContextPassage {
        ContextPassage {
            index,
            chunk_id: entry.chunk.id.clone(),
            source: entry.chunk.source.clone(),
            score: entry.score,
            truncated,
        }
    }

    /// Citation marker line followed by the passage text
    fn format_passage(&self, index: usize, entry: &ScoredChunk) -> String {
        format!("{}\n{}", self.marker(index, entry), entry.chunk.text.trim())
    }

    fn marker(&self, index: usize, entry: &ScoredChunk) -> String {
        let source = entry.chunk.source.trim();
        match (source.is_empty(), self.config.include_scores) {
            (true, false) => format!("[{}]", index),
            (true, true) => format!("[{}] (score: {:.2})", index, entry.score),
            (false, false) => format!("[{}] ({})", index, source),
            (false, true) => format!("[{}] ({}, score: {:.2})", index, source, entry.score),
        }
    }

    /// Passage block cut to `budget` chars, and whether passage text was dropped
    fn cut_to_budget(&self, index: usize, entry: &ScoredChunk, budget: usize) -> (String, bool) {
        let text = entry.chunk.text.trim();
        let text_len = text.chars().count();
        let marker = self.marker(index, entry);
        let header_len = marker.chars().count() + 1;

        if header_len < budget {
            let kept = budget - header_len;
            let body: String = text.chars().take(kept).collect();
            (format!("{}\n{}", marker, body), kept < text_len)
        } else {
            (text.chars().take(budget).collect(), budget < text_len)
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}
