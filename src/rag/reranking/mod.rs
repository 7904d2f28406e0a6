// Re-ranking module
pub mod scorer;

pub use scorer::{deduplicate, sort_by_score, text_overlap, RankingStrategy, ReRankConfig, ReRanker};
