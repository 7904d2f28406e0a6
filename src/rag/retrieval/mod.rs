// Retrieval Engine Module
pub mod engine;

pub use engine::{CategoryPolicy, RetrievalEngine, RetrievalResult, SearchParams};
