// Retrieval-augmented answer pipeline
//
// Components, leaves first:
// - Retrieval: embed the query, search the chunk store, filter, boost, dedupe
// - Context: pack ranked passages into a character budget
// - Prompt: instruction and data sections with escaped delimiters
// - Post-processing: cleanup, sources footer, streaming collection
// - Pipeline: per-request orchestration with timeouts, retries, cancellation

pub mod context;
pub mod lifecycle;
pub mod pipeline;
pub mod postprocess;
pub mod prompt;
pub mod query;
pub mod reranking;
pub mod retrieval;

pub use context::{AssembledContext, ContextAssembler, ContextConfig};
pub use lifecycle::{RequestLifecycle, RequestState, StageEvent};
pub use pipeline::{fallback_message, RAGConfig, RAGPipeline, RequestOptions, Response};
pub use postprocess::{Answer, PostProcessConfig, ResponsePostProcessor};
pub use prompt::{Prompt, PromptBuilder, NO_CONTEXT_MARKER};
pub use query::{analyze_query, Query, QueryAnalysis, QueryCategory};
pub use reranking::ReRanker;
pub use retrieval::{CategoryPolicy, RetrievalEngine, RetrievalResult, SearchParams};
