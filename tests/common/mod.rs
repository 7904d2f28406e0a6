//! In-process fakes for the embedder, chunk store, and generator

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use potterbuddy::embedding::Embedder;
use potterbuddy::rag::{Prompt, RAGConfig, RAGPipeline};
use potterbuddy::store::{Chunk, ChunkStore, ScoredChunk};
use futures_util::StreamExt;
use potterbuddy::streaming::{Generation, GenerationOptions, GenerationStream, Generator, TextStream};
use potterbuddy::{PipelineError, Result};

pub fn scored(id: &str, source: &str, text: &str, score: f32) -> ScoredChunk {
    ScoredChunk::new(Chunk::new(id, source, text), score)
}

/// Returns the same vector for every text
pub struct FakeEmbedder {
    pub calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0.5, 0.5, 0.5])
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// Store that answers every search with a fixed candidate list
pub struct ScriptedStore {
    candidates: Vec<ScoredChunk>,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
    pub searches: AtomicUsize,
}

impl ScriptedStore {
    pub fn new(candidates: Vec<ScoredChunk>) -> Self {
        Self {
            candidates,
            failures_left: AtomicUsize::new(0),
            delay: None,
            searches: AtomicUsize::new(0),
        }
    }

    /// Every search sleeps for `delay` first
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// First `n` searches fail as unreachable
    pub fn failing_first(mut self, n: usize) -> Self {
        self.failures_left = AtomicUsize::new(n);
        self
    }
}

#[async_trait]
impl ChunkStore for ScriptedStore {
    async fn search(&self, _vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(PipelineError::RetrievalUnavailable("connection refused".to_string()));
        }
        Ok(self.candidates.iter().take(k).cloned().collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.candidates.len() as u64)
    }

    fn describe(&self) -> String {
        "scripted store".to_string()
    }
}

/// One scripted generator reply
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    /// Sleep before answering
    Slow(Duration, String),
    Fragments(Vec<String>),
    /// Sleep before opening the stream, then again before its first fragment
    SlowStream(Duration, Duration, Vec<String>),
}

/// Generator that plays back replies in order and records every prompt
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Reply>>,
    pub prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(text: &str) -> Self {
        Self::new(vec![Reply::Text(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().unwrap().last().cloned()
    }

    fn next(&self, prompt: &Prompt) -> Reply {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Fail("no scripted reply left".to_string()))
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &Prompt, _options: &GenerationOptions) -> Result<Generation> {
        let text = match self.next(prompt) {
            Reply::Text(text) => text,
            Reply::Fail(reason) => return Err(PipelineError::GenerationUnavailable(reason)),
            Reply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                text
            }
            Reply::Fragments(parts) | Reply::SlowStream(_, _, parts) => parts.concat(),
        };
        Ok(Generation {
            text,
            model: "scripted".to_string(),
        })
    }

    async fn generate_stream(&self, prompt: &Prompt, _options: &GenerationOptions) -> Result<GenerationStream> {
        let (first_fragment_delay, parts) = match self.next(prompt) {
            Reply::Fragments(parts) => (None, parts),
            Reply::Text(text) => (None, vec![text]),
            Reply::Fail(reason) => return Err(PipelineError::GenerationUnavailable(reason)),
            Reply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                (None, vec![text])
            }
            Reply::SlowStream(open_delay, first_fragment_delay, parts) => {
                tokio::time::sleep(open_delay).await;
                (Some(first_fragment_delay), parts)
            }
        };

        let fragments: TextStream = match first_fragment_delay {
            Some(delay) => Box::pin(
                futures_util::stream::once(tokio::time::sleep(delay))
                    .flat_map(move |_| futures_util::stream::iter(parts.clone().into_iter().map(Ok))),
            ),
            None => Box::pin(futures_util::stream::iter(parts.into_iter().map(Ok))),
        };

        Ok(GenerationStream {
            fragments,
            model: "scripted-stream".to_string(),
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Config with fast retries so failure tests stay quick
pub fn test_config() -> RAGConfig {
    RAGConfig {
        retry_base_delay_ms: 1,
        ..RAGConfig::default()
    }
}

pub fn pipeline(
    store: Arc<ScriptedStore>,
    generator: Arc<ScriptedGenerator>,
    config: RAGConfig,
) -> RAGPipeline {
    RAGPipeline::new(
        Arc::new(FakeEmbedder::new()),
        store,
        generator,
        config,
        GenerationOptions::default(),
    )
}
