// End-to-end answer pipeline: retrieve -> assemble -> prompt -> generate -> postprocess
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::embedding::Embedder;
use crate::errors::{ErrorKind, PipelineError, Result};
use crate::rag::context::{AssembledContext, ContextAssembler, ContextConfig};
use crate::rag::lifecycle::{RequestLifecycle, RequestState, StageEvent};
use crate::rag::postprocess::{collect_stream, Answer, PostProcessConfig, ResponsePostProcessor};
use crate::rag::prompt::{Prompt, PromptBuilder};
use crate::rag::query::{analyze_query, Query};
use crate::rag::reranking::ReRankConfig;
use crate::rag::retrieval::{RetrievalEngine, RetrievalResult, SearchParams};
use crate::retry::RetryManager;
use crate::store::ChunkStore;
use crate::streaming::{GenerationOptions, Generator};
use crate::telemetry::{TelemetryCollector, TelemetryStats};

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RAGConfig {
    pub search: SearchParams,
    pub rerank: ReRankConfig,
    pub context: ContextConfig,
    pub postprocess: PostProcessConfig,
    /// Deadline for embed + search
    pub retrieval_timeout_ms: u64,
    /// Deadline for one generator call
    pub generation_timeout_ms: u64,
    /// Retries for retrieval and generation
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Use the query category's suggested k instead of `search.top_k`
    pub adaptive_k: bool,
    /// When false, questions go to the generator without retrieval
    pub enabled: bool,
}

impl Default for RAGConfig {
    fn default() -> Self {
        Self {
            search: SearchParams::default(),
            rerank: ReRankConfig::default(),
            context: ContextConfig::default(),
            postprocess: PostProcessConfig::default(),
            retrieval_timeout_ms: 15_000,
            generation_timeout_ms: 90_000,
            max_retries: 1,
            retry_base_delay_ms: 500,
            adaptive_k: false,
            enabled: true,
        }
    }
}

/// Per-request overrides
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub k: Option<usize>,
    pub retrieval_timeout: Option<Duration>,
    pub generation_timeout: Option<Duration>,
}

/// Outcome of one request, successful or not
#[derive(Debug)]
pub struct Response {
    pub lifecycle: RequestLifecycle,
    pub result: Result<Answer>,
}

impl Response {
    pub fn request_id(&self) -> uuid::Uuid {
        self.lifecycle.request_id()
    }

    pub fn state(&self) -> RequestState {
        self.lifecycle.state()
    }

    pub fn answer(&self) -> Option<&Answer> {
        self.result.as_ref().ok()
    }

    pub fn is_fallback(&self) -> bool {
        self.result.is_err()
    }

    /// Answer text, or the apologetic fallback for the failure kind
    pub fn text(&self) -> String {
        match &self.result {
            Ok(answer) => answer.text.clone(),
            Err(e) => fallback_message(e.kind()),
        }
    }

    pub fn into_result(self) -> Result<Answer> {
        self.result
    }
}

/// User-facing message shown instead of an answer
pub fn fallback_message(kind: ErrorKind) -> String {
    let message = match kind {
        ErrorKind::InvalidQuery => "Please cast a question spell by typing your query!",
        ErrorKind::RetrievalUnavailable => {
            "Sorry, the Hogwarts library is unreachable right now. Please try again in a moment."
        }
        ErrorKind::NoResults => {
            "Sorry, I couldn't find relevant information in the Harry Potter books. Try rephrasing your question or asking about specific characters, events, or magical elements."
        }
        ErrorKind::GenerationUnavailable => {
            "Sorry, the answering spell failed because the language model is unavailable. Please try again shortly."
        }
        ErrorKind::EmptyGeneration => {
            "Sorry, the magic fizzled and no answer came back. Try rephrasing your question."
        }
        ErrorKind::Timeout => "Sorry, that took too long to answer. Please try again.",
        ErrorKind::Cancelled => "The request was cancelled before an answer was ready.",
        ErrorKind::Internal => "Sorry, something went wrong inside the answering pipeline.",
    };
    format!("🚨 **Spell Malfunction** ({}): {}", kind.as_str(), message)
}

type FragmentSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// Question answering pipeline over an embedder, a chunk store, and a generator
///
/// Holds no per-request state; share it behind an `Arc` and call
/// [`handle`](Self::handle) concurrently.
pub struct RAGPipeline {
    retrieval: RetrievalEngine,
    assembler: ContextAssembler,
    prompt_builder: PromptBuilder,
    postprocessor: ResponsePostProcessor,
    generator: Arc<dyn Generator>,
    generation: GenerationOptions,
    retry: RetryManager,
    telemetry: TelemetryCollector,
    config: RAGConfig,
}

impl RAGPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn ChunkStore>,
        generator: Arc<dyn Generator>,
        config: RAGConfig,
        generation: GenerationOptions,
    ) -> Self {
        let retrieval = RetrievalEngine::with_params(
            embedder,
            store,
            config.search.clone(),
            config.rerank.clone(),
            Duration::from_millis(config.retrieval_timeout_ms),
        );

        Self {
            retrieval,
            assembler: ContextAssembler::with_config(config.context.clone()),
            prompt_builder: PromptBuilder::new(),
            postprocessor: ResponsePostProcessor::with_config(config.postprocess.clone()),
            generator,
            generation,
            retry: RetryManager::with_config(config.max_retries, config.retry_base_delay_ms),
            telemetry: TelemetryCollector::new(),
            config,
        }
    }

    /// Share a telemetry collector with the caller
    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Answer `question` or report why not
    pub async fn handle(&self, question: &str, category_hint: Option<&str>) -> Result<Answer> {
        self.handle_with_cancel(question, category_hint, &CancellationToken::new())
            .await
    }

    /// Like [`handle`](Self::handle), aborting in-flight calls when `cancel` fires
    pub async fn handle_with_cancel(
        &self,
        question: &str,
        category_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        self.run(question, category_hint, &RequestOptions::default(), cancel, None)
            .await
            .into_result()
    }

    /// Answer with the lifecycle attached; failures carry a fallback text
    pub async fn respond(&self, question: &str, category_hint: Option<&str>) -> Response {
        self.run(
            question,
            category_hint,
            &RequestOptions::default(),
            &CancellationToken::new(),
            None,
        )
        .await
    }

    /// Full-control entry point
    pub async fn respond_with(
        &self,
        question: &str,
        category_hint: Option<&str>,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Response {
        self.run(question, category_hint, options, cancel, None).await
    }

    /// Stream answer fragments to `sink` as they arrive, then post-process
    pub async fn respond_streaming<F>(
        &self,
        question: &str,
        category_hint: Option<&str>,
        options: &RequestOptions,
        cancel: &CancellationToken,
        mut sink: F,
    ) -> Response
    where
        F: FnMut(&str) + Send,
    {
        let sink: FragmentSink<'_> = &mut sink;
        self.run(question, category_hint, options, cancel, Some(sink))
            .await
    }

    async fn run(
        &self,
        question: &str,
        category_hint: Option<&str>,
        options: &RequestOptions,
        cancel: &CancellationToken,
        sink: Option<FragmentSink<'_>>,
    ) -> Response {
        let mut lifecycle = RequestLifecycle::new();
        let span = tracing::info_span!("request", request_id = %lifecycle.request_id());

        let result = self
            .execute(&mut lifecycle, question, category_hint, options, cancel, sink)
            .instrument(span)
            .await;

        let request_id = lifecycle.request_id();
        match &result {
            Ok(_) => {
                tracing::info!(%request_id, elapsed_ms = lifecycle.elapsed().as_millis() as u64, "answer delivered");
            }
            Err(e) => {
                let kind = e.kind();
                lifecycle.fail(kind);
                self.telemetry.fallback(request_id, kind);
                tracing::warn!(%request_id, kind = kind.as_str(), error = %e, "request failed");
            }
        }
        self.telemetry
            .finished(request_id, result.is_ok(), lifecycle.elapsed());

        Response { lifecycle, result }
    }

    async fn execute(
        &self,
        lifecycle: &mut RequestLifecycle,
        question: &str,
        category_hint: Option<&str>,
        options: &RequestOptions,
        cancel: &CancellationToken,
        sink: Option<FragmentSink<'_>>,
    ) -> Result<Answer> {
        let query = Query::new(question, category_hint)?;
        let analysis = analyze_query(query.text(), query.category_hint());
        let k = options.k.unwrap_or(if self.config.adaptive_k {
            analysis.suggested_k
        } else {
            self.config.search.top_k
        });
        tracing::debug!(category = analysis.category.as_str(), k, "query analyzed");

        let mut stage_started = Instant::now();

        self.advance(lifecycle, &mut stage_started, StageEvent::StartRetrieval)?;
        let retrieved = self.retrieve(lifecycle.request_id(), &query, k, options, cancel).await?;

        self.advance(lifecycle, &mut stage_started, StageEvent::PassagesRetrieved)?;
        let context = self.assembler.assemble_default(&retrieved);
        tracing::debug!(
            passages = context.passages.len(),
            approx_tokens = context.estimated_tokens(),
            "context ready"
        );

        self.advance(lifecycle, &mut stage_started, StageEvent::ContextAssembled)?;
        let prompt = self
            .prompt_builder
            .build_for_category(query.text(), &context, analysis.category);

        self.advance(lifecycle, &mut stage_started, StageEvent::PromptBuilt)?;
        let (raw, model) = match sink {
            Some(sink) => {
                self.generate_streaming(lifecycle.request_id(), &prompt, options, cancel, sink)
                    .await?
            }
            None => self.generate(lifecycle.request_id(), &prompt, options, cancel).await?,
        };

        self.advance(lifecycle, &mut stage_started, StageEvent::GenerationComplete)?;
        let answer = self
            .postprocessor
            .postprocess(&raw, &source_labels(&context), Some(analysis.category))?
            .with_request_id(lifecycle.request_id())
            .with_model(model)
            .with_passages_used(context.passages.len())
            .with_chunk_ids(context.chunk_ids.clone());

        self.advance(lifecycle, &mut stage_started, StageEvent::AnswerReady)?;
        Ok(answer)
    }

    /// Record the finished stage and move to the next one
    fn advance(
        &self,
        lifecycle: &mut RequestLifecycle,
        stage_started: &mut Instant,
        event: StageEvent,
    ) -> Result<()> {
        if lifecycle.state() != RequestState::Received {
            self.telemetry
                .stage_completed(lifecycle.request_id(), lifecycle.state(), stage_started.elapsed());
        }
        lifecycle.apply(event)?;
        *stage_started = Instant::now();
        Ok(())
    }

    /// Retrieval with retry; `NoResults` degrades to an empty result
    async fn retrieve(
        &self,
        request_id: uuid::Uuid,
        query: &Query,
        k: usize,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult> {
        if !self.config.enabled {
            return Ok(RetrievalResult::empty());
        }

        let timeout = options
            .retrieval_timeout
            .unwrap_or_else(|| Duration::from_millis(self.config.retrieval_timeout_ms));
        let retrieval = &self.retrieval;
        let params = &self.config.search;
        let text = query.text();
        let hint = query.category_hint();

        let attempt = self.retry.execute_with_notify(
            move || retrieval.retrieve_with_params(text, k, hint, params, timeout),
            |attempt, _| self.telemetry.retry(request_id, RequestState::Retrieving, attempt),
        );

        match cancellable(cancel, RequestState::Retrieving, attempt).await {
            Ok(result) => Ok(result),
            Err(PipelineError::NoResults) => {
                tracing::info!("no relevant passages, answering without context");
                self.telemetry.no_context(request_id);
                Ok(RetrievalResult::empty())
            }
            Err(e) => Err(e),
        }
    }

    async fn generate(
        &self,
        request_id: uuid::Uuid,
        prompt: &Prompt,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<(String, String)> {
        let timeout = self.generation_timeout(options);
        let generator = &self.generator;
        let generation = &self.generation;

        let attempt = self.retry.execute_with_notify(
            move || async move {
                tokio::time::timeout(timeout, generator.generate(prompt, generation))
                    .await
                    .map_err(|_| generation_timeout_error(timeout))?
            },
            |attempt, _| self.telemetry.retry(request_id, RequestState::Generating, attempt),
        );

        let generation = cancellable(cancel, RequestState::Generating, attempt).await?;
        Ok((generation.text, generation.model))
    }

    /// Only opening the stream is retried; fragments already forwarded cannot be taken back
    ///
    /// One deadline covers opening the stream and draining it.
    async fn generate_streaming(
        &self,
        request_id: uuid::Uuid,
        prompt: &Prompt,
        options: &RequestOptions,
        cancel: &CancellationToken,
        sink: FragmentSink<'_>,
    ) -> Result<(String, String)> {
        let timeout = self.generation_timeout(options);
        let deadline = tokio::time::Instant::now() + timeout;
        let generator = &self.generator;
        let generation = &self.generation;

        let open = self.retry.execute_with_notify(
            move || async move {
                tokio::time::timeout_at(deadline, generator.generate_stream(prompt, generation))
                    .await
                    .map_err(|_| generation_timeout_error(timeout))?
            },
            |attempt, _| self.telemetry.retry(request_id, RequestState::Generating, attempt),
        );
        let stream = cancellable(cancel, RequestState::Generating, open).await?;
        let model = stream.model;

        let raw = tokio::time::timeout_at(deadline, collect_stream(stream.fragments, |f| sink(f), cancel))
            .await
            .map_err(|_| generation_timeout_error(timeout))??;

        Ok((raw, model))
    }

    fn generation_timeout(&self, options: &RequestOptions) -> Duration {
        options
            .generation_timeout
            .unwrap_or_else(|| Duration::from_millis(self.config.generation_timeout_ms))
    }

    /// Passages currently stored
    pub async fn store_count(&self) -> Result<u64> {
        self.retrieval.store().count().await
    }

    pub fn describe_store(&self) -> String {
        self.retrieval.store().describe()
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    pub fn stats(&self) -> TelemetryStats {
        self.telemetry.get_stats()
    }

    pub fn telemetry(&self) -> &TelemetryCollector {
        &self.telemetry
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RAGConfig {
        &self.config
    }
}

async fn cancellable<T, F>(cancel: &CancellationToken, stage: RequestState, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled { stage }),
        result = future => result,
    }
}

fn generation_timeout_error(timeout: Duration) -> PipelineError {
    PipelineError::Timeout {
        stage: RequestState::Generating,
        duration_ms: timeout.as_millis() as u64,
    }
}

/// Footer entries, one per chunk used: `source (chunk id)`, or the bare id
fn source_labels(context: &AssembledContext) -> Vec<String> {
    context
        .passages
        .iter()
        .map(|p| match p.source.trim() {
            "" => p.chunk_id.clone(),
            source => format!("{} ({})", source, p.chunk_id),
        })
        .collect()
}
