//! Groq chat-completions client
//!
//! OpenAI-compatible API over reqwest:
//! - Endpoint: POST {base_url}/chat/completions with bearer auth
//! - Models tried in order: primary, then fallbacks
//! - HTTP 429 retried with exponential backoff
//! - Streaming via Server-Sent Events

use crate::config::GeneratorConfig;
use crate::errors::{PipelineError, Result};
use crate::rag::lifecycle::RequestState;
use crate::rag::prompt::Prompt;
use crate::retry::RetryManager;
use crate::streaming::parser::{SseEvent, SseParser};
use crate::streaming::{Generation, GenerationOptions, GenerationStream, Generator, TextStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::sleep;

/// Default Groq API endpoint
pub const DEFAULT_GROQ_URL: &str = "https://api.groq.com/openai/v1";

/// Base delay for rate-limit backoff (1 second)
const RATE_LIMIT_BASE_DELAY_MS: u64 = 1000;

/// Groq client with model fallback
#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    base_url: String,
    api_key: String,
    models: Vec<String>,
    rate_limit: RetryManager,
}

impl GroqClient {
    /// Create client from configuration; an API key is required
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PipelineError::ConfigError("GROQ_API_KEY is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(PipelineError::HttpError)?;

        let mut models = vec![config.model.clone()];
        for model in &config.fallback_models {
            if !models.contains(model) {
                models.push(model.clone());
            }
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            models,
            rate_limit: RetryManager::with_config(config.max_retries, RATE_LIMIT_BASE_DELAY_MS),
        })
    }

    /// Override the rate-limit backoff base delay
    pub fn with_rate_limit_delay(mut self, base_delay_ms: u64) -> Self {
        self.rate_limit = RetryManager::with_config(self.rate_limit.max_retries(), base_delay_ms);
        self
    }

    /// Models in the order they are tried
    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one chat request to `model`, retrying while rate limited
    async fn send(
        &self,
        model: &str,
        prompt: &Prompt,
        options: &GenerationOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            stream,
        };

        let mut attempt = 0u32;
        loop {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(map_transport_error)?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.rate_limit.max_retries() {
                let delay = self.rate_limit.calculate_delay(attempt);
                attempt += 1;
                tracing::warn!(model, attempt, delay_ms = delay.as_millis() as u64, "rate limited");
                sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(PipelineError::GenerationUnavailable(format!(
                    "{} returned HTTP {}: {}",
                    model,
                    status,
                    error_text.trim()
                )));
            }

            return Ok(response);
        }
    }

    async fn complete(&self, model: &str, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        let response = self.send(model, prompt, options, false).await?;
        let completion: ChatResponse = response.json().await.map_err(|e| {
            PipelineError::GenerationUnavailable(format!("invalid completion from {}: {}", model, e))
        })?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    /// List model ids served by the endpoint
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(PipelineError::GenerationUnavailable(format!(
                "Failed to retrieve model list: HTTP {}",
                response.status()
            )));
        }

        let models: ModelsResponse = response.json().await.map_err(|e| {
            PipelineError::GenerationUnavailable(format!("Failed to parse models: {}", e))
        })?;

        let mut ids: Vec<String> = models.data.into_iter().map(|m| m.id).collect();
        ids.sort();
        Ok(ids)
    }

    /// Check that the endpoint accepts our key
    pub async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::debug!(error = %e, "generator health check failed");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Generator for GroqClient {
    async fn generate(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<Generation> {
        let mut last_error = None;

        for model in &self.models {
            match self.complete(model, prompt, options).await {
                Ok(text) => {
                    tracing::debug!(model = %model, chars = text.len(), "generation complete");
                    return Ok(Generation {
                        text,
                        model: model.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "model failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PipelineError::GenerationUnavailable("no models configured".to_string())
        }))
    }

    async fn generate_stream(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<GenerationStream> {
        let mut last_error = None;

        for model in &self.models {
            match self.send(model, prompt, options, true).await {
                Ok(response) => {
                    tracing::debug!(model = %model, "streaming generation started");
                    return Ok(GenerationStream {
                        fragments: sse_fragments(Box::pin(response.bytes_stream())),
                        model: model.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "model failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PipelineError::GenerationUnavailable("no models configured".to_string())
        }))
    }

    fn model(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or_default()
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct SseState {
    bytes: ByteStream,
    parser: SseParser,
    pending: VecDeque<String>,
    done: bool,
}

impl SseState {
    fn absorb(&mut self, events: Vec<SseEvent>) -> Result<()> {
        for event in events {
            match event {
                SseEvent::Data(payload) => {
                    if let Some(fragment) = SseParser::parse_delta(&payload)? {
                        if !fragment.is_empty() {
                            self.pending.push_back(fragment);
                        }
                    }
                }
                SseEvent::Done => self.done = true,
            }
        }
        Ok(())
    }
}

/// Turn a raw SSE byte stream into content fragments
fn sse_fragments(bytes: ByteStream) -> TextStream {
    let state = SseState {
        bytes,
        parser: SseParser::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.done {
                return None;
            }

            let absorbed = match state.bytes.next().await {
                Some(Ok(chunk)) => state
                    .parser
                    .add_bytes(&chunk)
                    .and_then(|events| state.absorb(events)),
                Some(Err(e)) => Err(map_transport_error(e)),
                None => {
                    state.done = true;
                    let tail: Vec<SseEvent> = state.parser.finish().into_iter().collect();
                    state.absorb(tail)
                }
            };

            if let Err(e) = absorbed {
                state.done = true;
                state.pending.clear();
                return Some((Err(e), state));
            }
        }
    }))
}

fn map_transport_error(e: reqwest::Error) -> PipelineError {
    if e.is_timeout() {
        PipelineError::Timeout {
            stage: RequestState::Generating,
            duration_ms: 0,
        }
    } else {
        PipelineError::GenerationUnavailable(e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    id: String,
}
