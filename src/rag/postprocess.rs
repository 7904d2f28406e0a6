// Response post-processing: cleanup, source footer, streaming collection
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::{PipelineError, Result};
use crate::rag::lifecycle::RequestState;
use crate::rag::query::QueryCategory;
use crate::streaming::TextStream;

/// Post-processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Append the `**Sources:**` footer
    pub include_sources: bool,
    /// Append the query category label
    pub include_category: bool,
    /// Longest run of consecutive blank lines kept in the body
    pub max_blank_lines: usize,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            include_sources: true,
            include_category: true,
            max_blank_lines: 1,
        }
    }
}

/// Final answer delivered to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub request_id: Uuid,
    /// Body plus footer
    pub text: String,
    /// Cleaned generator output without footer
    pub body: String,
    /// Distinct sources in first-seen order
    pub sources: Vec<String>,
    /// Ids of the chunks the context was built from
    pub chunk_ids: Vec<String>,
    pub category: Option<QueryCategory>,
    pub model: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub passages_used: usize,
}

impl Answer {
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_passages_used(mut self, passages_used: usize) -> Self {
        self.passages_used = passages_used;
        self
    }

    pub fn with_chunk_ids(mut self, chunk_ids: Vec<String>) -> Self {
        self.chunk_ids = chunk_ids;
        self
    }
}

/// Turns raw generator output into an [`Answer`]
pub struct ResponsePostProcessor {
    config: PostProcessConfig,
}

impl ResponsePostProcessor {
    pub fn new() -> Self {
        Self {
            config: PostProcessConfig::default(),
        }
    }

    pub fn with_config(config: PostProcessConfig) -> Self {
        Self { config }
    }

    /// Clean `raw` and attach the source footer
    ///
    /// Fails with `EmptyGeneration` when `raw` holds no visible text.
    pub fn postprocess(
        &self,
        raw: &str,
        sources: &[String],
        category: Option<QueryCategory>,
    ) -> Result<Answer> {
        if raw.trim().is_empty() {
            return Err(PipelineError::EmptyGeneration);
        }

        let body = self.clean(raw);
        let sources = distinct_sources(sources);

        let mut footer = Vec::new();
        if self.config.include_sources && !sources.is_empty() {
            footer.push(format!("**Sources:** {}", sources.join(", ")));
        }
        if self.config.include_category {
            if let Some(category) = category {
                footer.push(format!("*Query type: {}*", category.label()));
            }
        }

        let text = if footer.is_empty() {
            body.clone()
        } else {
            format!("{}\n\n---\n{}", body, footer.join("\n"))
        };

        Ok(Answer {
            request_id: Uuid::nil(),
            text,
            body,
            sources,
            chunk_ids: Vec::new(),
            category,
            model: None,
            generated_at: Utc::now(),
            passages_used: 0,
        })
    }

    fn clean(&self, raw: &str) -> String {
        let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
        let mut lines: Vec<&str> = Vec::new();
        let mut blank_run = 0usize;

        for line in normalized.trim().lines() {
            let line = line.trim_end();
            if line.is_empty() {
                blank_run += 1;
                if blank_run > self.config.max_blank_lines {
                    continue;
                }
            } else {
                blank_run = 0;
            }
            lines.push(line);
        }

        lines.join("\n")
    }

    pub fn config(&self) -> &PostProcessConfig {
        &self.config
    }
}

impl Default for ResponsePostProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn distinct_sources(sources: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(sources.len());
    for source in sources {
        let source = source.trim();
        if !source.is_empty() && !seen.iter().any(|s: &String| s == source) {
            seen.push(source.to_string());
        }
    }
    seen
}

/// Drain a fragment stream, forwarding each fragment to `sink`
///
/// Returns the concatenated text. Cancelling `cancel` drops the stream,
/// which aborts the underlying request.
pub async fn collect_stream<F>(
    mut stream: TextStream,
    mut sink: F,
    cancel: &CancellationToken,
) -> Result<String>
where
    F: FnMut(&str) + Send,
{
    let mut collected = String::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(PipelineError::Cancelled { stage: RequestState::Generating });
            }
            next = stream.next() => match next {
                Some(Ok(fragment)) => {
                    if !fragment.is_empty() {
                        sink(&fragment);
                        collected.push_str(&fragment);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn sources(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_whitespace_output_is_empty_generation() {
        let processor = ResponsePostProcessor::new();
        let err = processor.postprocess("  \n\t ", &[], None).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyGeneration));
    }

    #[test]
    fn test_cleanup_normalises_text() {
        let processor = ResponsePostProcessor::new();
        let answer = processor
            .postprocess("\r\n  Line one  \r\n\r\n\r\n\r\nLine two\n", &[], None)
            .unwrap();
        assert_eq!(answer.body, "Line one\n\nLine two");
        assert_eq!(answer.text, answer.body);
    }

    #[test]
    fn test_footer_lists_distinct_sources_in_order() {
        let processor = ResponsePostProcessor::new();
        let answer = processor
            .postprocess(
                "Snape was a double agent.",
                &sources(&["Book 7", "Book 6", "Book 7", " "]),
                Some(QueryCategory::CharacterAnalysis),
            )
            .unwrap();

        assert_eq!(answer.sources, vec!["Book 7", "Book 6"]);
        assert_eq!(
            answer.text,
            "Snape was a double agent.\n\n---\n**Sources:** Book 7, Book 6\n*Query type: Character Analysis*"
        );
    }

    #[test]
    fn test_postprocess_is_deterministic_apart_from_timestamp() {
        let processor = ResponsePostProcessor::new();
        let a = processor.postprocess("Answer", &sources(&["Book 1"]), None).unwrap();
        let b = processor.postprocess("Answer", &sources(&["Book 1"]), None).unwrap();
        assert_eq!(a.text, b.text);
        assert_eq!(a.sources, b.sources);
    }

    #[tokio::test]
    async fn test_collect_stream_forwards_fragments() {
        let fragments: TextStream = Box::pin(stream::iter(vec![
            Ok("Hello".to_string()),
            Ok(String::new()),
            Ok(", wizard".to_string()),
        ]));
        let mut seen = Vec::new();
        let text = collect_stream(fragments, |f| seen.push(f.to_string()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "Hello, wizard");
        assert_eq!(seen, vec!["Hello", ", wizard"]);
    }

    #[tokio::test]
    async fn test_collect_stream_propagates_errors() {
        let fragments: TextStream = Box::pin(stream::iter(vec![
            Ok("partial".to_string()),
            Err(PipelineError::GenerationUnavailable("connection reset".to_string())),
        ]));
        let err = collect_stream(fragments, |_| {}, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_collect_stream_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fragments: TextStream = Box::pin(stream::pending());
        let err = collect_stream(fragments, |_| {}, &cancel).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
    }
}
