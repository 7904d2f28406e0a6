//! Incremental Server-Sent Events parser for streaming chat completions
//!
//! Accumulates raw bytes and yields complete `data:` payloads:
//! - Buffer: 1MB maximum
//! - Events end at a line break; CRLF and LF are both accepted
//! - `data: [DONE]` marks the end of the stream

use crate::errors::{PipelineError, Result};
use serde::Deserialize;

/// Maximum buffer size (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// Terminator payload sent by OpenAI-compatible servers
pub const DONE_MARKER: &str = "[DONE]";

/// One parsed SSE line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// JSON payload of a `data:` line
    Data(String),
    /// `data: [DONE]`
    Done,
}

/// Incremental SSE parser
#[derive(Debug)]
pub struct SseParser {
    /// Bytes not yet terminated by a newline
    buffer: Vec<u8>,

    max_buffer_size: usize,

    /// Set once the terminator was seen
    finished: bool,
}

impl SseParser {
    /// Create new parser with default settings
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    /// Create parser with custom buffer capacity
    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
            finished: false,
        }
    }

    /// Add bytes and return every event completed by them
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
        if self.buffer.len() + bytes.len() > self.max_buffer_size {
            return Err(PipelineError::GenerationUnavailable(format!(
                "SSE buffer overflow: {} bytes exceeds maximum {}",
                self.buffer.len() + bytes.len(),
                self.max_buffer_size
            )));
        }

        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = self.parse_line(&line) {
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Parse whatever is left once the byte stream has ended
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.parse_line(&line)
    }

    fn parse_line(&mut self, line: &[u8]) -> Option<SseEvent> {
        if self.finished {
            return None;
        }

        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);

        // Comments and other fields (event:, id:, retry:) carry no content
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload.is_empty() {
            return None;
        }

        if payload == DONE_MARKER {
            self.finished = true;
            return Some(SseEvent::Done);
        }

        Some(SseEvent::Data(payload.to_string()))
    }

    /// Extract the content delta from a chat completion chunk
    pub fn parse_delta(payload: &str) -> Result<Option<String>> {
        let chunk: ChatCompletionChunk = serde_json::from_str(payload)?;
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content))
    }

    /// True once `data: [DONE]` was seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.finished = false;
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_events() {
        let mut parser = SseParser::new();
        let events = parser
            .add_bytes(b"data: {\"a\":1}\n\ndata: {\"b\":2}\n\n")
            .unwrap();
        assert_eq!(
            events,
            vec![
                SseEvent::Data("{\"a\":1}".to_string()),
                SseEvent::Data("{\"b\":2}".to_string())
            ]
        );
        assert_eq!(parser.buffer_size(), 0);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.add_bytes(b"data: {\"choi").unwrap().is_empty());
        let events = parser.add_bytes(b"ces\":[]}\r\n").unwrap();
        assert_eq!(events, vec![SseEvent::Data("{\"choices\":[]}".to_string())]);
    }

    #[test]
    fn test_done_marker_ends_stream() {
        let mut parser = SseParser::new();
        let events = parser
            .add_bytes(b"data: [DONE]\n\ndata: {\"late\":true}\n")
            .unwrap();
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(parser.is_finished());
    }

    #[test]
    fn test_comments_and_fields_ignored() {
        let mut parser = SseParser::new();
        let events = parser
            .add_bytes(b": keep-alive\nevent: message\nid: 4\ndata:\n")
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut parser = SseParser::new();
        parser.add_bytes(b"data: {\"tail\":1}").unwrap();
        assert_eq!(parser.finish(), Some(SseEvent::Data("{\"tail\":1}".to_string())));
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn test_buffer_overflow() {
        let mut parser = SseParser::with_capacity(100);
        let result = parser.add_bytes(&[b'a'; 150]);
        assert!(matches!(result, Err(PipelineError::GenerationUnavailable(_))));
    }

    #[test]
    fn test_parse_delta() {
        let payload = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hagrid"}}]}"#;
        assert_eq!(SseParser::parse_delta(payload).unwrap(), Some("Hagrid".to_string()));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(SseParser::parse_delta(role_only).unwrap(), None);

        assert!(SseParser::parse_delta("not json").is_err());
    }
}
