//! REPL (Read-Eval-Print Loop) for interactive questions
//!
//! Reads a line, dispatches `/` commands, and sends everything else through
//! the answer pipeline. Ctrl-C while a question is in flight cancels it.

pub mod commands;
pub mod display;
pub mod input;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::rag::{QueryCategory, RAGPipeline, RequestOptions, RequestState, Response};
use crate::repl::commands::{is_command, CommandHandler};
pub use crate::repl::display::DisplayManager;
use crate::repl::input::{InputHandler, InputLine};

/// Interactive session over a shared pipeline
pub struct ReplSession {
    pipeline: Arc<RAGPipeline>,
    input_handler: InputHandler,
    command_handler: CommandHandler,
    display_manager: DisplayManager,
    questions_asked: usize,
}

impl ReplSession {
    pub fn new(pipeline: Arc<RAGPipeline>, config: ReplConfig) -> Result<Self> {
        let input_handler = match config.history_file {
            Some(path) => InputHandler::with_history(path)?,
            None => InputHandler::new()?,
        };

        Ok(ReplSession {
            pipeline,
            input_handler,
            command_handler: CommandHandler::new()
                .with_streaming(config.streaming)
                .with_category(config.category),
            display_manager: DisplayManager::new(),
            questions_asked: 0,
        })
    }

    /// Run until `/exit` or Ctrl-D
    pub async fn run(&mut self, version: &str) -> Result<()> {
        self.display_manager.show_banner(
            version,
            self.pipeline.model(),
            &self.pipeline.describe_store(),
        );

        loop {
            let line = match self.input_handler.read_line()? {
                InputLine::Line(line) => line,
                InputLine::Interrupted => continue,
                InputLine::Eof => break,
            };

            if !self.handle_input(&line).await? {
                break;
            }
        }

        self.save()?;
        Ok(())
    }

    /// Handle one line; returns false when the session should end
    pub async fn handle_input(&mut self, input: &str) -> Result<bool> {
        if input.trim().is_empty() {
            return Ok(true);
        }

        if is_command(input) {
            let command = self.command_handler.parse(input);
            return self.command_handler.execute(command, self.pipeline.telemetry());
        }

        self.ask(input).await;
        Ok(true)
    }

    /// Answer one question and print the result
    pub async fn ask(&mut self, question: &str) -> Response {
        self.questions_asked += 1;

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let started = Instant::now();
        let hint = self.command_handler.category().map(|c| c.as_str());
        let options = RequestOptions::default();

        let response = if self.command_handler.is_streaming() {
            println!();
            let display = &self.display_manager;
            let response = self
                .pipeline
                .respond_streaming(question, hint, &options, &cancel, |fragment| {
                    display.stream_fragment(fragment)
                })
                .await;
            println!();
            match response.answer() {
                Some(answer) => {
                    let footer = answer.text.strip_prefix(answer.body.as_str()).unwrap_or("");
                    if !footer.trim().is_empty() {
                        println!("{}", footer.trim_start_matches('\n'));
                    }
                    println!();
                }
                None => self.display_manager.show_response(&response, 0),
            }
            response
        } else {
            self.display_manager.start_thinking(RequestState::Retrieving);
            let response = self
                .pipeline
                .respond_with(question, hint, &options, &cancel)
                .await;
            self.display_manager
                .show_response(&response, started.elapsed().as_millis() as u64);
            response
        };

        watcher.abort();
        response
    }

    pub fn save(&mut self) -> Result<()> {
        self.input_handler.save_history()
    }

    pub fn questions_asked(&self) -> usize {
        self.questions_asked
    }
}

/// Configuration for REPL mode
#[derive(Debug, Clone, Default)]
pub struct ReplConfig {
    pub history_file: Option<PathBuf>,
    pub streaming: bool,
    pub category: Option<QueryCategory>,
}

impl ReplConfig {
    /// History under `~/.potterbuddy/history`
    pub fn with_default_history() -> Self {
        ReplConfig {
            history_file: dirs::home_dir().map(|h| h.join(".potterbuddy").join("history")),
            ..Default::default()
        }
    }
}
