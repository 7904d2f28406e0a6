//! Display manager for REPL terminal UI
//!
//! Spinner while a question is in flight, formatted answers afterwards.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;

use crate::rag::{Answer, RequestState, Response};

/// Display manager for REPL UI
pub struct DisplayManager {
    current_bar: Option<ProgressBar>,
    update_interval: Duration,
}

impl DisplayManager {
    pub fn new() -> Self {
        DisplayManager {
            current_bar: None,
            update_interval: Duration::from_millis(100),
        }
    }

    /// Show welcome banner
    pub fn show_banner(&self, version: &str, model: &str, store: &str) {
        let width = 64;
        let rule = format!("{}", "=".repeat(width).cyan());
        let title = format!("  ⚡ PotterBuddy {} - Your Hogwarts Library Companion", version);
        let info = format!("  Model: {} | Library: {}", model, store);

        println!("\n{}", rule);
        println!("{}", title.bold().cyan());
        println!("{}", info.dimmed());
        println!("{}\n", rule);
        println!(
            "Ask anything about the wizarding world (or {} for commands, {} to quit)\n",
            "/help".green(),
            "/exit".green()
        );
    }

    /// Spinner shown until the answer is ready
    pub fn start_thinking(&mut self, state: RequestState) -> ProgressBar {
        self.finish_current();

        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.magenta} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["🪄 ", "✨ ", "⭐ ", "🌟 ", "✨ "]);
        pb.set_style(style);
        pb.set_message(stage_message(state));
        pb.enable_steady_tick(self.update_interval);

        self.current_bar = Some(pb.clone());
        pb
    }

    pub fn finish_current(&mut self) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_and_clear();
        }
    }

    /// Print one streamed fragment
    pub fn stream_fragment(&self, fragment: &str) {
        print!("{}", fragment);
        let _ = io::stdout().flush();
    }

    /// Render a finished request: the answer, or the fallback message
    pub fn show_response(&mut self, response: &Response, elapsed_ms: u64) {
        self.finish_current();
        match response.answer() {
            Some(answer) => self.show_answer(answer, elapsed_ms),
            None => {
                println!("\n{}\n", response.text().yellow());
            }
        }
    }

    pub fn show_answer(&self, answer: &Answer, elapsed_ms: u64) {
        println!("\n{}\n", answer.text);
        println!(
            "{} {}",
            "✓".green(),
            format!("{} | {} passages", format_duration(elapsed_ms), answer.passages_used).dimmed()
        );
        println!();
    }
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

fn stage_message(state: RequestState) -> &'static str {
    match state {
        RequestState::Received | RequestState::Retrieving => "Searching the Hogwarts library...",
        RequestState::Assembling | RequestState::Prompting => "Gathering passages...",
        RequestState::Generating => "Consulting the Pensieve...",
        RequestState::PostProcessing => "Polishing the answer...",
        _ => "Working...",
    }
}

fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}
