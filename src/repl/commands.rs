//! Command handler for REPL built-in commands
//!
//! Anything starting with `/` is a command; everything else is a question.

use anyhow::Result;
use colored::*;

use crate::rag::QueryCategory;
use crate::telemetry::{TelemetryCollector, TelemetryDisplay};

/// REPL command types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    /// Sample questions, optionally for one category
    Examples { category: Option<QueryCategory> },
    /// Set or clear (`None`) the category hint sent with each question
    Category { hint: Option<QueryCategory> },
    Stats,
    Stream { enable: bool },
    Clear,
    Exit,
    Unknown { input: String },
}

/// Parses and executes commands; owns the per-session toggles
pub struct CommandHandler {
    category: Option<QueryCategory>,
    streaming: bool,
}

impl CommandHandler {
    pub fn new() -> Self {
        CommandHandler {
            category: None,
            streaming: false,
        }
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_category(mut self, category: Option<QueryCategory>) -> Self {
        self.category = category;
        self
    }

    /// Parse input string into a command
    pub fn parse(&self, input: &str) -> Command {
        let trimmed = input.trim();

        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Unknown { input: input.to_string() };
        };

        let parts: Vec<&str> = rest.split_whitespace().collect();
        if parts.is_empty() {
            return Command::Unknown { input: input.to_string() };
        }

        match parts[0].to_lowercase().as_str() {
            "help" | "h" => Command::Help,
            "exit" | "quit" | "q" => Command::Exit,
            "examples" | "ex" => match parts.get(1) {
                None => Command::Examples { category: None },
                Some(name) => match name.parse() {
                    Ok(category) => Command::Examples { category: Some(category) },
                    Err(_) => Command::Unknown { input: input.to_string() },
                },
            },
            "category" | "cat" => match parts.get(1).map(|s| s.to_lowercase()) {
                None => Command::Unknown { input: input.to_string() },
                Some(name) if name == "off" || name == "auto" => Command::Category { hint: None },
                Some(name) => match name.parse() {
                    Ok(category) => Command::Category { hint: Some(category) },
                    Err(_) => Command::Unknown { input: input.to_string() },
                },
            },
            "stats" | "status" => Command::Stats,
            "stream" => {
                let enable = parts
                    .get(1)
                    .map(|s| {
                        let s = s.to_lowercase();
                        s == "on" || s == "1" || s == "true"
                    })
                    .unwrap_or(!self.streaming);
                Command::Stream { enable }
            }
            "clear" | "cls" => Command::Clear,
            _ => Command::Unknown { input: input.to_string() },
        }
    }

    /// Execute a command
    ///
    /// Returns true if the REPL should continue, false if it should exit
    pub fn execute(&mut self, command: Command, telemetry: &TelemetryCollector) -> Result<bool> {
        match command {
            Command::Help => {
                self.show_help();
                Ok(true)
            }
            Command::Exit => {
                println!("{}", "Mischief managed. Goodbye!".green());
                Ok(false)
            }
            Command::Examples { category } => {
                self.show_examples(category);
                Ok(true)
            }
            Command::Category { hint } => {
                self.category = hint;
                match hint {
                    Some(category) => println!("{}", format!("Category hint set to {}", category).cyan()),
                    None => println!("{}", "Category hint cleared; detecting automatically".cyan()),
                }
                Ok(true)
            }
            Command::Stats => {
                TelemetryDisplay::new(telemetry.clone()).display_summary();
                Ok(true)
            }
            Command::Stream { enable } => {
                self.streaming = enable;
                let status = if enable { "enabled" } else { "disabled" };
                println!("{}", format!("Streaming {}", status).cyan());
                Ok(true)
            }
            Command::Clear => {
                print!("\x1B[2J\x1B[1;1H");
                Ok(true)
            }
            Command::Unknown { input } => {
                println!("{}", format!("Unknown command: {}", input).red());
                println!("Type {} for available commands", "/help".cyan());
                Ok(true)
            }
        }
    }

    fn show_help(&self) {
        println!("\n{}", "Available Commands:".bold().cyan());
        println!("{}", "=".repeat(60).cyan());

        let commands = [
            ("/help, /h", "Show this help message"),
            ("/examples [category]", "Show sample questions"),
            ("/category <name|off>", "Steer answers toward a question type"),
            ("/stats", "Show request statistics"),
            ("/stream [on|off]", "Print answers as they are generated"),
            ("/clear, /cls", "Clear screen"),
            ("/exit, /quit, /q", "Exit"),
        ];

        for (cmd, desc) in commands {
            println!("  {:<24} {}", cmd.green(), desc);
        }

        println!("\n{}", "Categories:".bold());
        for category in QueryCategory::ALL {
            println!("  {:<24} {}", category.as_str().green(), category.label());
        }

        println!("\n{}", "Usage:".bold());
        println!("  - Type a question about the wizarding world (no / prefix)");
        println!("  - Use {} for question history", "UP/DOWN arrows".cyan());
        println!("  - Press {} or {} to exit", "Ctrl-D".cyan(), "/exit".cyan());
        println!();
    }

    fn show_examples(&self, category: Option<QueryCategory>) {
        let categories: Vec<QueryCategory> = match category {
            Some(c) => vec![c],
            None => QueryCategory::ALL.to_vec(),
        };

        println!("\n{}", "Example Questions:".bold().cyan());
        println!("{}", "=".repeat(60).cyan());
        for category in categories {
            println!("  {}", category.label().bold());
            for example in category.examples() {
                println!("    • {}", example);
            }
        }
        println!();
    }

    /// Category hint for the next question
    pub fn category(&self) -> Option<QueryCategory> {
        self.category
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

impl Default for CommandHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if input is a command (starts with /)
pub fn is_command(input: &str) -> bool {
    input.trim().starts_with('/')
}
