//! Command-line argument parsing for PotterBuddy
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::rag::QueryCategory;

/// PotterBuddy - Ask questions about the Harry Potter books
#[derive(Parser, Debug)]
#[command(name = "potterbuddy")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Retrieval-augmented answers about the wizarding world", long_about = None)]
pub struct Args {
    /// Question to answer; omit to start the interactive REPL
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,

    /// Question type hint (character, plot, detail, comparison, world, general)
    #[arg(long, global = true)]
    pub category: Option<String>,

    /// Print the answer as it is generated
    #[arg(long, global = true)]
    pub stream: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Answer a single question
    Ask {
        /// The question
        question: String,
    },

    /// Start interactive REPL mode
    Start,

    /// Run system diagnostics and health checks
    Doctor,

    /// Show chunk store statistics
    Stats,

    /// Display current configuration
    Config,

    /// List models available on the Groq API
    Models,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

/// What the binary should do after parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Ask(String),
    Repl,
    Command(Commands),
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Reject a positional question combined with a subcommand
    pub fn validate(&self) -> Result<(), String> {
        if self.command.is_some() && self.question.is_some() {
            return Err("Cannot specify a question with a subcommand. Use 'potterbuddy ask <QUESTION>'.".to_string());
        }

        if let Some(category) = &self.category {
            category
                .parse::<QueryCategory>()
                .map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    /// Resolve positional question and subcommand into one action
    pub fn action(&self) -> Action {
        match (&self.command, &self.question) {
            (Some(Commands::Ask { question }), _) => Action::Ask(question.clone()),
            (Some(Commands::Start), _) => Action::Repl,
            (Some(command), _) => Action::Command(command.clone()),
            (None, Some(question)) => Action::Ask(question.clone()),
            (None, None) => Action::Repl,
        }
    }

    /// Parsed `--category`; invalid values are caught by [`validate`](Self::validate)
    pub fn category_hint(&self) -> Option<QueryCategory> {
        self.category.as_deref().and_then(|c| c.parse().ok())
    }
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default `tracing` filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "potterbuddy=info,warn",
            Verbosity::VeryVerbose => "potterbuddy=debug,info",
        }
    }

    /// Check if should show spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}
