//! Input handler for the REPL using rustyline
//!
//! Line editing with persistent question history.

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::history::History;
use rustyline::DefaultEditor;
use std::path::PathBuf;

const DEFAULT_PROMPT: &str = "🧙 potterbuddy> ";

/// What the user typed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    Line(String),
    /// Ctrl-C: abandon the current line
    Interrupted,
    /// Ctrl-D
    Eof,
}

/// Readline wrapper with optional history file
pub struct InputHandler {
    editor: DefaultEditor,
    history_path: Option<PathBuf>,
    prompt: String,
}

impl InputHandler {
    pub fn new() -> Result<Self> {
        Ok(InputHandler {
            editor: DefaultEditor::new()?,
            history_path: None,
            prompt: DEFAULT_PROMPT.to_string(),
        })
    }

    /// Load history from `history_file` if it exists; saved on [`save_history`](Self::save_history)
    pub fn with_history(history_file: PathBuf) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;
        if history_file.exists() {
            let _ = editor.load_history(&history_file);
        }

        Ok(InputHandler {
            editor,
            history_path: Some(history_file),
            prompt: DEFAULT_PROMPT.to_string(),
        })
    }

    /// Read one trimmed line; non-empty lines go to history
    pub fn read_line(&mut self) -> Result<InputLine> {
        match self.editor.readline(&self.prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    let _ = self.editor.add_history_entry(trimmed);
                }
                Ok(InputLine::Line(trimmed.to_string()))
            }
            Err(ReadlineError::Interrupted) => Ok(InputLine::Interrupted),
            Err(ReadlineError::Eof) => Ok(InputLine::Eof),
            Err(err) => Err(anyhow::anyhow!("Readline error: {}", err)),
        }
    }

    pub fn save_history(&mut self) -> Result<()> {
        if let Some(ref path) = self.history_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.editor.save_history(path)?;
        }
        Ok(())
    }

    pub fn history_len(&self) -> usize {
        self.editor.history().len()
    }
}
