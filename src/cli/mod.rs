//! CLI module for PotterBuddy
//!
//! Handles command-line argument parsing.

pub mod args;

pub use args::{Action, Args, Commands, Verbosity};
