//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, the run/list/log
//! subcommands and shell completion generation.

pub mod app;

// Re-export main types
pub use app::*;
