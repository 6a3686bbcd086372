//! dagrun - a dependency-graph task runner
//!
//! dagrun executes a directed acyclic graph of named tasks, each
//! wrapping one templated external command, with content-addressed skip
//! caching and an append-only run log.

// Public modules
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod runlog;
pub mod runner;

// Re-export commonly used types
pub use error::{DagrunError, Result};

/// Current version of dagrun
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
