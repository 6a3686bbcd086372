//! Error types for dagrun

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for dagrun operations
pub type Result<T> = std::result::Result<T, DagrunError>;

/// Main error type for dagrun
#[derive(Error, Debug)]
pub enum DagrunError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Task registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Dependency graph errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Command template errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Task execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON errors (cache store, run log)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Environment group '{0}' is not defined")]
    UnknownEnvironment(String),

    #[error("Invalid duration '{0}' (expected a number with an ms, s, m or h suffix)")]
    InvalidDuration(String),
}

/// Task registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Task '{0}' is not defined")]
    UnknownTask(String),

    #[error("No registered task matches '{0}'")]
    NoMatch(String),

    #[error("Invalid task pattern '{pattern}': {error}")]
    InvalidPattern { pattern: String, error: String },
}

/// Dependency graph construction errors
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },
}

/// Command template errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Variable '{0}' is not defined")]
    UnresolvedVariable(String),

    #[error("Invalid template syntax: {0}")]
    InvalidSyntax(String),
}

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command failed with exit code {0:?}")]
    CommandFailed(Option<i32>),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to spawn command: {0}")]
    Spawn(io::Error),

    #[error("Failed to wait for command: {0}")]
    Wait(io::Error),

    #[error("Failed to record execution: {0}")]
    RunLog(String),
}

/// Cache store and fingerprinting errors
///
/// These never abort a run; callers downgrade them to a warning and a
/// cache miss.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error for '{path}': {error}")]
    Io { path: PathBuf, error: io::Error },

    #[error("Invalid input pattern '{pattern}': {error}")]
    Pattern { pattern: String, error: String },

    #[error("Cache store is corrupt: {0}")]
    Corrupt(String),
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Specialized result type for graph operations
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Specialized result type for template operations
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

/// Specialized result type for execution operations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;
