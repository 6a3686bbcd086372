//! Core configuration types
//!
//! This module defines the data structures that represent a dagrun.yml
//! configuration file.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Project name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Global interpreter to use for commands (e.g., ["sh", "-c"])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Vec<String>>,

    /// What to do with the rest of the graph after a task fails
    #[serde(rename = "on-failure", default)]
    pub on_failure: FailurePolicy,

    /// Lowest-precedence variable values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, String>,

    /// Named variable groups, selected per run with --env
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, BTreeMap<String, String>>,

    /// Tasks defined in the configuration
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
}

/// Failure propagation policy for a run
///
/// `Continue` poisons only the transitive dependents of a failed task;
/// `Abort` additionally stops dispatching anything new once the first
/// failure is observed. Tasks already running always finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Continue,
    Abort,
}

/// A task definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskConfig {
    /// Free-text description for help and list output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Command template with ${var} placeholders
    pub run: String,

    /// Names of tasks that must complete first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<String>,

    /// Input files or globs, fingerprinted for cache validity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Output files produced by the command
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<PathBuf>,

    /// Task-local variable overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Wall-clock bound for the command, e.g. "500ms", "30s", "5m"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Redirect the command's standard output to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<PathBuf>,

    /// Whether this task should run without progress output
    #[serde(default)]
    pub quiet: bool,
}

/// Parse a duration string with an optional ms/s/m/h suffix
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidDuration(s.to_string()));
    }

    let parsed = if let Some(ms) = trimmed.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(hours) = trimmed.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600))
    } else if let Some(mins) = trimmed.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60))
    } else if let Some(secs) = trimmed.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else {
        trimmed.parse::<u64>().ok().map(Duration::from_secs)
    };

    parsed.ok_or_else(|| ConfigError::InvalidDuration(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_simple_config() {
        let yaml = r#"
tasks:
  hello:
    run: echo "hello"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tasks.len(), 1);
        assert!(config.tasks.contains_key("hello"));
        assert_eq!(config.on_failure, FailurePolicy::Continue);
    }

    #[test]
    fn test_deserialize_task_with_deps_and_io() {
        let yaml = r#"
tasks:
  bundle:
    description: Bundle the sources
    run: "bundler ${flags} > bundle.txt"
    deps: [clean]
    inputs: ["src/**/*.rs"]
    outputs: [bundle.txt]
    env:
      flags: "--all"
    timeout: 30s
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let task = config.tasks.get("bundle").unwrap();
        assert_eq!(task.deps, vec!["clean"]);
        assert_eq!(task.inputs, vec!["src/**/*.rs"]);
        assert_eq!(task.outputs, vec![PathBuf::from("bundle.txt")]);
        assert_eq!(task.env.get("flags"), Some(&"--all".to_string()));
        assert_eq!(task.timeout.as_deref(), Some("30s"));
    }

    #[test]
    fn test_deserialize_environments_and_defaults() {
        let yaml = r#"
defaults:
  model: small
environments:
  prod:
    model: large
tasks:
  noop:
    run: "true"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.defaults.get("model"), Some(&"small".to_string()));
        assert_eq!(
            config.environments.get("prod").and_then(|g| g.get("model")),
            Some(&"large".to_string())
        );
    }

    #[test]
    fn test_deserialize_failure_policy() {
        let yaml = r#"
on-failure: abort
tasks:
  noop:
    run: "true"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.on_failure, FailurePolicy::Abort);
    }

    #[test]
    fn test_parse_duration_suffixes() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("42").unwrap(), Duration::from_secs(42));
    }

    #[test]
    fn test_parse_duration_invalid() {
        for bad in ["", "fast", "10x", "ms", "-1s"] {
            assert!(parse_duration(bad).is_err(), "accepted {:?}", bad);
        }
    }
}
