//! Task registry
//!
//! The registry holds the immutable runtime form of every task loaded
//! from configuration. It is backed by a `BTreeMap` so iteration order
//! (and everything derived from it) is deterministic.

use crate::config::{self, parse_duration};
use crate::error::{ConfigError, DagrunError, RegistryError, RegistryResult, Result};
use crate::runner::Template;
use globset::{Glob, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime task representation
///
/// This differs from `config::TaskConfig` by carrying the parsed command
/// template and timeout. Immutable once registered.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Task name, optionally namespaced ("group:subtask")
    pub name: String,

    /// Free-text description
    pub description: Option<String>,

    /// Parsed command template
    pub template: Template,

    /// Names of tasks that must complete first, declaration order,
    /// duplicates removed
    pub dependencies: Vec<String>,

    /// Input file globs, fingerprinted for cache validity
    pub inputs: Vec<String>,

    /// Output files the command produces
    pub outputs: Vec<PathBuf>,

    /// Task-local variable overrides
    pub env: BTreeMap<String, String>,

    /// Wall-clock bound for the command
    pub timeout: Option<Duration>,

    /// Redirect target for the command's standard output
    pub stdout: Option<PathBuf>,

    /// Whether to suppress progress output for this task
    pub quiet: bool,
}

impl TaskDefinition {
    /// Create a task definition from configuration
    pub fn from_config(name: String, config: config::TaskConfig) -> Result<Self> {
        let template = Template::parse(&config.run).map_err(|e| {
            DagrunError::Config(ConfigError::Invalid(format!("task '{}': {}", name, e)))
        })?;

        let timeout = match &config.timeout {
            Some(s) => Some(parse_duration(s)?),
            None => None,
        };

        let mut dependencies = Vec::new();
        for dep in config.deps {
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        Ok(TaskDefinition {
            name,
            description: config.description,
            template,
            dependencies,
            inputs: config.inputs,
            outputs: config.outputs,
            env: config.env,
            timeout,
            stdout: config.stdout,
            quiet: config.quiet,
        })
    }
}

/// Holds every task definition, keyed by name
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, TaskDefinition>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a validated configuration
    pub fn from_config(config: &config::Config) -> Result<Self> {
        let mut registry = TaskRegistry::new();
        for (name, task_config) in &config.tasks {
            let def = TaskDefinition::from_config(name.clone(), task_config.clone())?;
            registry.register(def)?;
        }
        Ok(registry)
    }

    /// Register a task definition
    pub fn register(&mut self, def: TaskDefinition) -> RegistryResult<()> {
        if self.tasks.contains_key(&def.name) {
            return Err(RegistryError::DuplicateTask(def.name));
        }
        self.tasks.insert(def.name.clone(), def);
        Ok(())
    }

    /// Look up a task definition by name
    pub fn resolve(&self, name: &str) -> RegistryResult<&TaskDefinition> {
        self.tasks
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTask(name.to_string()))
    }

    /// All task names, ascending
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// Iterate over all definitions in name order
    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.tasks.values()
    }

    /// Number of registered tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Expand task selectors into concrete task names
    ///
    /// Selectors without glob metacharacters must name a registered task
    /// exactly. Glob selectors (e.g. "prompts:*") match against all
    /// registered names and must match at least one. The result keeps
    /// selector order, deduplicated.
    pub fn select(&self, selectors: &[String]) -> RegistryResult<Vec<String>> {
        let mut selected = Vec::new();

        for selector in selectors {
            if selector.contains(['*', '?', '[']) {
                let glob = Glob::new(selector).map_err(|e| RegistryError::InvalidPattern {
                    pattern: selector.clone(),
                    error: e.to_string(),
                })?;
                let mut builder = GlobSetBuilder::new();
                builder.add(glob);
                let set = builder.build().map_err(|e| RegistryError::InvalidPattern {
                    pattern: selector.clone(),
                    error: e.to_string(),
                })?;

                let mut matched = false;
                for name in self.tasks.keys() {
                    if set.is_match(name) {
                        matched = true;
                        if !selected.contains(name) {
                            selected.push(name.clone());
                        }
                    }
                }
                if !matched {
                    return Err(RegistryError::NoMatch(selector.clone()));
                }
            } else {
                self.resolve(selector)?;
                if !selected.contains(selector) {
                    selected.push(selector.clone());
                }
            }
        }

        Ok(selected)
    }
}
