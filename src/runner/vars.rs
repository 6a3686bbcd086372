//! Layered variable resolution
//!
//! Every task renders its command template against a single flat map,
//! built by layering sources from lowest to highest precedence:
//! configuration defaults, the process environment, the selected named
//! environment group, task-local `env` declarations, and per-invocation
//! overrides. Last write wins.

use crate::config::Config;
use crate::error::{ConfigError, ConfigResult};
use crate::registry::TaskDefinition;
use std::collections::BTreeMap;
use std::env;

/// Resolves the variable map for a task execution
pub struct VarResolver<'a> {
    defaults: &'a BTreeMap<String, String>,
    environments: &'a BTreeMap<String, BTreeMap<String, String>>,
}

impl<'a> VarResolver<'a> {
    /// Create a resolver over a loaded configuration
    pub fn new(config: &'a Config) -> Self {
        VarResolver {
            defaults: &config.defaults,
            environments: &config.environments,
        }
    }

    /// Build the variable map for one task
    ///
    /// `group` selects a named environment group; naming an undefined
    /// group is a load-time error.
    pub fn resolve(
        &self,
        task: &TaskDefinition,
        group: Option<&str>,
        overrides: &BTreeMap<String, String>,
    ) -> ConfigResult<BTreeMap<String, String>> {
        let mut vars = self.defaults.clone();

        for (key, value) in env::vars() {
            vars.insert(key, value);
        }

        if let Some(name) = group {
            let values = self
                .environments
                .get(name)
                .ok_or_else(|| ConfigError::UnknownEnvironment(name.to_string()))?;
            for (key, value) in values {
                vars.insert(key.clone(), value.clone());
            }
        }

        for (key, value) in &task.env {
            vars.insert(key.clone(), value.clone());
        }

        for (key, value) in overrides {
            vars.insert(key.clone(), value.clone());
        }

        Ok(vars)
    }
}
