//! Configuration validation
//!
//! Structural checks that run before the registry and graph are built.
//! Anything caught here is a load-time error; no task ever executes.

use crate::config::types::{parse_duration, Config, TaskConfig};
use crate::error::{ConfigError, ConfigResult};

/// Validate a complete configuration
pub fn validate_config(config: &Config) -> ConfigResult<()> {
    if let Some(interpreter) = &config.interpreter {
        if interpreter.is_empty() {
            return Err(ConfigError::Invalid(
                "interpreter must have at least one element".to_string(),
            ));
        }
    }

    for (name, task) in &config.tasks {
        validate_task(name, task)?;
    }

    for group in config.environments.keys() {
        validate_name(group, "environment group")?;
    }

    Ok(())
}

/// Validate a single task
pub fn validate_task(name: &str, task: &TaskConfig) -> ConfigResult<()> {
    validate_name(name, "task")?;

    if task.run.trim().is_empty() {
        return Err(ConfigError::Invalid(format!(
            "task '{}' has an empty run command",
            name
        )));
    }

    for dep in &task.deps {
        if dep.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "task '{}' has an empty dependency name",
                name
            )));
        }
    }

    for output in &task.outputs {
        if output.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "task '{}' has an empty output path",
                name
            )));
        }
    }

    if let Some(timeout) = &task.timeout {
        parse_duration(timeout)?;
    }

    Ok(())
}

/// Validate a task or environment group name
///
/// Names are namespaced with ':' (e.g. "bundle:sources") and otherwise
/// limited to word characters, '-' and '.'.
fn validate_name(name: &str, kind: &str) -> ConfigResult<()> {
    if name.is_empty() {
        return Err(ConfigError::Invalid(format!("empty {} name", kind)));
    }

    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if !valid {
        return Err(ConfigError::Invalid(format!(
            "invalid {} name '{}': only alphanumerics, '_', '-', '.' and ':' are allowed",
            kind, name
        )));
    }

    Ok(())
}
