//! Execution context
//!
//! The context carries the process-wide settings every task execution
//! shares: working directory, interpreter, state directory and
//! verbosity-gated progress reporting.

use colored::Colorize;
use std::env;
use std::path::PathBuf;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

/// Shared settings for a run
pub struct Context {
    /// Current working directory; commands run relative to this
    pub working_dir: PathBuf,

    /// Configuration file path
    pub config_path: Option<PathBuf>,

    /// Interpreter the command string is handed to (e.g., ["sh", "-c"])
    pub interpreter: Vec<String>,

    /// Directory holding the cache store and run log
    pub state_dir: PathBuf,

    /// Verbosity level
    pub verbosity: Verbosity,
}

impl Context {
    /// Create a new context with default settings
    pub fn new() -> Self {
        Context {
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_path: None,
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            state_dir: PathBuf::from(".dagrun"),
            verbosity: Verbosity::Normal,
        }
    }

    /// Create a context with a specific working directory
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    /// Set the configuration file path
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Set the interpreter
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Set the state directory
    pub fn with_state_dir(mut self, dir: PathBuf) -> Self {
        self.state_dir = dir;
        self
    }

    /// Set verbosity level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Get the directory of the config file (or the working dir)
    pub fn config_dir(&self) -> PathBuf {
        self.config_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.working_dir.clone())
    }

    /// Path of the cache store file
    pub fn cache_path(&self) -> PathBuf {
        self.state_dir.join("cache.json")
    }

    /// Path of the run log file
    pub fn runlog_path(&self) -> PathBuf {
        self.state_dir.join("runlog.jsonl")
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{}", message);
        }
    }

    /// Print warning message
    pub fn print_warning(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
    }

    /// Print debug message (only in verbose mode)
    pub fn print_debug(&self, message: &str) {
        if self.verbosity >= Verbosity::Verbose {
            eprintln!("{} {}", "debug:".dimmed(), message);
        }
    }

    /// Forward a command's captured output to our stdout
    pub fn print_command_output(&self, output: &str) {
        if self.verbosity >= Verbosity::Quiet && !output.is_empty() {
            print!("{}", output);
        }
    }

    /// Print a task dispatch line
    pub fn print_task_start(&self, task_name: &str, command: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} {} {}", "run".cyan().bold(), task_name, command.dimmed());
        }
    }

    /// Print a task completion line
    pub fn print_task_complete(&self, task_name: &str) {
        self.print_debug(&format!("task completed: {}", task_name));
    }

    /// Print a task skip line
    pub fn print_task_skip(&self, task_name: &str, reason: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} {} ({})", "skip".yellow().bold(), task_name, reason);
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new() {
        let ctx = Context::new();
        assert_eq!(ctx.verbosity, Verbosity::Normal);
        assert_eq!(ctx.interpreter, vec!["sh", "-c"]);
        assert!(ctx.config_path.is_none());
    }

    #[test]
    fn test_builders() {
        let ctx = Context::new()
            .with_working_dir(PathBuf::from("/tmp"))
            .with_interpreter(vec!["bash".to_string(), "-c".to_string()])
            .with_state_dir(PathBuf::from("/tmp/state"))
            .with_verbosity(Verbosity::Verbose);

        assert_eq!(ctx.working_dir, PathBuf::from("/tmp"));
        assert_eq!(ctx.interpreter, vec!["bash", "-c"]);
        assert_eq!(ctx.cache_path(), PathBuf::from("/tmp/state/cache.json"));
        assert_eq!(ctx.runlog_path(), PathBuf::from("/tmp/state/runlog.jsonl"));
        assert_eq!(ctx.verbosity, Verbosity::Verbose);
    }

    #[test]
    fn test_config_dir_from_config_path() {
        let ctx = Context::new().with_config_path(PathBuf::from("/proj/dagrun.yml"));
        assert_eq!(ctx.config_dir(), PathBuf::from("/proj"));
    }

    #[test]
    fn test_verbosity_levels() {
        assert!(Verbosity::Verbose > Verbosity::Normal);
        assert!(Verbosity::Normal > Verbosity::Quiet);
        assert!(Verbosity::Quiet > Verbosity::Silent);
    }
}
