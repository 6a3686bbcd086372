//! Command execution
//!
//! Each non-cached task crosses the process boundary exactly once, here.
//! The child's streams are captured (or stdout redirected to a file),
//! and an optional wall-clock timeout kills and reaps the child. The
//! child handle is reaped on every exit path.

use crate::error::{ExecutionError, ExecutionResult};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Everything needed to run one resolved command
pub struct CommandSpec<'a> {
    /// The fully resolved command string
    pub command: &'a str,

    /// Interpreter invocation, e.g. ["sh", "-c"]
    pub interpreter: &'a [String],

    /// Working directory for the child
    pub working_dir: &'a Path,

    /// Environment handed to the child
    pub env: &'a BTreeMap<String, String>,

    /// Optional wall-clock bound
    pub timeout: Option<Duration>,

    /// Redirect stdout to this file instead of capturing it
    pub stdout_path: Option<&'a Path>,
}

/// What happened when a command ran to completion (or was killed)
#[derive(Debug)]
pub struct CommandOutcome {
    /// Exit code; None when killed by a signal or timed out
    pub exit_code: Option<i32>,

    /// Captured standard output (empty when redirected to a file)
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Whether the wall-clock bound expired
    pub timed_out: bool,
}

impl CommandOutcome {
    /// Whether the command completed successfully
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run a resolved command through the interpreter
pub fn execute(spec: &CommandSpec) -> ExecutionResult<CommandOutcome> {
    let interpreter = spec
        .interpreter
        .first()
        .ok_or_else(|| ExecutionError::Spawn(std::io::Error::other("empty interpreter")))?;

    let mut command = StdCommand::new(interpreter);
    if spec.interpreter.len() > 1 {
        command.args(&spec.interpreter[1..]);
    }
    command.arg(spec.command);
    command.current_dir(spec.working_dir);
    command.envs(spec.env);
    command.stdin(Stdio::null());
    command.stderr(Stdio::piped());

    match spec.stdout_path {
        Some(path) => {
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                spec.working_dir.join(path)
            };
            let file = File::create(&absolute).map_err(ExecutionError::Spawn)?;
            command.stdout(Stdio::from(file));
        }
        None => {
            command.stdout(Stdio::piped());
        }
    }

    let mut child = command.spawn().map_err(ExecutionError::Spawn)?;

    // Drain pipes on separate threads so a full pipe buffer can never
    // deadlock the wait below.
    let stdout_handle = child.stdout.take().map(spawn_reader);
    let stderr_handle = child.stderr.take().map(spawn_reader);

    let (status, timed_out) = match wait_for(&mut child, spec.timeout) {
        Ok(waited) => waited,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecutionError::Wait(e));
        }
    };

    let stdout = join_reader(stdout_handle);
    let stderr = join_reader(stderr_handle);

    Ok(CommandOutcome {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        timed_out,
    })
}

/// Wait for the child, enforcing the optional timeout
///
/// On expiry the child is killed and reaped before returning.
fn wait_for(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::io::Result<(Option<ExitStatus>, bool)> {
    match timeout {
        Some(limit) => match child.wait_timeout(limit)? {
            Some(status) => Ok((Some(status), false)),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Ok((None, true))
            }
        },
        None => Ok((Some(child.wait()?), false)),
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh() -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string()]
    }

    fn spec<'a>(
        command: &'a str,
        interpreter: &'a [String],
        dir: &'a Path,
        env: &'a BTreeMap<String, String>,
    ) -> CommandSpec<'a> {
        CommandSpec {
            command,
            interpreter,
            working_dir: dir,
            env,
            timeout: None,
            stdout_path: None,
        }
    }

    #[test]
    fn test_execute_captures_stdout() {
        let interpreter = sh();
        let env = BTreeMap::new();
        let dir = PathBuf::from(".");

        let outcome = execute(&spec("echo hello", &interpreter, &dir, &env)).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "hello");
    }

    #[test]
    fn test_execute_captures_stderr_on_failure() {
        let interpreter = sh();
        let env = BTreeMap::new();
        let dir = PathBuf::from(".");

        let outcome = execute(&spec("echo oops >&2; exit 3", &interpreter, &dir, &env)).unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr.trim(), "oops");
    }

    #[test]
    fn test_execute_env_passed_to_child() {
        let interpreter = sh();
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hi".to_string());
        let dir = PathBuf::from(".");

        let outcome = execute(&spec("echo $GREETING", &interpreter, &dir, &env)).unwrap();
        assert_eq!(outcome.stdout.trim(), "hi");
    }

    #[test]
    fn test_execute_timeout_kills_child() {
        let interpreter = sh();
        let env = BTreeMap::new();
        let dir = PathBuf::from(".");

        let mut s = spec("sleep 5", &interpreter, &dir, &env);
        s.timeout = Some(Duration::from_millis(50));

        let outcome = execute(&s).unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, None);
    }

    #[test]
    fn test_execute_stdout_redirect() {
        let temp = tempfile::TempDir::new().unwrap();
        let interpreter = sh();
        let env = BTreeMap::new();
        let out = temp.path().join("out.txt");

        let mut s = spec("echo redirected", &interpreter, temp.path(), &env);
        s.stdout_path = Some(Path::new("out.txt"));

        let outcome = execute(&s).unwrap();
        assert!(outcome.success());
        assert!(outcome.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(out).unwrap().trim(), "redirected");
    }

    #[test]
    fn test_execute_spawn_failure() {
        let interpreter = vec!["definitely-not-a-real-binary-xyz".to_string()];
        let env = BTreeMap::new();
        let dir = PathBuf::from(".");

        let result = execute(&spec("true", &interpreter, &dir, &env));
        assert!(matches!(result, Err(ExecutionError::Spawn(_))));
    }
}
