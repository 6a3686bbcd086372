//! Main CLI application

use crate::cache::{self, CacheStore};
use crate::config::{load_env_file, parse_config_auto, parse_config_file, validate_config, Config, FailurePolicy};
use crate::registry::TaskRegistry;
use crate::runlog::RunLog;
use crate::runner::{Context, RunOptions, Scheduler, TaskGraph, VarResolver, Verbosity};
use anyhow::Context as _;
use clap::{Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use colored::Colorize;
use directories::ProjectDirs;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Build the clap command
fn build_command() -> Command {
    Command::new("dagrun")
        .version(crate::VERSION)
        .about("A YAML-based dependency-graph task runner")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to dagrun.yml config file")
                .global(true),
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .value_name("DIR")
                .help("Directory for the cache store and run log")
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Run tasks and their dependency closures")
                .arg(
                    Arg::new("tasks")
                        .value_name("TASK")
                        .num_args(0..)
                        .help("Task names or glob patterns (e.g. 'prompts:*')"),
                )
                .arg(
                    Arg::new("all")
                        .long("all")
                        .help("Run every registered task in dependency order")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help("Bypass the cache and always execute")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("parallel")
                        .short('j')
                        .long("parallel")
                        .value_name("N")
                        .help("Number of tasks to run concurrently")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("Print resolved commands without executing")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("env")
                        .long("env")
                        .value_name("GROUP")
                        .help("Layer a named environment group into variable resolution"),
                )
                .arg(
                    Arg::new("set")
                        .long("set")
                        .value_name("KEY=VALUE")
                        .help("Override a variable for this invocation")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("fail-fast")
                        .long("fail-fast")
                        .help("Stop dispatching new tasks after the first failure")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("list").about("List registered tasks"))
        .subcommand(
            Command::new("log")
                .about("Show past executions of a task, most recent last")
                .arg(
                    Arg::new("task")
                        .value_name("TASK")
                        .required(true)
                        .help("Task name"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .required(true)
                        .value_parser(clap::value_parser!(Shell)),
                ),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

/// Parse --set KEY=VALUE overrides
fn parse_overrides(values: Vec<&String>) -> anyhow::Result<BTreeMap<String, String>> {
    let mut overrides = BTreeMap::new();
    for value in values {
        let (key, val) = value
            .split_once('=')
            .with_context(|| format!("invalid --set '{}', expected KEY=VALUE", value))?;
        overrides.insert(key.to_string(), val.to_string());
    }
    Ok(overrides)
}

/// Resolve the state directory for a config file
///
/// Defaults to a per-project subdirectory of the platform cache dir,
/// keyed by a hash of the config path; --state-dir overrides it.
fn resolve_state_dir(override_dir: Option<&String>, config_path: &Path) -> PathBuf {
    if let Some(dir) = override_dir {
        return PathBuf::from(dir);
    }

    let key = cache::hash_str(&config_path.display().to_string());
    let key = &key[..12];
    match ProjectDirs::from("", "", "dagrun") {
        Some(dirs) => dirs.cache_dir().join(key),
        None => config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(".dagrun"),
    }
}

/// Run the CLI application
pub fn run() -> anyhow::Result<i32> {
    let mut command = build_command();
    let matches = command.clone().get_matches();

    // Completions need no configuration.
    if let Some(sub) = matches.subcommand_matches("completions") {
        let shell = *sub
            .get_one::<Shell>("shell")
            .context("shell argument is required")?;
        clap_complete::generate(shell, &mut command, "dagrun", &mut io::stdout());
        return Ok(0);
    }

    let (config, config_path) = match matches.get_one::<String>("file") {
        Some(file) => {
            let path = PathBuf::from(file);
            let config = parse_config_file(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            (config, path)
        }
        None => parse_config_auto().context("failed to load configuration")?,
    };
    validate_config(&config)?;
    load_env_file(&config_path);

    match matches.subcommand() {
        Some(("run", sub)) => run_tasks(&config, &config_path, &matches, sub),
        Some(("list", _)) => list_tasks(&config),
        Some(("log", sub)) => show_log(&config, &config_path, &matches, sub),
        _ => {
            command.print_help()?;
            println!();
            Ok(0)
        }
    }
}

/// Handle `dagrun run`
fn run_tasks(
    config: &Config,
    config_path: &Path,
    matches: &ArgMatches,
    sub: &ArgMatches,
) -> anyhow::Result<i32> {
    let registry = TaskRegistry::from_config(config)?;
    let graph = TaskGraph::build(&registry)?;

    let selectors: Vec<String> = if sub.get_flag("all") {
        registry.names().map(str::to_string).collect()
    } else {
        sub.get_many::<String>("tasks")
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };
    anyhow::ensure!(
        !selectors.is_empty(),
        "no tasks specified; name tasks to run or pass --all"
    );
    let roots = registry.select(&selectors)?;

    let overrides = parse_overrides(
        sub.get_many::<String>("set")
            .map(|values| values.collect())
            .unwrap_or_default(),
    )?;
    let policy = if sub.get_flag("fail-fast") {
        FailurePolicy::Abort
    } else {
        config.on_failure
    };
    let options = RunOptions {
        parallelism: *sub.get_one::<usize>("parallel").unwrap_or(&1),
        force: sub.get_flag("force"),
        policy,
        environment: sub.get_one::<String>("env").cloned(),
        overrides,
    };

    let working_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let state_dir = resolve_state_dir(matches.get_one::<String>("state-dir"), config_path);
    let mut ctx = Context::new()
        .with_working_dir(working_dir)
        .with_config_path(config_path.to_path_buf())
        .with_state_dir(state_dir)
        .with_verbosity(get_verbosity(matches));
    if let Some(interpreter) = &config.interpreter {
        ctx = ctx.with_interpreter(interpreter.clone());
    }

    let resolver = VarResolver::new(config);
    let scheduler = Scheduler::new(&registry, &graph, resolver, &ctx, options);

    if sub.get_flag("dry-run") {
        for task in scheduler.plan(&roots)? {
            println!("{}: {}", task.name.bold(), task.command);
        }
        return Ok(0);
    }

    let mut cache_store = match CacheStore::open(ctx.cache_path()) {
        Ok(store) => store,
        Err(e) => {
            ctx.print_warning(&format!("cache store unavailable, starting empty: {}", e));
            CacheStore::empty(ctx.cache_path())
        }
    };
    let mut log = RunLog::open(ctx.runlog_path())?;

    let summary = scheduler.run(&roots, &mut cache_store, &mut log)?;
    summary.print(&ctx);

    if summary.success() {
        Ok(0)
    } else {
        if let Some(name) = summary.first_failed() {
            eprintln!("{} {}", "failed:".red().bold(), name);
        }
        Ok(1)
    }
}

/// Handle `dagrun list`
fn list_tasks(config: &Config) -> anyhow::Result<i32> {
    let registry = TaskRegistry::from_config(config)?;

    let width = registry.names().map(str::len).max().unwrap_or(0);
    for task in registry.iter() {
        let description = task.description.as_deref().unwrap_or("");
        println!("{:<width$}  {}", task.name.bold(), description, width = width);
    }

    Ok(0)
}

/// Handle `dagrun log`
fn show_log(
    config: &Config,
    config_path: &Path,
    matches: &ArgMatches,
    sub: &ArgMatches,
) -> anyhow::Result<i32> {
    let registry = TaskRegistry::from_config(config)?;
    let task = sub
        .get_one::<String>("task")
        .context("task argument is required")?;
    registry.resolve(task)?;

    let state_dir = resolve_state_dir(matches.get_one::<String>("state-dir"), config_path);
    let log_path = state_dir.join("runlog.jsonl");
    if !log_path.is_file() {
        println!("no recorded executions for '{}'", task);
        return Ok(0);
    }

    let log = RunLog::open(log_path)?;
    let records = log.query(task)?;
    if records.is_empty() {
        println!("no recorded executions for '{}'", task);
        return Ok(0);
    }

    for record in records {
        let status = if record.cache_hit {
            "cached".yellow().to_string()
        } else {
            match record.exit_code {
                Some(0) => "ok".green().to_string(),
                Some(code) => format!("exit {}", code).red().to_string(),
                None => "killed".red().to_string(),
            }
        };
        println!(
            "{}  {:<8}  {}",
            record.start_time.format("%Y-%m-%d %H:%M:%S"),
            status,
            record.resolved_command
        );
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_structure() {
        build_command().debug_assert();
    }

    #[test]
    fn test_get_verbosity_normal() {
        let matches = build_command().get_matches_from(vec!["dagrun", "list"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Normal);
    }

    #[test]
    fn test_get_verbosity_silent_wins() {
        let matches = build_command().get_matches_from(vec!["dagrun", "-s", "-v", "list"]);
        assert_eq!(get_verbosity(&matches), Verbosity::Silent);
    }

    #[test]
    fn test_parse_overrides() {
        let a = "model=large".to_string();
        let b = "region=eu=west".to_string();
        let overrides = parse_overrides(vec![&a, &b]).unwrap();
        assert_eq!(overrides.get("model"), Some(&"large".to_string()));
        // only the first '=' splits
        assert_eq!(overrides.get("region"), Some(&"eu=west".to_string()));
    }

    #[test]
    fn test_parse_overrides_rejects_bare_key() {
        let bad = "justakey".to_string();
        assert!(parse_overrides(vec![&bad]).is_err());
    }

    #[test]
    fn test_resolve_state_dir_override() {
        let dir = "/tmp/custom-state".to_string();
        let resolved = resolve_state_dir(Some(&dir), Path::new("/proj/dagrun.yml"));
        assert_eq!(resolved, PathBuf::from("/tmp/custom-state"));
    }

    #[test]
    fn test_resolve_state_dir_differs_per_config() {
        let a = resolve_state_dir(None, Path::new("/proj-a/dagrun.yml"));
        let b = resolve_state_dir(None, Path::new("/proj-b/dagrun.yml"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_run_parses_flags() {
        let matches = build_command().get_matches_from(vec![
            "dagrun", "run", "build", "--force", "--parallel", "4", "--dry-run",
        ]);
        let sub = matches.subcommand_matches("run").unwrap();
        assert!(sub.get_flag("force"));
        assert!(sub.get_flag("dry-run"));
        assert_eq!(sub.get_one::<usize>("parallel"), Some(&4));
        let tasks: Vec<&String> = sub.get_many::<String>("tasks").unwrap().collect();
        assert_eq!(tasks, vec!["build"]);
    }
}
