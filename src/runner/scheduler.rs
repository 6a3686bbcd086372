//! Task scheduling and execution
//!
//! The scheduler walks the dependency closure of the requested tasks,
//! resolves and renders every command up front (any resolution failure
//! aborts before anything runs), then pulls ready tasks through a
//! fixed-size worker pool. The cache store is consulted before each
//! dispatch and every invocation is appended to the run log. All cache
//! and log writes happen on the scheduling thread, so each store has a
//! single writer.

use crate::cache::{self, CacheEntry, CacheStore};
use crate::config::FailurePolicy;
use crate::error::{ExecutionError, ExecutionResult, Result};
use crate::registry::TaskRegistry;
use crate::runlog::{ExecutionRecord, RunLog};
use crate::runner::command::{self, CommandOutcome, CommandSpec};
use crate::runner::context::Context;
use crate::runner::graph::TaskGraph;
use crate::runner::vars::VarResolver;
use chrono::{DateTime, Utc};
use colored::Colorize;
use crossbeam::channel;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

/// Lifecycle of one task within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskState {
    /// Whether the run finished with this task in an acceptable state
    pub fn is_ok(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Skipped)
    }
}

/// Per-run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker count; 0 or 1 means strictly sequential
    pub parallelism: usize,

    /// Bypass cache lookup and always execute
    pub force: bool,

    /// What happens to the rest of the graph after a failure
    pub policy: FailurePolicy,

    /// Named environment group to layer into variable resolution
    pub environment: Option<String>,

    /// Per-invocation variable overrides, highest precedence
    pub overrides: BTreeMap<String, String>,
}

/// A task with its command fully resolved, ready to execute
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub name: String,
    pub command: String,
    pub vars: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub inputs: Vec<String>,
    pub outputs: Vec<PathBuf>,
    pub stdout: Option<PathBuf>,
    pub quiet: bool,
}

/// Final account of one task in a run
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub name: String,
    pub state: TaskState,
    pub cache_hit: bool,
    pub duration: Option<Duration>,
    pub error: Option<String>,
    pub stderr: Option<String>,
}

/// Outcome of a whole run, reports in topological order
#[derive(Debug)]
pub struct RunSummary {
    pub reports: Vec<TaskReport>,
    first_failed: Option<String>,
}

impl RunSummary {
    /// Whether every task ended Succeeded or Skipped
    pub fn success(&self) -> bool {
        self.reports.iter().all(|r| r.state.is_ok())
    }

    /// Name of the first task observed to fail, if any
    pub fn first_failed(&self) -> Option<&str> {
        self.first_failed.as_deref()
    }

    /// Print the per-task summary and any captured error output
    pub fn print(&self, ctx: &Context) {
        ctx.print_info("");
        for report in &self.reports {
            let label = match report.state {
                TaskState::Succeeded => "ok".green().bold(),
                TaskState::Skipped => "skipped".yellow().bold(),
                TaskState::Failed => "failed".red().bold(),
                _ => "not run".dimmed(),
            };
            let detail = if report.cache_hit {
                " (cached)".to_string()
            } else if let Some(d) = report.duration {
                format!(" ({:.1}s)", d.as_secs_f64())
            } else {
                String::new()
            };
            ctx.print_info(&format!("{:>8}  {}{}", label, report.name, detail.dimmed()));
        }

        for report in &self.reports {
            if report.state != TaskState::Failed {
                continue;
            }
            if let Some(error) = &report.error {
                ctx.print_error(&format!("task '{}': {}", report.name, error));
            }
            if let Some(stderr) = &report.stderr {
                if !stderr.is_empty() {
                    ctx.print_error(&format!("task '{}' stderr:", report.name));
                    eprint!("{}", stderr);
                }
            }
        }
    }
}

/// What a worker hands back for one executed task
struct WorkerResult {
    name: String,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
    result: ExecutionResult<CommandOutcome>,
}

/// Runs a dependency closure to completion
pub struct Scheduler<'a> {
    registry: &'a TaskRegistry,
    graph: &'a TaskGraph,
    resolver: VarResolver<'a>,
    ctx: &'a Context,
    options: RunOptions,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        registry: &'a TaskRegistry,
        graph: &'a TaskGraph,
        resolver: VarResolver<'a>,
        ctx: &'a Context,
        options: RunOptions,
    ) -> Self {
        Scheduler {
            registry,
            graph,
            resolver,
            ctx,
            options,
        }
    }

    /// Resolve variables and render commands for the whole closure of
    /// the requested tasks, in topological order
    ///
    /// Any unresolved variable or unknown task fails the plan; nothing
    /// executes on a partial plan.
    pub fn plan(&self, roots: &[String]) -> Result<Vec<PlannedTask>> {
        let closure = self.graph.closure(roots);
        let order = self.graph.topo_order(&closure);

        let mut planned = Vec::with_capacity(order.len());
        for name in order {
            let task = self.registry.resolve(&name)?;
            let vars = self.resolver.resolve(
                task,
                self.options.environment.as_deref(),
                &self.options.overrides,
            )?;
            let command = task.template.render(&vars)?;

            planned.push(PlannedTask {
                name: task.name.clone(),
                command,
                vars,
                timeout: task.timeout,
                inputs: task.inputs.clone(),
                outputs: task.outputs.clone(),
                stdout: task.stdout.clone(),
                quiet: task.quiet,
            });
        }

        Ok(planned)
    }

    /// Execute the closure of the requested tasks
    pub fn run(
        &self,
        roots: &[String],
        cache: &mut CacheStore,
        log: &mut RunLog,
    ) -> Result<RunSummary> {
        let planned = self.plan(roots)?;
        let order: Vec<String> = planned.iter().map(|t| t.name.clone()).collect();
        let tasks: BTreeMap<String, PlannedTask> =
            planned.into_iter().map(|t| (t.name.clone(), t)).collect();
        let subset: BTreeSet<String> = order.iter().cloned().collect();

        let mut states: BTreeMap<String, TaskState> = order
            .iter()
            .map(|n| (n.clone(), TaskState::Pending))
            .collect();
        let mut remaining: BTreeMap<String, usize> = BTreeMap::new();
        let mut ready: BTreeSet<String> = BTreeSet::new();
        for name in &order {
            let count = self
                .graph
                .dependencies_of(name)
                .iter()
                .filter(|dep| subset.contains(*dep))
                .count();
            remaining.insert(name.clone(), count);
            if count == 0 {
                states.insert(name.clone(), TaskState::Ready);
                ready.insert(name.clone());
            }
        }

        let mut cache_hits: BTreeSet<String> = BTreeSet::new();
        let mut durations: BTreeMap<String, Duration> = BTreeMap::new();
        let mut errors: BTreeMap<String, String> = BTreeMap::new();
        let mut stderrs: BTreeMap<String, String> = BTreeMap::new();
        let mut first_failed: Option<String> = None;

        let workers = self.options.parallelism.max(1);
        let (job_tx, job_rx) = channel::unbounded::<PlannedTask>();
        let (result_tx, result_rx) = channel::unbounded::<WorkerResult>();

        thread::scope(|scope| -> Result<()> {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let ctx = self.ctx;
                scope.spawn(move || {
                    while let Ok(task) = job_rx.recv() {
                        let started = Utc::now();
                        let spec = CommandSpec {
                            command: &task.command,
                            interpreter: &ctx.interpreter,
                            working_dir: &ctx.working_dir,
                            env: &task.vars,
                            timeout: task.timeout,
                            stdout_path: task.stdout.as_deref(),
                        };
                        let result = command::execute(&spec);
                        let sent = result_tx.send(WorkerResult {
                            name: task.name.clone(),
                            started,
                            finished: Utc::now(),
                            result,
                        });
                        if sent.is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            let mut running = 0usize;
            let mut halted = false;

            loop {
                // Dispatch everything ready, up to the worker count.
                while !halted && running < workers {
                    let Some(name) = ready.iter().next().cloned() else {
                        break;
                    };
                    ready.remove(&name);
                    let task = &tasks[&name];

                    if !self.options.force {
                        match cache::input_fingerprint(
                            &task.command,
                            &task.inputs,
                            &self.ctx.working_dir,
                        ) {
                            Ok(fp) => {
                                if let Some(entry) =
                                    cache.lookup(&name, &fp, &self.ctx.working_dir)
                                {
                                    let output_fp = entry.output_fingerprint.clone();
                                    let now = Utc::now();
                                    log.append(&ExecutionRecord {
                                        task_name: name.clone(),
                                        resolved_command: task.command.clone(),
                                        start_time: now,
                                        end_time: now,
                                        exit_code: None,
                                        cache_hit: true,
                                        output_fingerprint: Some(output_fp),
                                    })?;
                                    states.insert(name.clone(), TaskState::Skipped);
                                    cache_hits.insert(name.clone());
                                    self.ctx.print_task_skip(&name, "cache hit");
                                    promote_dependents(
                                        &name,
                                        self.graph,
                                        &mut states,
                                        &mut remaining,
                                        &mut ready,
                                    );
                                    continue;
                                }
                            }
                            Err(e) => {
                                self.ctx.print_warning(&format!(
                                    "cache lookup for '{}' failed, running anyway: {}",
                                    name, e
                                ));
                            }
                        }
                    }

                    if !task.quiet {
                        self.ctx.print_task_start(&name, &task.command);
                    }
                    states.insert(name.clone(), TaskState::Running);
                    running += 1;
                    job_tx
                        .send(task.clone())
                        .map_err(|_| io::Error::other("worker pool disconnected"))?;
                }

                if running == 0 {
                    break;
                }

                let res = result_rx
                    .recv()
                    .map_err(|_| io::Error::other("worker pool disconnected"))?;
                running -= 1;

                let name = res.name;
                let task = &tasks[&name];
                durations.insert(
                    name.clone(),
                    (res.finished - res.started).to_std().unwrap_or_default(),
                );

                match res.result {
                    Ok(outcome) if outcome.success() => {
                        if !task.quiet {
                            self.ctx.print_command_output(&outcome.stdout);
                        }
                        let output_fp = self.record_success(task, &outcome, res.finished, cache);
                        log.append(&ExecutionRecord {
                            task_name: name.clone(),
                            resolved_command: task.command.clone(),
                            start_time: res.started,
                            end_time: res.finished,
                            exit_code: outcome.exit_code,
                            cache_hit: false,
                            output_fingerprint: output_fp,
                        })?;
                        states.insert(name.clone(), TaskState::Succeeded);
                        self.ctx.print_task_complete(&name);
                        promote_dependents(
                            &name,
                            self.graph,
                            &mut states,
                            &mut remaining,
                            &mut ready,
                        );
                    }
                    Ok(outcome) => {
                        if !task.quiet {
                            self.ctx.print_command_output(&outcome.stdout);
                        }
                        let error = if outcome.timed_out {
                            ExecutionError::Timeout(task.timeout.unwrap_or_default()).to_string()
                        } else {
                            ExecutionError::CommandFailed(outcome.exit_code).to_string()
                        };
                        log.append(&ExecutionRecord {
                            task_name: name.clone(),
                            resolved_command: task.command.clone(),
                            start_time: res.started,
                            end_time: res.finished,
                            exit_code: outcome.exit_code,
                            cache_hit: false,
                            output_fingerprint: None,
                        })?;
                        stderrs.insert(name.clone(), outcome.stderr);
                        self.mark_failed(
                            &name,
                            error,
                            &subset,
                            &mut states,
                            &mut ready,
                            &mut errors,
                            &mut first_failed,
                            &mut halted,
                        );
                    }
                    Err(e) => {
                        log.append(&ExecutionRecord {
                            task_name: name.clone(),
                            resolved_command: task.command.clone(),
                            start_time: res.started,
                            end_time: res.finished,
                            exit_code: None,
                            cache_hit: false,
                            output_fingerprint: None,
                        })?;
                        self.mark_failed(
                            &name,
                            e.to_string(),
                            &subset,
                            &mut states,
                            &mut ready,
                            &mut errors,
                            &mut first_failed,
                            &mut halted,
                        );
                    }
                }
            }

            // Close the job channel so idle workers exit.
            drop(job_tx);
            Ok(())
        })?;

        let reports = order
            .iter()
            .map(|name| TaskReport {
                name: name.clone(),
                state: states[name],
                cache_hit: cache_hits.contains(name),
                duration: durations.get(name).copied(),
                error: errors.get(name).cloned(),
                stderr: stderrs.get(name).cloned(),
            })
            .collect();

        Ok(RunSummary {
            reports,
            first_failed,
        })
    }

    /// Fingerprint outputs and refresh the cache entry after a
    /// successful run; every cache problem downgrades to a warning
    fn record_success(
        &self,
        task: &PlannedTask,
        outcome: &CommandOutcome,
        finished: DateTime<Utc>,
        cache: &mut CacheStore,
    ) -> Option<String> {
        let output_fp = match cache::output_fingerprint(
            &task.outputs,
            &self.ctx.working_dir,
            &outcome.stdout,
        ) {
            Ok(fp) => fp,
            Err(e) => {
                self.ctx.print_warning(&format!(
                    "could not fingerprint outputs of '{}': {}",
                    task.name, e
                ));
                return None;
            }
        };

        match cache::input_fingerprint(&task.command, &task.inputs, &self.ctx.working_dir) {
            Ok(input_fp) => {
                let entry = CacheEntry {
                    input_fingerprint: input_fp,
                    output_fingerprint: output_fp.clone(),
                    outputs: task.outputs.clone(),
                    recorded_at: finished,
                };
                if let Err(e) = cache.upsert(&task.name, entry) {
                    self.ctx
                        .print_warning(&format!("could not update cache for '{}': {}", task.name, e));
                }
            }
            Err(e) => {
                self.ctx.print_warning(&format!(
                    "could not fingerprint inputs of '{}': {}",
                    task.name, e
                ));
            }
        }

        Some(output_fp)
    }

    /// Mark a task failed and poison its transitive dependents
    #[allow(clippy::too_many_arguments)]
    fn mark_failed(
        &self,
        name: &str,
        error: String,
        subset: &BTreeSet<String>,
        states: &mut BTreeMap<String, TaskState>,
        ready: &mut BTreeSet<String>,
        errors: &mut BTreeMap<String, String>,
        first_failed: &mut Option<String>,
        halted: &mut bool,
    ) {
        self.ctx.print_error(&format!("task '{}' failed: {}", name, error));
        states.insert(name.to_string(), TaskState::Failed);
        errors.insert(name.to_string(), error);
        if first_failed.is_none() {
            *first_failed = Some(name.to_string());
        }

        for dependent in self.graph.transitive_dependents(name) {
            if !subset.contains(&dependent) {
                continue;
            }
            if matches!(states[&dependent], TaskState::Pending | TaskState::Ready) {
                states.insert(dependent.clone(), TaskState::Failed);
                errors.insert(dependent.clone(), format!("dependency '{}' failed", name));
                ready.remove(&dependent);
            }
        }

        if self.options.policy == FailurePolicy::Abort {
            *halted = true;
        }
    }
}

/// Decrement dependents' outstanding-dependency counts and move newly
/// unblocked tasks to Ready
fn promote_dependents(
    name: &str,
    graph: &TaskGraph,
    states: &mut BTreeMap<String, TaskState>,
    remaining: &mut BTreeMap<String, usize>,
    ready: &mut BTreeSet<String>,
) {
    for dependent in graph.dependents_of(name) {
        if let Some(count) = remaining.get_mut(dependent) {
            *count = count.saturating_sub(1);
            if *count == 0 && states[dependent] == TaskState::Pending {
                states.insert(dependent.clone(), TaskState::Ready);
                ready.insert(dependent.clone());
            }
        }
    }
}
