// Bounded concurrent execution of one wave of tasks, one worktree and one process per task

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{EngineError, EngineResult};
use crate::events::{ProgressEvent, ProgressReporter};
use crate::git::GitManager;
use crate::models::{ExecutionResult, Task, TaskId, WorktreeStatus};
use crate::parallel::worktrees::{WorktreeLease, WorktreeManager};
use crate::utils::tail_output;

/// Captured stdout/stderr kept per task
const MAX_CAPTURED_BYTES: usize = 16 * 1024;

/// Program and arguments run for every task. Arguments may contain the
/// placeholders `{task_id}`, `{description}`, `{worktree}` and `{branch}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl TaskCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from `[program, args...]`
    pub fn from_argv(argv: &[String]) -> EngineResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| EngineError::Config("task command is empty".to_string()))?;
        Ok(Self::new(program.clone(), args.to_vec()))
    }

    /// Split a command line on whitespace, honouring single and double quotes
    pub fn parse(command_line: &str) -> EngineResult<Self> {
        let mut argv = Vec::new();
        let mut current = String::new();
        let mut quote: Option<char> = None;
        let mut in_word = false;

        for c in command_line.chars() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), c) => current.push(c),
                (None, '\'' | '"') => {
                    quote = Some(c);
                    in_word = true;
                }
                (None, c) if c.is_whitespace() => {
                    if in_word {
                        argv.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                (None, c) => {
                    current.push(c);
                    in_word = true;
                }
            }
        }

        if quote.is_some() {
            return Err(EngineError::Config(format!(
                "unterminated quote in task command: {}",
                command_line
            )));
        }
        if in_word {
            argv.push(current);
        }

        Self::from_argv(&argv)
    }

    /// Resolve the program on PATH (or as a path)
    pub fn check_available(&self) -> EngineResult<PathBuf> {
        which::which(&self.program).map_err(|e| {
            EngineError::CommandUnavailable(format!("'{}': {}", self.program, e))
        })
    }

    /// Arguments with placeholders substituted for one task
    pub fn render_args(&self, task: &Task, worktree: &std::path::Path, branch: &str) -> Vec<String> {
        let worktree = worktree.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{task_id}", &task.id.get().to_string())
                    .replace("{description}", &task.description)
                    .replace("{worktree}", &worktree)
                    .replace("{branch}", branch)
            })
            .collect()
    }
}

/// Execution result plus ownership of the task's worktree, if one was created
pub struct TaskExecution {
    pub result: ExecutionResult,
    pub lease: Option<WorktreeLease>,
}

/// Runs a wave of tasks concurrently, bounded by a semaphore
pub struct ParallelExecutor {
    worktrees: Arc<WorktreeManager>,
    command: TaskCommand,
    timeout: Duration,
    reporter: Arc<dyn ProgressReporter>,
}

impl ParallelExecutor {
    pub fn new(
        worktrees: Arc<WorktreeManager>,
        command: TaskCommand,
        timeout: Duration,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            worktrees,
            command,
            timeout,
            reporter,
        }
    }

    /// Execute `tasks` with at most `concurrency` running at once.
    /// Results come back in task-ID order regardless of completion order.
    pub async fn execute(&self, wave: usize, tasks: &[Task], concurrency: usize) -> Vec<TaskExecution> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut join_set: JoinSet<TaskExecution> = JoinSet::new();
        let mut pending: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();

        log::info!(
            "[ParallelExecutor] Wave {}: running {} task(s) with concurrency {}",
            wave,
            tasks.len(),
            concurrency.max(1)
        );

        for task in tasks {
            let semaphore = Arc::clone(&semaphore);
            let worktrees = Arc::clone(&self.worktrees);
            let reporter = Arc::clone(&self.reporter);
            let command = self.command.clone();
            let timeout = self.timeout;
            let task = task.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return TaskExecution {
                            result: ExecutionResult::failed(task.id, format!("Scheduler closed: {}", e)),
                            lease: None,
                        }
                    }
                };
                run_task(wave, task, worktrees, command, timeout, reporter).await
            });
        }

        let mut executions = Vec::with_capacity(tasks.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(execution) => {
                    pending.retain(|id| *id != execution.result.task_id);
                    executions.push(execution);
                }
                Err(e) => log::error!("[ParallelExecutor] Task panicked or was cancelled: {}", e),
            }
        }

        // A panicked task still gets a terminal result; its lease was dropped during unwinding
        for task_id in pending {
            executions.push(TaskExecution {
                result: ExecutionResult::failed(task_id, "Task execution aborted unexpectedly"),
                lease: None,
            });
        }

        executions.sort_by_key(|e| e.result.task_id);
        executions
    }
}

async fn run_task(
    wave: usize,
    task: Task,
    worktrees: Arc<WorktreeManager>,
    command: TaskCommand,
    timeout: Duration,
    reporter: Arc<dyn ProgressReporter>,
) -> TaskExecution {
    let started = Instant::now();
    reporter.report(&ProgressEvent::TaskStarted {
        wave,
        task_id: task.id,
        description: task.description.clone(),
    });

    let acquire_task = task.clone();
    let mut lease = match tokio::task::spawn_blocking(move || WorktreeLease::acquire(&worktrees, &acquire_task)).await {
        Ok(Ok(lease)) => lease,
        Ok(Err(e)) => return finish(wave, failed_after(task.id, started, e.to_string()), None, &reporter),
        Err(e) => return finish(wave, failed_after(task.id, started, e.to_string()), None, &reporter),
    };

    let mut result = run_process(&task, &lease, &command, timeout, started).await;

    if result.success {
        if let Err(e) = commit_task_changes(&task, &lease).await {
            result.success = false;
            result.error = Some(format!("Failed to commit task changes: {}", e));
        }
    }

    lease.mark(if result.success {
        WorktreeStatus::Completed
    } else {
        WorktreeStatus::Failed
    });

    finish(wave, result, Some(lease), &reporter)
}

async fn run_process(
    task: &Task,
    lease: &WorktreeLease,
    command: &TaskCommand,
    timeout: Duration,
    started: Instant,
) -> ExecutionResult {
    let args = command.render_args(task, lease.path(), lease.branch());

    let mut cmd = Command::new(&command.program);
    cmd.args(&args)
        .current_dir(lease.path())
        .env("PARALLEL_TASK_ID", task.id.get().to_string())
        .env("PARALLEL_TASK_DESCRIPTION", &task.description)
        .env("PARALLEL_TASK_BRANCH", lease.branch())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group, so a timeout can take down everything the command started
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            return failed_after(
                task.id,
                started,
                format!("Failed to spawn '{}': {}", command.program, e),
            )
        }
    };

    let pid = child.id();
    let outcome = tokio::time::timeout(timeout, child.wait_with_output()).await;

    // Background processes left behind must not touch the worktree after this point
    if let Some(pid) = pid {
        kill_process_group(pid);
    }

    match outcome {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let success = output.status.success();
            let exit_code = output.status.code();

            let error = if success {
                None
            } else if stderr.trim().is_empty() {
                Some(match exit_code {
                    Some(code) => format!("Task command exited with code {}", code),
                    None => "Task command terminated by signal".to_string(),
                })
            } else {
                Some(tail_output(stderr.trim(), MAX_CAPTURED_BYTES))
            };

            ExecutionResult {
                task_id: task.id,
                success,
                output: (!stdout.trim().is_empty()).then(|| tail_output(stdout.trim(), MAX_CAPTURED_BYTES)),
                error,
                exit_code,
                timed_out: false,
                duration_ms: elapsed_ms(started),
            }
        }
        Ok(Err(e)) => failed_after(task.id, started, format!("Failed to wait for task command: {}", e)),
        Err(_) => {
            log::warn!(
                "[ParallelExecutor] {} timed out after {}s, process killed",
                task.id,
                timeout.as_secs()
            );
            ExecutionResult {
                task_id: task.id,
                success: false,
                output: None,
                error: Some(format!("Timed out after {} seconds", timeout.as_secs())),
                exit_code: None,
                timed_out: true,
                duration_ms: elapsed_ms(started),
            }
        }
    }
}

/// SIGKILL every process in the group led by `pid`
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group already exited
        if err.raw_os_error() != Some(libc::ESRCH) {
            log::warn!("[ParallelExecutor] Failed to kill process group {}: {}", pid, err);
        }
    }
}

/// Without process groups only the direct child is killed, on drop
#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Commit whatever the task left in its worktree onto the task branch
async fn commit_task_changes(task: &Task, lease: &WorktreeLease) -> EngineResult<Option<String>> {
    let path = lease.path().to_path_buf();
    let message = format!("{}: {}", task.id, task.description);

    let commit = tokio::task::spawn_blocking(move || {
        let git = GitManager::new(&path)?;
        Ok::<_, EngineError>(git.commit_all_changes(&message)?)
    })
    .await??;

    match &commit {
        Some(id) => log::debug!("[ParallelExecutor] {} committed {}", task.id, &id[..id.len().min(8)]),
        None => log::debug!("[ParallelExecutor] {} left no changes", task.id),
    }
    Ok(commit)
}

fn finish(
    wave: usize,
    result: ExecutionResult,
    lease: Option<WorktreeLease>,
    reporter: &Arc<dyn ProgressReporter>,
) -> TaskExecution {
    if result.success {
        log::info!("[ParallelExecutor] {} succeeded in {}ms", result.task_id, result.duration_ms);
    } else {
        log::warn!(
            "[ParallelExecutor] {} failed: {}",
            result.task_id,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    reporter.report(&ProgressEvent::TaskCompleted {
        wave,
        task_id: result.task_id,
        success: result.success,
        timed_out: result.timed_out,
        duration_ms: result.duration_ms,
        error: result.error.clone(),
    });

    TaskExecution { result, lease }
}

fn failed_after(task_id: TaskId, started: Instant, error: String) -> ExecutionResult {
    ExecutionResult {
        duration_ms: elapsed_ms(started),
        ..ExecutionResult::failed(task_id, error)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
