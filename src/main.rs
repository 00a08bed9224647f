use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parallel_engine::config::{load_merged_config, PartialConfig, PartialExecutionConfig};
use parallel_engine::parallel::TaskCommand;
use parallel_engine::{LogReporter, MergeStrategy, ParallelEngine};

/// Run a batch of development tasks in parallel git worktrees and merge the results
#[derive(Parser, Debug)]
#[command(name = "parallel-engine")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Task descriptions, one per argument
    tasks: Vec<String>,

    /// Repository to operate on
    #[arg(short = 'C', long, default_value = ".")]
    repo: PathBuf,

    /// Read task descriptions from a file, one per line ('#' starts a comment)
    #[arg(long)]
    tasks_file: Option<PathBuf>,

    /// Maximum tasks running at once
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Per-task timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Merge strategy: sequential, squash or rebase
    #[arg(long)]
    strategy: Option<MergeStrategy>,

    /// Plan waves and sample resources without executing anything
    #[arg(long)]
    dry_run: bool,

    /// Keep worktrees and branches after the run
    #[arg(long)]
    no_cleanup: bool,

    /// Command run in each worktree, e.g. "my-agent --task {description}"
    #[arg(long, env = "PARALLEL_ENGINE_COMMAND")]
    command: Option<String>,

    /// Branch to merge into (defaults to the current branch)
    #[arg(long)]
    target_branch: Option<String>,

    /// Directory for task worktrees (defaults to <repo>.worktrees)
    #[arg(long)]
    worktree_root: Option<PathBuf>,
}

impl Cli {
    /// Flags given on the command line, as the highest-priority config layer
    fn overrides(&self) -> Result<PartialConfig> {
        let command = match &self.command {
            Some(line) => {
                let command = TaskCommand::parse(line)?;
                let mut argv = vec![command.program];
                argv.extend(command.args);
                Some(argv)
            }
            None => None,
        };

        Ok(PartialConfig {
            execution: Some(PartialExecutionConfig {
                max_parallel: self.max_parallel,
                timeout_seconds: self.timeout,
                strategy: self.strategy,
                dry_run: self.dry_run.then_some(true),
                cleanup: self.no_cleanup.then_some(false),
                command,
                target_branch: self.target_branch.clone(),
                worktree_root: self.worktree_root.clone(),
            }),
            ..Default::default()
        })
    }

    fn task_descriptions(&self) -> Result<Vec<String>> {
        let mut descriptions = self.tasks.clone();
        if let Some(path) = &self.tasks_file {
            descriptions.extend(read_tasks_file(path)?);
        }
        Ok(descriptions)
    }
}

fn read_tasks_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tasks file '{}'", path.display()))?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.trim_start_matches("- ").to_string())
        .collect())
}

fn run(cli: Cli) -> Result<bool> {
    let descriptions = cli.task_descriptions()?;
    if descriptions.is_empty() {
        return Err(anyhow!("No tasks given; pass descriptions or --tasks-file"));
    }

    let config = load_merged_config(Some(&cli.repo), Some(cli.overrides()?))?;
    let engine = ParallelEngine::new(&cli.repo, config)?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let report = rt.block_on(engine.run(&descriptions, Arc::new(LogReporter)))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.overall_success)
}

fn main() {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}
