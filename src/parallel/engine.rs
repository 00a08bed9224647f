//! Parallel Engine
//!
//! Plans a batch of task descriptions into waves and runs them: every wave is
//! gated by the resource monitor, executed in isolated worktrees and merged
//! back before the next wave starts.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::{FilePredictor, RepoSnapshot, TaskAnalysis, TaskAnalyzer};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{ProgressEvent, ProgressReporter};
use crate::git::GitManager;
use crate::models::{
    ExecutionResult, FilePrediction, MergeResult, OverlapResult, Severity, Task, TaskId,
};
use crate::parallel::executor::{ParallelExecutor, TaskCommand};
use crate::parallel::merge::{CompletedWork, MergeOrchestrator};
use crate::parallel::overlap::OverlapDetector;
use crate::parallel::resources::{ResourceMonitor, ResourceProbe, ResourceStatus, SystemProbe};
use crate::parallel::worktrees::{discard_leases, WorktreeManager};
use crate::utils::{default_worktree_root, generate_run_id};

/// Prediction whose confidence fell below the configured threshold
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanWarning {
    pub task_id: TaskId,
    pub confidence: f64,
    pub message: String,
}

/// A group of tasks scheduled to run together
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedWave {
    /// 1-based wave number
    pub wave: usize,
    /// Dependency layer the wave belongs to
    pub level: usize,
    pub task_ids: Vec<TaskId>,
    pub files: BTreeSet<String>,
}

/// Everything decided before any worktree is created
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPlan {
    pub tasks: Vec<Task>,
    pub analysis: TaskAnalysis,
    pub predictions: Vec<FilePrediction>,
    pub overlap: OverlapResult,
    pub warnings: Vec<PlanWarning>,
    pub waves: Vec<PlannedWave>,
}

/// Execution and merge outcome of one wave
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveReport {
    pub wave: usize,
    pub tasks: Vec<TaskId>,
    pub resource_status: ResourceStatus,
    pub execution_results: Vec<ExecutionResult>,
    pub merge_results: Vec<MergeResult>,
    /// A sequential merge stopped early in this wave
    pub halted: bool,
}

/// Final result of a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub target_branch: String,
    pub dry_run: bool,
    pub plan: RunPlan,
    /// Status sampled for the first wave
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_status: Option<ResourceStatus>,
    pub waves: Vec<WaveReport>,
    pub overall_success: bool,
}

/// Entry point tying analysis, scheduling, execution and merging together
pub struct ParallelEngine {
    repo_path: PathBuf,
    config: EngineConfig,
    analyzer: TaskAnalyzer,
    detector: OverlapDetector,
    probe: Arc<dyn ResourceProbe>,
}

impl ParallelEngine {
    /// Open the repository whose working tree is at `repo_path`
    pub fn new(repo_path: &Path, config: EngineConfig) -> EngineResult<Self> {
        let git = GitManager::new(repo_path)?;
        let workdir = git.workdir().ok_or_else(|| {
            EngineError::Config(format!("{} is a bare repository", repo_path.display()))
        })?;

        Ok(Self {
            repo_path: workdir,
            config,
            analyzer: TaskAnalyzer::new(),
            detector: OverlapDetector::new(),
            probe: Arc::new(SystemProbe::new()),
        })
    }

    /// Replace the host sampler
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the overlap detector (e.g. with another grouping strategy)
    pub fn with_overlap_detector(mut self, detector: OverlapDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn worktree_root(&self) -> PathBuf {
        self.config
            .execution
            .worktree_root
            .clone()
            .unwrap_or_else(|| default_worktree_root(&self.repo_path))
    }

    fn target_branch(&self) -> EngineResult<String> {
        let git = GitManager::new(&self.repo_path)?;
        let branch = match &self.config.execution.target_branch {
            Some(branch) => branch.clone(),
            None => git.get_current_branch()?.name,
        };
        if !git.branch_exists(&branch) {
            return Err(EngineError::Config(format!(
                "target branch '{}' does not exist",
                branch
            )));
        }
        Ok(branch)
    }

    /// Analyze, predict and partition the tasks into waves without touching the repository
    pub fn plan<S: AsRef<str>>(&self, descriptions: &[S]) -> RunPlan {
        let tasks = self.analyzer.parse_task_descriptions(descriptions);
        let outcome = self.analyzer.analyze(&tasks);

        let snapshot = RepoSnapshot::scan(&self.repo_path, &[self.worktree_root()]);
        let predictions = FilePredictor::new(snapshot).predict_all(&tasks);
        let overlap = self.detector.detect(&predictions);

        let threshold = self.config.prediction.low_confidence_threshold;
        let warnings: Vec<PlanWarning> = predictions
            .iter()
            .filter(|p| p.confidence < threshold)
            .map(|p| PlanWarning {
                task_id: p.task_id,
                confidence: p.confidence,
                message: if p.predicted_files.is_empty() {
                    "No files predicted; overlap with other tasks cannot be ruled out".to_string()
                } else {
                    format!(
                        "Low prediction confidence {:.2} (method {})",
                        p.confidence, p.method
                    )
                },
            })
            .collect();

        for warning in &warnings {
            log::warn!("[ParallelEngine] {}: {}", warning.task_id, warning.message);
        }

        let by_id: BTreeMap<TaskId, &FilePrediction> =
            predictions.iter().map(|p| (p.task_id, p)).collect();

        // Overlap is partitioned within each dependency layer so a wave never
        // holds a task together with one of its dependencies
        let mut waves = Vec::new();
        for (level, layer) in outcome.analysis.levels.iter().enumerate() {
            let layer_predictions: Vec<FilePrediction> = layer
                .iter()
                .filter_map(|id| by_id.get(id).map(|p| (*p).clone()))
                .collect();

            for group in self.detector.detect(&layer_predictions).safe_groups {
                waves.push(PlannedWave {
                    wave: waves.len() + 1,
                    level,
                    task_ids: group.task_ids,
                    files: group.files,
                });
            }
        }

        log::info!(
            "[ParallelEngine] Planned {} tasks into {} waves ({} dependency levels, {} critical overlaps)",
            tasks.len(),
            waves.len(),
            outcome.analysis.levels.len(),
            overlap.task_pairs.iter().filter(|p| p.severity == Severity::Critical).count()
        );

        RunPlan {
            tasks,
            analysis: outcome.analysis,
            predictions,
            overlap,
            warnings,
            waves,
        }
    }

    /// Plan and execute every wave, merging results back between waves
    pub async fn run<S: AsRef<str>>(
        &self,
        descriptions: &[S],
        reporter: Arc<dyn ProgressReporter>,
    ) -> EngineResult<RunReport> {
        let run_id = generate_run_id();
        let target_branch = self.target_branch()?;
        let plan = self.plan(descriptions);
        let execution = &self.config.execution;

        let monitor = Arc::new(ResourceMonitor::new(
            &self.repo_path,
            execution.max_parallel,
            self.config.resources.clone(),
            Arc::clone(&self.probe),
        ));

        if execution.dry_run {
            let first_wave = plan.waves.first().map(|w| w.task_ids.len()).unwrap_or(1);
            log::info!("[ParallelEngine] Dry run {}: nothing executed", run_id);
            return Ok(RunReport {
                run_id,
                target_branch,
                dry_run: true,
                resource_status: Some(sample_resources(&monitor, first_wave).await?),
                plan,
                waves: Vec::new(),
                overall_success: true,
            });
        }

        if plan.waves.is_empty() {
            return Ok(RunReport {
                run_id,
                target_branch,
                dry_run: false,
                resource_status: None,
                plan,
                waves: Vec::new(),
                overall_success: true,
            });
        }

        if execution.command.is_empty() {
            return Err(EngineError::Config(
                "no task command configured (execution.command)".to_string(),
            ));
        }
        let command = TaskCommand::from_argv(&execution.command)?;
        command.check_available()?;

        let worktree_root = self.worktree_root();
        let worktrees = Arc::new(WorktreeManager::new(
            &self.repo_path,
            &worktree_root,
            &run_id,
            &target_branch,
            execution.cleanup,
        ));
        match worktrees.recover() {
            Ok(0) => {}
            Ok(n) => log::info!("[ParallelEngine] Recovered {} stale worktree leftovers", n),
            Err(e) => log::warn!("[ParallelEngine] Worktree recovery failed: {}", e),
        }

        let executor = ParallelExecutor::new(
            Arc::clone(&worktrees),
            command,
            Duration::from_secs(execution.timeout_seconds),
            Arc::clone(&reporter),
        );
        let merger = MergeOrchestrator::new(
            &self.repo_path,
            Arc::clone(&worktrees),
            execution.strategy,
            Arc::clone(&reporter),
        );

        log::info!(
            "[ParallelEngine] Run {}: {} tasks in {} waves onto {} ({})",
            run_id,
            plan.tasks.len(),
            plan.waves.len(),
            target_branch,
            execution.strategy
        );

        let tasks: BTreeMap<TaskId, &Task> = plan.tasks.iter().map(|t| (t.id, t)).collect();
        let mut merged: HashSet<TaskId> = HashSet::new();
        let mut wave_reports = Vec::with_capacity(plan.waves.len());

        for planned in &plan.waves {
            let wave = planned.wave;
            let mut execution_results = Vec::new();
            let mut runnable = Vec::new();

            for id in &planned.task_ids {
                let Some(task) = tasks.get(id) else { continue };
                match task.depends_on.iter().find(|dep| !merged.contains(*dep)) {
                    Some(missing) => {
                        log::warn!("[ParallelEngine] {} not run: {} was not merged", id, missing);
                        execution_results.push(ExecutionResult::failed(
                            *id,
                            format!("Dependency {} was not merged", missing),
                        ));
                    }
                    None => runnable.push((*task).clone()),
                }
            }

            let resource_status = sample_resources(&monitor, runnable.len().max(1)).await?;
            let concurrency = resource_status.overall.recommended_concurrency;
            if !resource_status.overall.can_parallelize && runnable.len() > 1 {
                reporter.report(&ProgressEvent::ResourceFallback {
                    wave,
                    reason: resource_status
                        .overall
                        .reason
                        .clone()
                        .unwrap_or_else(|| "limited host resources".to_string()),
                });
            }

            reporter.report(&ProgressEvent::WaveStarted {
                wave,
                task_ids: runnable.iter().map(|t| t.id).collect(),
                concurrency,
            });

            let mut completed = Vec::new();
            let mut abandoned = Vec::new();
            for task_execution in executor.execute(wave, &runnable, concurrency).await {
                let result = task_execution.result;
                match (task_execution.lease, tasks.get(&result.task_id)) {
                    (Some(lease), Some(task)) if result.success => completed.push(CompletedWork {
                        task: (*task).clone(),
                        lease,
                    }),
                    (Some(lease), _) => abandoned.push(lease),
                    (None, _) => {}
                }
                execution_results.push(result);
            }
            execution_results.sort_by_key(|r| r.task_id);
            discard_leases(abandoned).await;

            let merge_summary = merger.merge_all(wave, completed).await;
            merged.extend(merge_summary.merged.iter().copied());

            let succeeded = execution_results.iter().filter(|r| r.success).count();
            reporter.report(&ProgressEvent::WaveComplete {
                wave,
                succeeded,
                failed: execution_results.len() - succeeded,
                merged: merge_summary.merged.len(),
            });

            wave_reports.push(WaveReport {
                wave,
                tasks: planned.task_ids.clone(),
                resource_status,
                execution_results,
                merge_results: merge_summary.results,
                halted: merge_summary.halted,
            });
        }

        remove_if_empty(worktrees.run_root());
        remove_if_empty(&worktree_root);

        let overall_success = plan.tasks.iter().all(|t| merged.contains(&t.id));
        log::info!(
            "[ParallelEngine] Run {} finished: {}/{} tasks merged",
            run_id,
            merged.len(),
            plan.tasks.len()
        );

        Ok(RunReport {
            run_id,
            target_branch,
            dry_run: false,
            resource_status: wave_reports.first().map(|w| w.resource_status.clone()),
            plan,
            waves: wave_reports,
            overall_success,
        })
    }
}

/// Sample host resources off the async worker threads
async fn sample_resources(monitor: &Arc<ResourceMonitor>, wave_size: usize) -> EngineResult<ResourceStatus> {
    let monitor = Arc::clone(monitor);
    Ok(tokio::task::spawn_blocking(move || monitor.get_status(wave_size)).await?)
}

fn remove_if_empty(dir: &Path) {
    let is_empty = std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if is_empty {
        let _ = std::fs::remove_dir(dir);
    }
}
