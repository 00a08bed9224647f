//! Merge Orchestrator for Parallel Execution
//!
//! Folds completed task branches back into the target branch, one at a time
//! and in task order. The orchestrator is the only writer of the target branch.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::events::{ProgressEvent, ProgressReporter};
use crate::git::{GitManager, MergeOutcome};
use crate::models::{ConflictDetails, MergeResult, MergeStrategy, Task, TaskId};
use crate::parallel::worktrees::{WorktreeLease, WorktreeManager};

/// A task whose execution succeeded and whose branch is ready to merge
pub struct CompletedWork {
    pub task: Task,
    pub lease: WorktreeLease,
}

/// Summary of merging one wave
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOrchestratorResult {
    pub results: Vec<MergeResult>,
    pub merged: Vec<TaskId>,
    pub conflicts: Vec<TaskId>,
    /// A sequential merge stopped early; remaining tasks were skipped
    pub halted: bool,
}

/// Serialized merger of task branches into the target branch
pub struct MergeOrchestrator {
    repo_path: PathBuf,
    worktrees: Arc<WorktreeManager>,
    strategy: MergeStrategy,
    reporter: Arc<dyn ProgressReporter>,
}

impl MergeOrchestrator {
    pub fn new(
        repo_path: &Path,
        worktrees: Arc<WorktreeManager>,
        strategy: MergeStrategy,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            worktrees,
            strategy,
            reporter,
        }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    pub fn target_branch(&self) -> &str {
        self.worktrees.target_branch()
    }

    /// Merge every completed task of a wave. Work is processed in task-ID order;
    /// a conflict is terminal for its task and its worktree is preserved.
    pub async fn merge_all(&self, wave: usize, mut completed: Vec<CompletedWork>) -> MergeOrchestratorResult {
        completed.sort_by_key(|c| c.task.id);
        let mut summary = MergeOrchestratorResult::default();

        for work in completed {
            let task_id = work.task.id;

            if summary.halted {
                log::info!(
                    "[MergeOrchestrator] Skipping {} after earlier sequential halt",
                    task_id
                );
                work.lease.preserve();
                summary.results.push(MergeResult {
                    task_id,
                    strategy: self.strategy,
                    merged: false,
                    conflict: None,
                    commit_id: None,
                    skipped: Some("Sequential merge halted by an earlier failure".to_string()),
                    error: None,
                });
                continue;
            }

            let result = self.merge_one(wave, &work).await;

            if !result.needs_preservation() {
                summary.merged.push(task_id);
                self.finish_merged(work.lease).await;
            } else {
                if result.is_conflict() {
                    summary.conflicts.push(task_id);
                }
                work.lease.preserve();
                if self.strategy == MergeStrategy::Sequential {
                    log::warn!(
                        "[MergeOrchestrator] Sequential merge halted at {}",
                        task_id
                    );
                    summary.halted = true;
                }
            }

            summary.results.push(result);
        }

        log::info!(
            "[MergeOrchestrator] Wave {}: {} merged, {} conflicted{}",
            wave,
            summary.merged.len(),
            summary.conflicts.len(),
            if summary.halted { ", halted" } else { "" }
        );

        summary
    }

    async fn merge_one(&self, wave: usize, work: &CompletedWork) -> MergeResult {
        let task_id = work.task.id;
        let branch = work.lease.branch().to_string();

        self.reporter.report(&ProgressEvent::MergeStarted {
            wave,
            task_id,
            strategy: self.strategy,
            branch: branch.clone(),
        });

        let repo_path = self.repo_path.clone();
        let target = self.target_branch().to_string();
        let strategy = self.strategy;
        let message = format!("{}: {}", task_id, work.task.description);

        let outcome = tokio::task::spawn_blocking(move || {
            apply_strategy(&repo_path, strategy, &branch, &target, &message)
        })
        .await;

        let mut result = MergeResult {
            task_id,
            strategy: self.strategy,
            merged: false,
            conflict: None,
            commit_id: None,
            skipped: None,
            error: None,
        };

        match outcome {
            Ok(Ok(outcome)) if outcome.success => {
                log::info!(
                    "[MergeOrchestrator] Merged {} ({}): {}",
                    task_id,
                    self.strategy,
                    outcome.message
                );
                result.merged = true;
                result.commit_id = outcome.commit_id;
                self.reporter.report(&ProgressEvent::MergeCompleted {
                    wave,
                    task_id,
                    merged: true,
                    commit_id: result.commit_id.clone(),
                });
            }
            Ok(Ok(outcome)) if !outcome.conflict_files.is_empty() => {
                log::warn!(
                    "[MergeOrchestrator] Conflict merging {}: {:?}",
                    task_id,
                    outcome.conflict_files
                );
                self.reporter.report(&ProgressEvent::MergeConflict {
                    wave,
                    task_id,
                    files: outcome.conflict_files.clone(),
                    details: outcome.message.clone(),
                });
                result.conflict = Some(ConflictDetails {
                    files: outcome.conflict_files,
                    details: outcome.message,
                });
            }
            Ok(Ok(outcome)) => {
                log::error!("[MergeOrchestrator] Merge failed for {}: {}", task_id, outcome.message);
                result.error = Some(outcome.message);
            }
            Ok(Err(e)) => {
                log::error!("[MergeOrchestrator] Merge error for {}: {}", task_id, e);
                result.error = Some(e.to_string());
            }
            Err(e) => {
                log::error!("[MergeOrchestrator] Merge task for {} aborted: {}", task_id, e);
                result.error = Some(e.to_string());
            }
        }

        if !result.merged {
            self.reporter.report(&ProgressEvent::MergeCompleted {
                wave,
                task_id,
                merged: false,
                commit_id: None,
            });
        }

        result
    }

    async fn finish_merged(&self, lease: WorktreeLease) {
        if !self.worktrees.cleanup_enabled() {
            lease.preserve();
            return;
        }
        let task_id = lease.task_id();
        let released = tokio::task::spawn_blocking(move || lease.release()).await;
        match released {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!(
                "[MergeOrchestrator] Merged {} but failed to clean its worktree: {}",
                task_id,
                e
            ),
            Err(e) => log::warn!("[MergeOrchestrator] Cleanup of {} did not finish: {}", task_id, e),
        }
    }
}

fn apply_strategy(
    repo_path: &Path,
    strategy: MergeStrategy,
    branch: &str,
    target: &str,
    message: &str,
) -> Result<MergeOutcome, git2::Error> {
    let git = GitManager::new(repo_path)?;
    match strategy {
        MergeStrategy::Sequential => git.merge_branch(branch, target),
        MergeStrategy::Squash => git.squash_branch(branch, target, message),
        MergeStrategy::Rebase => git.rebase_branch(branch, target),
    }
}
