//! Worktree Manager for Parallel Execution
//!
//! Every task runs in its own git worktree on a fresh branch cut from the
//! target branch at the moment the worktree is created. Worktrees live outside
//! the main working tree, which is never written during execution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{EngineError, EngineResult};
use crate::git::GitManager;
use crate::models::{Task, TaskId, WorktreeInfo, WorktreeStatus};
use crate::utils::{lock_mutex_recover, sanitize_path_component, slugify};

/// Prefix of every branch the engine creates
pub const BRANCH_PREFIX: &str = "parallel/";

/// Creates and destroys per-task worktrees
pub struct WorktreeManager {
    /// Path to the main repository
    repo_path: PathBuf,
    /// Identifier of the current run, part of branch names and paths
    run_id: String,
    /// Directory holding this run's worktrees
    run_root: PathBuf,
    /// Branch new worktrees start from
    target_branch: String,
    /// Whether dropped leases remove their worktree
    cleanup_enabled: bool,
    /// Worktrees of this run by task
    worktrees: Mutex<HashMap<TaskId, WorktreeInfo>>,
    /// Serializes git operations on the main repository
    git_lock: Mutex<()>,
}

impl WorktreeManager {
    pub fn new(
        repo_path: &Path,
        worktree_root: &Path,
        run_id: &str,
        target_branch: &str,
        cleanup_enabled: bool,
    ) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            run_id: run_id.to_string(),
            run_root: worktree_root.join(sanitize_path_component(run_id)),
            target_branch: target_branch.to_string(),
            cleanup_enabled,
            worktrees: Mutex::new(HashMap::new()),
            git_lock: Mutex::new(()),
        }
    }

    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    pub fn cleanup_enabled(&self) -> bool {
        self.cleanup_enabled
    }

    /// Branch name for a task: `parallel/<run>/task-<n>-<slug>`
    pub fn branch_name(&self, task: &Task) -> String {
        format!(
            "{}{}/task-{}-{}",
            BRANCH_PREFIX,
            self.run_id,
            task.id.get(),
            slugify(&task.description, 40)
        )
    }

    fn worktree_path(&self, task: &Task) -> PathBuf {
        self.run_root.join(format!("task-{}", task.id.get()))
    }

    fn open_repo(&self, task_id: TaskId) -> EngineResult<GitManager> {
        GitManager::new(&self.repo_path).map_err(|e| EngineError::Worktree {
            task_id,
            message: format!("Failed to open git repository: {}", e.message()),
        })
    }

    /// Create a worktree for `task` on a fresh branch from the current target tip
    pub fn create(&self, task: &Task) -> EngineResult<WorktreeInfo> {
        let branch = self.branch_name(task);
        let path = self.worktree_path(task);

        self.set_info(WorktreeInfo {
            path: path.clone(),
            branch: branch.clone(),
            task_id: task.id,
            status: WorktreeStatus::Creating,
        });

        match self.create_locked(task, &branch, &path) {
            Ok(base) => {
                log::info!(
                    "[WorktreeManager] Created worktree for {} at {:?} on branch {} (base {})",
                    task.id,
                    path,
                    branch,
                    &base[..base.len().min(8)]
                );
                Ok(self.mark_status(task.id, WorktreeStatus::Active).unwrap_or(WorktreeInfo {
                    path,
                    branch,
                    task_id: task.id,
                    status: WorktreeStatus::Active,
                }))
            }
            Err(e) => {
                log::warn!("[WorktreeManager] Failed to create worktree for {}: {}", task.id, e);
                self.mark_status(task.id, WorktreeStatus::Failed);
                Err(e)
            }
        }
    }

    fn create_locked(&self, task: &Task, branch: &str, path: &Path) -> EngineResult<String> {
        let _guard = lock_mutex_recover(&self.git_lock);
        let git = self.open_repo(task.id)?;

        let base = git
            .branch_tip(&self.target_branch)
            .map_err(|e| EngineError::Worktree {
                task_id: task.id,
                message: format!(
                    "Target branch '{}' not found: {}",
                    self.target_branch,
                    e.message()
                ),
            })?;

        std::fs::create_dir_all(&self.run_root)?;

        // Leftovers of an interrupted attempt with the same name
        if path.exists() {
            log::warn!("[WorktreeManager] Removing stale worktree at {:?}", path);
            if !git.remove_worktree(path)? && path.exists() {
                std::fs::remove_dir_all(path)?;
            }
        }
        if git.branch_exists(branch) {
            log::debug!("[WorktreeManager] Deleting stale branch {}", branch);
            git.delete_branch(branch)?;
        }

        let name = format!("{}-task-{}", self.run_id, task.id.get());
        git.create_worktree(&name, branch, path, &base)
            .map_err(|e| EngineError::Worktree {
                task_id: task.id,
                message: format!("Failed to create worktree: {}", e.message()),
            })?;

        Ok(base)
    }

    /// Remove the worktree registration, its directory and its branch.
    /// Safe to call more than once.
    pub fn cleanup(&self, info: &WorktreeInfo) -> EngineResult<()> {
        {
            let _guard = lock_mutex_recover(&self.git_lock);
            let git = self.open_repo(info.task_id)?;

            if !git.remove_worktree(&info.path)? && info.path.exists() {
                std::fs::remove_dir_all(&info.path)?;
            }
            if git.branch_exists(&info.branch) {
                git.delete_branch(&info.branch)?;
            }
        }

        self.mark_status(info.task_id, WorktreeStatus::Cleaned);
        log::info!(
            "[WorktreeManager] Cleaned worktree for {} at {:?}",
            info.task_id,
            info.path
        );
        Ok(())
    }

    /// Update the status of a task's worktree, returning the updated info
    pub fn mark_status(&self, task_id: TaskId, status: WorktreeStatus) -> Option<WorktreeInfo> {
        let mut worktrees = lock_mutex_recover(&self.worktrees);
        let info = worktrees.get_mut(&task_id)?;
        info.status = status;
        Some(info.clone())
    }

    pub fn get(&self, task_id: TaskId) -> Option<WorktreeInfo> {
        lock_mutex_recover(&self.worktrees).get(&task_id).cloned()
    }

    /// All worktrees of this run, in task order
    pub fn all(&self) -> Vec<WorktreeInfo> {
        let mut all: Vec<WorktreeInfo> = lock_mutex_recover(&self.worktrees).values().cloned().collect();
        all.sort_by_key(|info| info.task_id);
        all
    }

    fn set_info(&self, info: WorktreeInfo) {
        lock_mutex_recover(&self.worktrees).insert(info.task_id, info);
    }

    /// Crash recovery: prune registrations whose directories are gone and delete
    /// engine branches that are fully merged and no longer checked out anywhere.
    /// Unmerged branches are kept; they may hold work awaiting manual resolution.
    pub fn recover(&self) -> EngineResult<usize> {
        let _guard = lock_mutex_recover(&self.git_lock);
        let git = GitManager::new(&self.repo_path)?;

        let mut removed = git.prune_orphaned_worktrees()? as usize;

        let checked_out: Vec<String> = git
            .list_worktrees()?
            .into_iter()
            .filter_map(|wt| wt.branch)
            .collect();

        for branch in git.list_branches()? {
            if !branch.name.starts_with(BRANCH_PREFIX) || checked_out.contains(&branch.name) {
                continue;
            }
            match git.is_merged_into(&branch.name, &self.target_branch) {
                Ok(true) => {
                    git.delete_branch(&branch.name)?;
                    removed += 1;
                    log::info!("[WorktreeManager] Deleted merged leftover branch {}", branch.name);
                }
                Ok(false) => {
                    log::debug!("[WorktreeManager] Keeping unmerged branch {}", branch.name)
                }
                Err(e) => log::warn!(
                    "[WorktreeManager] Could not inspect branch {}: {}",
                    branch.name,
                    e
                ),
            }
        }

        Ok(removed)
    }
}

/// Scoped ownership of a task worktree. Dropping an armed lease cleans the
/// worktree up (unless cleanup is disabled for the run); `preserve` disarms it.
pub struct WorktreeLease {
    manager: Arc<WorktreeManager>,
    info: WorktreeInfo,
    armed: bool,
}

impl WorktreeLease {
    /// Create the task's worktree and take ownership of it
    pub fn acquire(manager: &Arc<WorktreeManager>, task: &Task) -> EngineResult<Self> {
        let info = manager.create(task)?;
        Ok(Self {
            manager: Arc::clone(manager),
            info,
            armed: true,
        })
    }

    pub fn info(&self) -> &WorktreeInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    pub fn branch(&self) -> &str {
        &self.info.branch
    }

    pub fn task_id(&self) -> TaskId {
        self.info.task_id
    }

    pub fn mark(&mut self, status: WorktreeStatus) {
        if let Some(info) = self.manager.mark_status(self.info.task_id, status) {
            self.info = info;
        }
    }

    /// Keep the worktree and branch on disk
    pub fn preserve(mut self) -> WorktreeInfo {
        self.armed = false;
        log::info!(
            "[WorktreeManager] Preserving worktree for {} at {:?} (branch {})",
            self.info.task_id,
            self.info.path,
            self.info.branch
        );
        self.info.clone()
    }

    /// Clean up now, reporting errors instead of logging them
    pub fn release(mut self) -> EngineResult<()> {
        self.armed = false;
        self.manager.cleanup(&self.info)
    }
}

/// Drop leases on the blocking pool; armed ones remove their worktrees
pub async fn discard_leases(leases: Vec<WorktreeLease>) {
    if leases.is_empty() {
        return;
    }
    if let Err(e) = tokio::task::spawn_blocking(move || drop(leases)).await {
        log::warn!("[WorktreeManager] Worktree cleanup task failed: {}", e);
    }
}

impl Drop for WorktreeLease {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if !self.manager.cleanup_enabled() {
            log::info!(
                "[WorktreeManager] Cleanup disabled, keeping worktree for {} at {:?}",
                self.info.task_id,
                self.info.path
            );
            return;
        }
        if let Err(e) = self.manager.cleanup(&self.info) {
            log::warn!(
                "[WorktreeManager] Failed to clean worktree for {}: {}",
                self.info.task_id,
                e
            );
        }
    }
}
