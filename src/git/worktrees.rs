//! Worktree management for GitManager
//!
//! Contains methods for creating, listing, removing and pruning worktrees

use git2::{BranchType, Error as GitError, Repository, Worktree, WorktreeAddOptions, WorktreePruneOptions};
use std::path::Path;

use crate::git::types::GitWorktree;
use crate::git::GitManager;

impl GitManager {
    /// Create a worktree at `path` checked out on a fresh `branch` starting at `base_commit`
    pub fn create_worktree(
        &self,
        name: &str,
        branch: &str,
        path: &Path,
        base_commit: &str,
    ) -> Result<GitWorktree, GitError> {
        self.create_branch_from_commit(branch, base_commit, false)?;
        let branch_ref = self.repo.find_branch(branch, BranchType::Local)?;

        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(branch_ref.get()));

        // Worktree names must not contain '/', or libgit2 nests them under .git/worktrees/
        let worktree_name = name.replace('/', "-");

        let worktree = match self.repo.worktree(&worktree_name, path, Some(&opts)) {
            Ok(worktree) => worktree,
            Err(e) => {
                // Leave no dangling branch behind a failed add
                if let Err(del) = self.delete_branch(branch) {
                    log::debug!("[Git] Could not delete branch {} after failed add: {}", branch, del);
                }
                return Err(e);
            }
        };

        self.worktree_to_info(&worktree)
    }

    /// List all worktrees
    pub fn list_worktrees(&self) -> Result<Vec<GitWorktree>, GitError> {
        let worktrees = self.repo.worktrees()?;

        let mut result = Vec::new();
        for name in worktrees.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                result.push(self.worktree_to_info(&worktree)?);
            }
        }

        Ok(result)
    }

    /// Remove a worktree by path, deleting its working directory.
    /// Returns false when no worktree is registered at that path.
    pub fn remove_worktree(&self, path: &Path) -> Result<bool, GitError> {
        let worktrees = self.repo.worktrees()?;
        let wanted = path.to_string_lossy();
        let wanted = wanted.trim_end_matches('/');

        for name in worktrees.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                let worktree_path = worktree.path().to_string_lossy();
                if worktree_path.trim_end_matches('/') == wanted {
                    let mut opts = WorktreePruneOptions::new();
                    opts.valid(true).locked(true).working_tree(true);
                    worktree.prune(Some(&mut opts))?;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Prune orphaned worktrees (where the physical directory no longer exists)
    /// This cleans up stale entries in .git/worktrees/
    pub fn prune_orphaned_worktrees(&self) -> Result<u32, GitError> {
        let worktrees = self.repo.worktrees()?;
        let mut pruned_count = 0;

        for name in worktrees.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                let worktree_path = worktree.path();
                if !worktree_path.exists() {
                    log::info!(
                        "[Git] Pruning orphaned worktree '{}' (path {:?} no longer exists)",
                        name,
                        worktree_path
                    );
                    if let Err(e) = worktree.prune(None) {
                        log::warn!("[Git] Failed to prune worktree '{}': {}", name, e);
                    } else {
                        pruned_count += 1;
                    }
                }
            }
        }

        Ok(pruned_count)
    }

    /// Convert a Worktree to GitWorktree
    pub(crate) fn worktree_to_info(&self, worktree: &Worktree) -> Result<GitWorktree, GitError> {
        let name = worktree.name().unwrap_or("").to_string();
        let path = worktree.path().to_string_lossy().to_string();
        let is_locked = worktree
            .is_locked()
            .map(|status| !matches!(status, git2::WorktreeLockStatus::Unlocked))
            .unwrap_or(false);

        let branch = Repository::open(worktree.path())
            .ok()
            .and_then(|wt_repo| {
                let head = wt_repo.head().ok()?;
                if head.is_branch() {
                    head.shorthand().map(|s| s.to_string())
                } else {
                    None
                }
            });

        Ok(GitWorktree {
            name,
            path,
            branch,
            is_locked,
        })
    }
}
