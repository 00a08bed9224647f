//! Branch operations for GitManager
//!
//! Contains methods for creating, deleting and resolving branches

use git2::{Branch, BranchType, Commit, Error as GitError, Oid};

use crate::git::types::{BranchInfo, CommitInfo};
use crate::git::GitManager;

impl GitManager {
    /// Create a new branch pointing at a specific commit
    pub fn create_branch_from_commit(
        &self,
        name: &str,
        commit_id: &str,
        force: bool,
    ) -> Result<BranchInfo, GitError> {
        let oid = Oid::from_str(commit_id)?;
        let commit = self.repo.find_commit(oid)?;

        let branch = self.repo.branch(name, &commit, force)?;

        self.branch_to_info(&branch)
    }

    /// Delete a local branch
    pub fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        let mut branch = self.repo.find_branch(name, BranchType::Local)?;
        branch.delete()?;
        Ok(())
    }

    /// Check whether a local branch exists
    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    /// Whether every commit of `branch` is already reachable from `target`
    pub fn is_merged_into(&self, branch: &str, target: &str) -> Result<bool, GitError> {
        let branch_id = self.branch_commit(branch)?.id();
        let target_id = self.branch_commit(target)?.id();
        Ok(branch_id == target_id || self.repo.graph_descendant_of(target_id, branch_id)?)
    }

    /// Get all local branches
    pub fn list_branches(&self) -> Result<Vec<BranchInfo>, GitError> {
        let branches = self.repo.branches(Some(BranchType::Local))?;

        let mut result = Vec::new();
        for branch in branches {
            let (branch, _) = branch?;
            result.push(self.branch_to_info(&branch)?);
        }

        Ok(result)
    }

    /// Get the current branch
    pub fn get_current_branch(&self) -> Result<BranchInfo, GitError> {
        let head = self.repo.head()?;

        if !head.is_branch() {
            return Err(GitError::from_str("HEAD is not a branch"));
        }

        let branch = Branch::wrap(head);
        self.branch_to_info(&branch)
    }

    /// Commit id at the tip of a local branch
    pub fn branch_tip(&self, name: &str) -> Result<String, GitError> {
        Ok(self.branch_commit(name)?.id().to_string())
    }

    pub(crate) fn branch_commit(&self, name: &str) -> Result<Commit<'_>, GitError> {
        let branch = self.repo.find_branch(name, BranchType::Local)?;
        branch.get().peel_to_commit()
    }

    /// Whether HEAD of this repository currently points at `name`
    pub(crate) fn is_head_branch(&self, name: &str) -> bool {
        match self.repo.head() {
            Ok(head) => head.is_branch() && head.shorthand() == Some(name),
            Err(_) => false,
        }
    }

    /// Convert a Branch to BranchInfo
    pub(crate) fn branch_to_info(&self, branch: &Branch) -> Result<BranchInfo, GitError> {
        let name = branch.name()?.unwrap_or("").to_string();
        let is_head = branch.is_head();
        let commit = branch.get().peel_to_commit()?;

        Ok(BranchInfo {
            name,
            is_head,
            commit_id: commit.id().to_string(),
        })
    }

    /// Convert a Commit to CommitInfo
    pub(crate) fn commit_to_info(&self, commit: &Commit) -> Result<CommitInfo, GitError> {
        let author = commit.author();
        let id = commit.id().to_string();

        Ok(CommitInfo {
            short_id: id[..7].to_string(),
            id,
            message: commit.message().unwrap_or("").to_string(),
            author: author.name().unwrap_or("").to_string(),
            email: author.email().unwrap_or("").to_string(),
            timestamp: commit.time().seconds(),
            parent_ids: commit.parent_ids().map(|oid| oid.to_string()).collect(),
        })
    }

    /// Get the default branch name for this repository.
    ///
    /// Resolution order:
    /// 1. Current HEAD branch (if HEAD points to a branch)
    /// 2. First existing common default branch ("main", "master")
    /// 3. Fallback to "main"
    pub fn get_default_branch_name(&self) -> String {
        if let Ok(head) = self.repo.head() {
            if head.is_branch() {
                if let Some(name) = head.shorthand() {
                    return name.to_string();
                }
            }
        }

        for name in &["main", "master"] {
            if self.repo.find_branch(name, BranchType::Local).is_ok() {
                return (*name).to_string();
            }
        }

        "main".to_string()
    }
}
