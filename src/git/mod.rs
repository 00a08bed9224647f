//! Git operations using git2-rs
//!
//! This module provides the git plumbing the engine needs, organized into focused submodules:
//! - `manager` - Core GitManager struct and signature handling
//! - `branches` - Branch operations (create from commit, delete, resolve tips)
//! - `worktrees` - Worktree management (add, remove, prune)
//! - `commits` - Committing task changes and reading history
//! - `merge` - Atomic merge, squash and rebase folding into a target branch
//! - `status` - Working tree status and repository lock state
//! - `types` - Shared data structures

mod branches;
mod commits;
mod manager;
mod merge;
mod status;
#[cfg(test)]
mod tests;
mod types;
mod worktrees;

pub use manager::GitManager;

#[allow(unused_imports)]
pub use types::{BranchInfo, CommitInfo, FileStatus, GitWorktree, MergeOutcome};
