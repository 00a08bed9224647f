//! Git data types and structures
//!
//! Contains all shared types used across git operations

use serde::{Deserialize, Serialize};

/// Represents a git branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub is_head: bool,
    pub commit_id: String,
}

/// Represents a git commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
    pub short_id: String,
    pub message: String,
    pub author: String,
    pub email: String,
    pub timestamp: i64,
    pub parent_ids: Vec<String>,
}

/// Represents a registered git worktree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitWorktree {
    pub name: String,
    pub path: String,
    pub branch: Option<String>,
    pub is_locked: bool,
}

/// Represents a file status in git
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: String,
    pub status: String,
}

/// Represents the result of folding a branch into a target branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub success: bool,
    pub message: String,
    pub conflict_files: Vec<String>,
    pub commit_id: Option<String>,
    pub fast_forward: bool,
}

impl MergeOutcome {
    pub(crate) fn up_to_date() -> Self {
        Self {
            success: true,
            message: "Already up to date".to_string(),
            conflict_files: vec![],
            commit_id: None,
            fast_forward: false,
        }
    }

    pub(crate) fn conflict(message: String, conflict_files: Vec<String>) -> Self {
        Self {
            success: false,
            message,
            conflict_files,
            commit_id: None,
            fast_forward: false,
        }
    }
}
