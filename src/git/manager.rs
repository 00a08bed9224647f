//! Core GitManager implementation
//!
//! Contains the GitManager struct and its basic operations

use git2::{Error as GitError, Repository, Signature};
use std::path::{Path, PathBuf};

/// Committer identity used when the repository has none configured
pub(crate) const FALLBACK_NAME: &str = "Parallel Engine";
pub(crate) const FALLBACK_EMAIL: &str = "parallel-engine@localhost";

/// Git manager for repository operations
pub struct GitManager {
    pub(crate) repo: Repository,
}

impl GitManager {
    /// Open the repository (or worktree) at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let repo = Repository::open(path)?;
        Ok(Self { repo })
    }

    /// Get the path of the `.git` directory
    pub fn repo_path(&self) -> PathBuf {
        self.repo.path().to_path_buf()
    }

    /// Get the working directory, if the repository is not bare
    pub fn workdir(&self) -> Option<PathBuf> {
        self.repo.workdir().map(|p| p.to_path_buf())
    }

    /// Configured signature, or the engine fallback identity
    pub(crate) fn signature(&self) -> Result<Signature<'static>, GitError> {
        self.repo
            .signature()
            .or_else(|_| Signature::now(FALLBACK_NAME, FALLBACK_EMAIL))
    }
}
