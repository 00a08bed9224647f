//! Commit operations for GitManager
//!
//! Contains methods for committing working tree changes and viewing history

use git2::{Error as GitError, IndexAddOption, Oid};

use crate::git::types::CommitInfo;
use crate::git::GitManager;

impl GitManager {
    /// Get commit history reachable from HEAD
    pub fn get_commit_history(&self, max_count: usize) -> Result<Vec<CommitInfo>, GitError> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;

        let mut result = Vec::new();
        for (i, oid) in revwalk.enumerate() {
            if i >= max_count {
                break;
            }

            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            result.push(self.commit_to_info(&commit)?);
        }

        Ok(result)
    }

    /// Get a specific commit
    pub fn get_commit(&self, commit_id: &str) -> Result<CommitInfo, GitError> {
        let oid = Oid::from_str(commit_id)?;
        let commit = self.repo.find_commit(oid)?;
        self.commit_to_info(&commit)
    }

    /// Stage all files, including deletions
    pub fn stage_all(&self) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    /// Stage everything in the working tree and commit it on HEAD.
    ///
    /// Returns `None` when the staged tree is identical to HEAD's tree.
    pub fn commit_all_changes(&self, message: &str) -> Result<Option<String>, GitError> {
        self.stage_all()?;

        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let parent = self.repo.head()?.peel_to_commit()?;

        if parent.tree_id() == tree_id {
            return Ok(None);
        }

        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;
        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&parent],
        )?;

        Ok(Some(oid.to_string()))
    }
}
