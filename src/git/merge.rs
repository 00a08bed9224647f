//! Merge and conflict handling for GitManager
//!
//! Every operation here computes its result in memory and only moves the
//! target branch once a conflict-free commit exists, so a conflict never
//! leaves a half-merged target behind.

use git2::{
    build::CheckoutBuilder, Commit, Delta, Error as GitError, ErrorCode, Index, Oid, RebaseOptions,
};

use crate::git::types::MergeOutcome;
use crate::git::GitManager;

impl GitManager {
    /// Merge a source branch into a target branch with a merge commit
    /// (or a fast-forward when the target has not moved).
    pub fn merge_branch(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<MergeOutcome, GitError> {
        log::info!("[GitManager] Merging {} into {}", source_branch, target_branch);

        let source_commit = self.branch_commit(source_branch)?;
        let target_commit = self.branch_commit(target_branch)?;

        if let Some(outcome) =
            self.trivial_outcome(&source_commit, &target_commit, source_branch, target_branch)?
        {
            return Ok(outcome);
        }

        let mut index = self
            .repo
            .merge_commits(&target_commit, &source_commit, None)?;
        if index.has_conflicts() {
            return Ok(self.conflict_outcome(&index)?);
        }

        let tree_id = index.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;

        let merge_commit = self.repo.commit(
            None,
            &signature,
            &signature,
            &format!("Merge branch '{}' into '{}'", source_branch, target_branch),
            &tree,
            &[&target_commit, &source_commit],
        )?;

        self.advance_branch(target_branch, merge_commit)?;
        log::info!("[GitManager] Merge successful: {}", merge_commit);

        Ok(MergeOutcome {
            success: true,
            message: format!("Successfully merged {} into {}", source_branch, target_branch),
            conflict_files: vec![],
            commit_id: Some(merge_commit.to_string()),
            fast_forward: false,
        })
    }

    /// Collapse all changes of a source branch into a single commit on the target
    pub fn squash_branch(
        &self,
        source_branch: &str,
        target_branch: &str,
        message: &str,
    ) -> Result<MergeOutcome, GitError> {
        log::info!("[GitManager] Squashing {} into {}", source_branch, target_branch);

        let source_commit = self.branch_commit(source_branch)?;
        let target_commit = self.branch_commit(target_branch)?;

        if source_commit.id() == target_commit.id()
            || self
                .repo
                .graph_descendant_of(target_commit.id(), source_commit.id())?
        {
            return Ok(MergeOutcome::up_to_date());
        }

        let mut index = self
            .repo
            .merge_commits(&target_commit, &source_commit, None)?;
        if index.has_conflicts() {
            return Ok(self.conflict_outcome(&index)?);
        }

        let tree_id = index.write_tree_to(&self.repo)?;
        if tree_id == target_commit.tree_id() {
            return Ok(MergeOutcome::up_to_date());
        }

        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;
        let squash_commit = self.repo.commit(
            None,
            &signature,
            &signature,
            message,
            &tree,
            &[&target_commit],
        )?;

        self.advance_branch(target_branch, squash_commit)?;

        Ok(MergeOutcome {
            success: true,
            message: format!("Squashed {} into {}", source_branch, target_branch),
            conflict_files: vec![],
            commit_id: Some(squash_commit.to_string()),
            fast_forward: false,
        })
    }

    /// Replay the source branch's commits on top of the target and fast-forward
    /// the target to the result. The source branch itself is left untouched.
    pub fn rebase_branch(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<MergeOutcome, GitError> {
        log::info!("[GitManager] Rebasing {} onto {}", source_branch, target_branch);

        let source_commit = self.branch_commit(source_branch)?;
        let target_commit = self.branch_commit(target_branch)?;

        if let Some(outcome) =
            self.trivial_outcome(&source_commit, &target_commit, source_branch, target_branch)?
        {
            return Ok(outcome);
        }

        let branch = self.repo.find_annotated_commit(source_commit.id())?;
        let upstream = self.repo.find_annotated_commit(target_commit.id())?;

        let mut opts = RebaseOptions::new();
        opts.inmemory(true);
        let mut rebase = self
            .repo
            .rebase(Some(&branch), Some(&upstream), None, Some(&mut opts))?;

        let signature = self.signature()?;
        let mut last_commit: Option<Oid> = None;

        while let Some(operation) = rebase.next() {
            if let Err(e) = operation {
                rebase.abort()?;
                return Err(e);
            }

            let index = rebase.inmemory_index()?;
            if index.has_conflicts() {
                let outcome = self.conflict_outcome(&index)?;
                rebase.abort()?;
                return Ok(outcome);
            }

            match rebase.commit(None, &signature, None) {
                Ok(oid) => last_commit = Some(oid),
                // Patch already present upstream
                Err(e) if e.code() == ErrorCode::Applied => continue,
                Err(e) => {
                    rebase.abort()?;
                    return Err(e);
                }
            }
        }

        rebase.finish(None)?;

        let new_tip = match last_commit {
            Some(oid) if oid != target_commit.id() => oid,
            _ => return Ok(MergeOutcome::up_to_date()),
        };

        self.advance_branch(target_branch, new_tip)?;

        Ok(MergeOutcome {
            success: true,
            message: format!("Rebased {} onto {}", source_branch, target_branch),
            conflict_files: vec![],
            commit_id: Some(new_tip.to_string()),
            fast_forward: false,
        })
    }

    /// Up-to-date and fast-forward cases shared by merge and rebase
    fn trivial_outcome(
        &self,
        source_commit: &Commit,
        target_commit: &Commit,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Option<MergeOutcome>, GitError> {
        if source_commit.id() == target_commit.id()
            || self
                .repo
                .graph_descendant_of(target_commit.id(), source_commit.id())?
        {
            log::info!("[GitManager] Already up to date");
            return Ok(Some(MergeOutcome::up_to_date()));
        }

        if self
            .repo
            .graph_descendant_of(source_commit.id(), target_commit.id())?
        {
            log::info!("[GitManager] Fast-forward merge possible");
            self.advance_branch(target_branch, source_commit.id())?;

            return Ok(Some(MergeOutcome {
                success: true,
                message: format!("Fast-forward merged {} into {}", source_branch, target_branch),
                conflict_files: vec![],
                commit_id: Some(source_commit.id().to_string()),
                fast_forward: true,
            }));
        }

        Ok(None)
    }

    /// Move a branch to a new commit. When the branch is checked out in this
    /// repository the working tree is updated first with a safe checkout, so
    /// local modifications abort the move instead of being overwritten. If the
    /// ref cannot be moved afterwards, the paths the checkout wrote are put
    /// back to the old commit so the tree keeps matching the branch.
    pub(crate) fn advance_branch(&self, branch: &str, new_commit: Oid) -> Result<(), GitError> {
        let commit = self.repo.find_commit(new_commit)?;
        let mut reference = self.repo.find_reference(&format!("refs/heads/{}", branch))?;

        if !(self.is_head_branch(branch) && self.repo.workdir().is_some()) {
            reference.set_target(new_commit, &format!("parallel-engine: advance {}", branch))?;
            return Ok(());
        }

        let old_commit = reference.peel_to_commit()?;
        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))?;

        if let Err(e) = reference.set_target(new_commit, &format!("parallel-engine: advance {}", branch)) {
            log::warn!(
                "[GitManager] Failed to move {} after checkout, restoring working tree: {}",
                branch,
                e
            );
            if let Err(restore) = self.restore_checkout(&old_commit, &commit) {
                log::error!("[GitManager] Failed to restore working tree of {}: {}", branch, restore);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Undo a checkout from `from` to `to`, limited to the paths that differ
    fn restore_checkout(&self, from: &Commit, to: &Commit) -> Result<(), GitError> {
        let old_tree = from.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&to.tree()?), None)?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force().disable_pathspec_match(true);
        let mut restore = false;
        let mut added = Vec::new();

        for delta in diff.deltas() {
            if delta.status() == Delta::Added {
                if let Some(path) = delta.new_file().path() {
                    added.push(path.to_path_buf());
                }
            } else if let Some(path) = delta.old_file().path() {
                checkout.path(path);
                restore = true;
            }
        }

        if restore {
            self.repo
                .checkout_tree(old_tree.as_object(), Some(&mut checkout))?;
        }

        if !added.is_empty() {
            let mut index = self.repo.index()?;
            for path in &added {
                if let Some(workdir) = self.repo.workdir() {
                    if let Err(e) = std::fs::remove_file(workdir.join(path)) {
                        log::warn!("[GitManager] Failed to remove {}: {}", path.display(), e);
                    }
                }
                index.remove_path(path)?;
            }
            index.write()?;
        }
        Ok(())
    }

    /// Check if there are any conflicts between two branches without touching either
    pub fn check_merge_conflicts(
        &self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Vec<String>, GitError> {
        let source_commit = self.branch_commit(source_branch)?;
        let target_commit = self.branch_commit(target_branch)?;

        let index = self
            .repo
            .merge_commits(&target_commit, &source_commit, None)?;
        conflict_files(&index)
    }

    fn conflict_outcome(&self, index: &Index) -> Result<MergeOutcome, GitError> {
        let files = conflict_files(index)?;
        log::warn!("[GitManager] Merge has conflicts: {:?}", files);
        Ok(MergeOutcome::conflict(
            format!("Merge conflicts in {} file(s)", files.len()),
            files,
        ))
    }
}

/// Paths with conflict entries in an index, sorted and deduplicated
fn conflict_files(index: &Index) -> Result<Vec<String>, GitError> {
    let mut files = Vec::new();
    if !index.has_conflicts() {
        return Ok(files);
    }

    for conflict in index.conflicts()?.flatten() {
        if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
            files.push(String::from_utf8_lossy(&entry.path).to_string());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
