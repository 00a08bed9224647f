//! Tests for GitManager
//!
//! Contains unit tests for the git plumbing the engine relies on

#[cfg(test)]
mod tests {
    use crate::git::GitManager;
    use git2::{Repository, Signature};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup_test_repo() -> (TempDir, GitManager) {
        let temp_dir = TempDir::new().unwrap();
        let repo_path = temp_dir.path();

        let repo = Repository::init(repo_path).unwrap();
        {
            let mut config = repo.config().unwrap();
            config.set_str("user.name", "Test User").unwrap();
            config.set_str("user.email", "test@example.com").unwrap();
        }

        let sig = Signature::now("Test User", "test@example.com").unwrap();
        let tree_id = {
            let mut index = repo.index().unwrap();

            let test_file = repo_path.join("test.txt");
            fs::write(&test_file, "Hello, World!\n").unwrap();
            index.add_path(Path::new("test.txt")).unwrap();
            index.write().unwrap();
            index.write_tree().unwrap()
        };

        let tree = repo.find_tree(tree_id).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        let manager = GitManager::new(repo_path).unwrap();
        (temp_dir, manager)
    }

    /// Commit `content` to `file` on `branch` through a throwaway worktree
    fn commit_on_branch(temp_dir: &TempDir, manager: &GitManager, branch: &str, file: &str, content: &str) {
        let wt_path = temp_dir.path().with_extension(format!("wt-{}", branch.replace('/', "-")));
        let base = manager.branch_tip(&manager.get_default_branch_name()).unwrap();
        if !manager.branch_exists(branch) {
            manager.create_worktree(branch, branch, &wt_path, &base).unwrap();
        }
        fs::write(wt_path.join(file), content).unwrap();
        let wt = GitManager::new(&wt_path).unwrap();
        wt.commit_all_changes(&format!("edit {}", file)).unwrap();
        manager.remove_worktree(&wt_path).unwrap();
    }

    #[test]
    fn test_create_git_manager() {
        let (_temp_dir, manager) = setup_test_repo();
        assert!(manager.repo_path().exists());
        assert!(manager.workdir().is_some());
    }

    #[test]
    fn test_create_branch_from_commit() {
        let (_temp_dir, manager) = setup_test_repo();
        let head = manager.get_current_branch().unwrap();

        let branch = manager
            .create_branch_from_commit("feature-test", &head.commit_id, false)
            .unwrap();
        assert_eq!(branch.name, "feature-test");
        assert_eq!(branch.commit_id, head.commit_id);
        assert!(!branch.is_head);
        assert!(manager.branch_exists("feature-test"));

        manager.delete_branch("feature-test").unwrap();
        assert!(!manager.branch_exists("feature-test"));
    }

    #[test]
    fn test_get_current_branch() {
        let (_temp_dir, manager) = setup_test_repo();

        let branch = manager.get_current_branch().unwrap();
        assert!(branch.is_head);
        assert!(branch.name == "main" || branch.name == "master");
        assert_eq!(manager.get_default_branch_name(), branch.name);
    }

    #[test]
    fn test_create_and_remove_worktree() {
        let (temp_dir, manager) = setup_test_repo();
        let base = manager.get_current_branch().unwrap().commit_id;
        let wt_path = temp_dir.path().with_extension("wt-create");

        let worktree = manager
            .create_worktree("parallel/run/task-1", "parallel/run/task-1", &wt_path, &base)
            .unwrap();
        assert_eq!(worktree.name, "parallel-run-task-1");
        assert_eq!(worktree.branch.as_deref(), Some("parallel/run/task-1"));
        assert!(wt_path.join("test.txt").exists());
        assert_eq!(manager.list_worktrees().unwrap().len(), 1);

        assert!(manager.remove_worktree(&wt_path).unwrap());
        assert!(!wt_path.exists());
        assert!(manager.list_worktrees().unwrap().is_empty());

        // Removing again is a no-op
        assert!(!manager.remove_worktree(&wt_path).unwrap());
    }

    #[test]
    fn test_prune_orphaned_worktrees() {
        let (temp_dir, manager) = setup_test_repo();
        let base = manager.get_current_branch().unwrap().commit_id;
        let wt_path = temp_dir.path().with_extension("wt-orphan");

        manager
            .create_worktree("orphan", "orphan", &wt_path, &base)
            .unwrap();
        fs::remove_dir_all(&wt_path).unwrap();

        assert_eq!(manager.prune_orphaned_worktrees().unwrap(), 1);
        assert!(manager.list_worktrees().unwrap().is_empty());
    }

    #[test]
    fn test_commit_all_changes_skips_clean_tree() {
        let (temp_dir, manager) = setup_test_repo();
        assert!(manager.commit_all_changes("nothing").unwrap().is_none());

        fs::write(temp_dir.path().join("new.txt"), "new").unwrap();
        let commit_id = manager.commit_all_changes("add new").unwrap();
        assert!(commit_id.is_some());

        let history = manager.get_commit_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "add new");
    }

    #[test]
    fn test_get_status() {
        let (temp_dir, manager) = setup_test_repo();

        fs::write(temp_dir.path().join("new_file.txt"), "New content").unwrap();

        let status = manager.get_status().unwrap();
        assert!(status.iter().any(|s| s.path == "new_file.txt" && s.status.contains("new")));
    }

    #[test]
    fn test_repository_busy_detects_index_lock() {
        let (_temp_dir, manager) = setup_test_repo();
        assert!(manager.repository_busy().is_none());

        let lock = manager.repo_path().join("index.lock");
        fs::write(&lock, "").unwrap();
        assert!(manager.repository_busy().unwrap().contains("index.lock"));
        fs::remove_file(&lock).unwrap();
    }

    #[test]
    fn test_fast_forward_merge_updates_working_tree() {
        let (temp_dir, manager) = setup_test_repo();
        let target = manager.get_default_branch_name();

        commit_on_branch(&temp_dir, &manager, "feature", "feature.txt", "feature\n");

        let outcome = manager.merge_branch("feature", &target).unwrap();
        assert!(outcome.success);
        assert!(outcome.fast_forward);
        assert!(temp_dir.path().join("feature.txt").exists());
        assert!(manager.get_status().unwrap().is_empty());
    }

    #[test]
    fn test_failed_ref_update_restores_working_tree() {
        let (temp_dir, manager) = setup_test_repo();
        let target = manager.get_default_branch_name();
        let before = manager.branch_tip(&target).unwrap();

        commit_on_branch(&temp_dir, &manager, "edit", "test.txt", "edited\n");
        commit_on_branch(&temp_dir, &manager, "add", "added.txt", "added\n");

        // A held ref lock makes the branch update fail after the checkout ran
        let lock = manager
            .repo_path()
            .join("refs")
            .join("heads")
            .join(format!("{}.lock", target));
        fs::write(&lock, "").unwrap();

        assert!(manager.merge_branch("edit", &target).is_err());
        assert!(manager.merge_branch("add", &target).is_err());

        assert_eq!(manager.branch_tip(&target).unwrap(), before);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("test.txt")).unwrap(),
            "Hello, World!\n"
        );
        assert!(!temp_dir.path().join("added.txt").exists());
        assert!(manager.get_status().unwrap().is_empty());

        fs::remove_file(&lock).unwrap();
        assert!(manager.merge_branch("edit", &target).unwrap().fast_forward);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("test.txt")).unwrap(),
            "edited\n"
        );
    }

    #[test]
    fn test_merge_two_diverged_branches() {
        let (temp_dir, manager) = setup_test_repo();
        let target = manager.get_default_branch_name();

        commit_on_branch(&temp_dir, &manager, "a", "a.txt", "a\n");
        commit_on_branch(&temp_dir, &manager, "b", "b.txt", "b\n");

        assert!(manager.merge_branch("a", &target).unwrap().fast_forward);
        let outcome = manager.merge_branch("b", &target).unwrap();
        assert!(outcome.success);
        assert!(!outcome.fast_forward);

        let head = manager.get_commit(outcome.commit_id.as_deref().unwrap()).unwrap();
        assert_eq!(head.parent_ids.len(), 2);
        assert!(temp_dir.path().join("a.txt").exists());
        assert!(temp_dir.path().join("b.txt").exists());

        let again = manager.merge_branch("b", &target).unwrap();
        assert!(again.success);
        assert!(again.commit_id.is_none());
    }

    #[test]
    fn test_conflicting_merge_leaves_target_untouched() {
        let (temp_dir, manager) = setup_test_repo();
        let target = manager.get_default_branch_name();

        commit_on_branch(&temp_dir, &manager, "left", "test.txt", "left\n");
        commit_on_branch(&temp_dir, &manager, "right", "test.txt", "right\n");

        assert!(manager.merge_branch("left", &target).unwrap().success);
        let before = manager.branch_tip(&target).unwrap();

        assert_eq!(
            manager.check_merge_conflicts("right", &target).unwrap(),
            vec!["test.txt".to_string()]
        );

        let outcome = manager.merge_branch("right", &target).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.conflict_files, vec!["test.txt".to_string()]);
        assert_eq!(manager.branch_tip(&target).unwrap(), before);
        assert!(manager.repository_busy().is_none());
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("test.txt")).unwrap(),
            "left\n"
        );
    }

    #[test]
    fn test_squash_creates_single_parent_commit() {
        let (temp_dir, manager) = setup_test_repo();
        let target = manager.get_default_branch_name();

        commit_on_branch(&temp_dir, &manager, "a", "a.txt", "a\n");
        commit_on_branch(&temp_dir, &manager, "b", "b.txt", "b\n");

        assert!(manager.squash_branch("a", &target, "squash a").unwrap().success);
        let outcome = manager.squash_branch("b", &target, "squash b").unwrap();
        assert!(outcome.success);

        let head = manager.get_commit(outcome.commit_id.as_deref().unwrap()).unwrap();
        assert_eq!(head.parent_ids.len(), 1);
        assert_eq!(head.message, "squash b");
        assert!(temp_dir.path().join("b.txt").exists());
    }

    #[test]
    fn test_rebase_produces_linear_history() {
        let (temp_dir, manager) = setup_test_repo();
        let target = manager.get_default_branch_name();

        commit_on_branch(&temp_dir, &manager, "a", "a.txt", "a\n");
        commit_on_branch(&temp_dir, &manager, "b", "b.txt", "b\n");
        let b_tip = manager.branch_tip("b").unwrap();

        assert!(manager.rebase_branch("a", &target).unwrap().success);
        let outcome = manager.rebase_branch("b", &target).unwrap();
        assert!(outcome.success);

        let history = manager.get_commit_history(10).unwrap();
        assert!(history.iter().all(|c| c.parent_ids.len() <= 1));
        assert_eq!(history.len(), 3);
        assert!(temp_dir.path().join("a.txt").exists());
        assert!(temp_dir.path().join("b.txt").exists());
        // The task branch itself is not rewritten
        assert_eq!(manager.branch_tip("b").unwrap(), b_tip);
    }

    #[test]
    fn test_rebase_conflict_aborts_cleanly() {
        let (temp_dir, manager) = setup_test_repo();
        let target = manager.get_default_branch_name();

        commit_on_branch(&temp_dir, &manager, "left", "test.txt", "left\n");
        commit_on_branch(&temp_dir, &manager, "right", "test.txt", "right\n");

        assert!(manager.rebase_branch("left", &target).unwrap().success);
        let before = manager.branch_tip(&target).unwrap();

        let outcome = manager.rebase_branch("right", &target).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.conflict_files, vec!["test.txt".to_string()]);
        assert_eq!(manager.branch_tip(&target).unwrap(), before);
        assert!(manager.repository_busy().is_none());
    }
}
