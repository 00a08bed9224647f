// Utility functions

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// =============================================================================
// Path Helpers
// =============================================================================

/// Get the .parallel-engine directory path for a repository.
#[inline]
pub fn engine_dir(repo_path: &Path) -> PathBuf {
    repo_path.join(".parallel-engine")
}

/// Get the project config file path for a repository.
#[inline]
pub fn project_config_path(repo_path: &Path) -> PathBuf {
    engine_dir(repo_path).join("config.toml")
}

/// Default directory holding task worktrees: a sibling of the working tree,
/// `<repo>.worktrees`, so nothing is ever written inside the main checkout.
pub fn default_worktree_root(repo_path: &Path) -> PathBuf {
    let name = repo_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "repo".to_string());

    match repo_path.parent() {
        Some(parent) => parent.join(format!("{}.worktrees", name)),
        None => std::env::temp_dir().join(format!("{}.worktrees", name)),
    }
}

// =============================================================================
// Naming Helpers
// =============================================================================

/// Lowercase, dash-separated slug safe for branch names, at most `max_len` characters.
///
/// # Example
/// ```ignore
/// assert_eq!(slugify("Add the Billing service!", 20), "add-the-billing");
/// ```
pub fn slugify(s: &str, max_len: usize) -> String {
    let mut slug = String::new();
    for word in s
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        let extra = if slug.is_empty() { word.len() } else { word.len() + 1 };
        if slug.len() + extra > max_len {
            if slug.is_empty() {
                slug = word.chars().take(max_len).collect();
            }
            break;
        }
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word);
    }

    if slug.is_empty() {
        "task".to_string()
    } else {
        slug
    }
}

/// Sanitize a string for use as a path component
pub fn sanitize_path_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
}

/// Generate a run identifier: UTC timestamp plus a short random suffix.
pub fn generate_run_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), &suffix[..6])
}

/// Keep at most `max_bytes` of the tail of `output`, on a char boundary.
pub fn tail_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }

    let mut start = output.len() - max_bytes;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &output[start..])
}

// =============================================================================
// Locking
// =============================================================================

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// This is useful when you want to continue even if a previous thread panicked.
/// The mutex state may be inconsistent, so use with caution.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}
