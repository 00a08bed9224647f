// Data models shared across the analysis, scheduling and merge stages

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

/// Stable ordinal identifier of a task for the lifetime of a run (1-based, input order)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TaskId(pub usize);

impl TaskId {
    pub fn get(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A single development task parsed from a free-text description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    /// Leading verb or verb phrase, if one could be recognised
    pub action: Option<String>,
    pub depends_on: BTreeSet<TaskId>,
}

impl Task {
    pub fn new(id: usize, description: impl Into<String>) -> Self {
        Self {
            id: TaskId(id),
            description: description.into(),
            action: None,
            depends_on: BTreeSet::new(),
        }
    }
}

/// Predicted set of files a task will touch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilePrediction {
    pub task_id: TaskId,
    pub predicted_files: BTreeSet<String>,
    /// Average confidence of the methods that contributed (0.0 - 1.0)
    pub confidence: f64,
    /// Contributing methods joined with '+', or "none"
    pub method: String,
}

impl FilePrediction {
    /// A prediction that claims no files
    pub fn empty(task_id: TaskId) -> Self {
        Self {
            task_id,
            predicted_files: BTreeSet::new(),
            confidence: 0.0,
            method: "none".to_string(),
        }
    }

    pub fn with_files<I, S>(task_id: TaskId, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            task_id,
            predicted_files: files.into_iter().map(Into::into).collect(),
            confidence: 1.0,
            method: "explicit_path".to_string(),
        }
    }
}

/// Risk classification of an overlap, ordered from least to most severe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Two tasks predicted to touch at least one common file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskOverlapPair {
    /// Always the smaller of the two IDs
    pub task1: TaskId,
    pub task2: TaskId,
    pub overlapping_files: BTreeSet<String>,
    pub severity: Severity,
}

/// A set of tasks that may execute concurrently (a "wave")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SafeGroup {
    pub id: usize,
    pub task_ids: Vec<TaskId>,
    pub files: BTreeSet<String>,
    pub can_run_in_parallel: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverlapResult {
    pub has_overlap: bool,
    pub overlapping_files: BTreeSet<String>,
    pub task_pairs: Vec<TaskOverlapPair>,
    pub safe_groups: Vec<SafeGroup>,
}

impl OverlapResult {
    /// Tasks that share a critical file with `task_id`
    pub fn critical_partners(&self, task_id: TaskId) -> HashSet<TaskId> {
        self.task_pairs
            .iter()
            .filter(|p| p.severity == Severity::Critical)
            .filter_map(|p| {
                if p.task1 == task_id {
                    Some(p.task2)
                } else if p.task2 == task_id {
                    Some(p.task1)
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Lifecycle state of a task worktree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStatus {
    Creating,
    Active,
    Completed,
    Failed,
    Cleaned,
}

impl std::fmt::Display for WorktreeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorktreeStatus::Creating => write!(f, "creating"),
            WorktreeStatus::Active => write!(f, "active"),
            WorktreeStatus::Completed => write!(f, "completed"),
            WorktreeStatus::Failed => write!(f, "failed"),
            WorktreeStatus::Cleaned => write!(f, "cleaned"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
    pub task_id: TaskId,
    pub status: WorktreeStatus,
}

/// Outcome of running one task; produced once and never mutated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub task_id: TaskId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn failed(task_id: TaskId, error: impl Into<String>) -> Self {
        Self {
            task_id,
            success: false,
            output: None,
            error: Some(error.into()),
            exit_code: None,
            timed_out: false,
            duration_ms: 0,
        }
    }
}

/// Policy used to fold a task branch back into the target branch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Merge commits in task order, stopping at the first conflict
    Sequential,
    /// One squashed commit per task
    Squash,
    /// Rebase each branch onto the latest target, then fast-forward
    Rebase,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::Sequential
    }
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Sequential => "sequential",
            MergeStrategy::Squash => "squash",
            MergeStrategy::Rebase => "rebase",
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(MergeStrategy::Sequential),
            "squash" => Ok(MergeStrategy::Squash),
            "rebase" => Ok(MergeStrategy::Rebase),
            _ => Err(format!(
                "Unknown merge strategy: '{}'. Expected one of: sequential, squash, rebase",
                s
            )),
        }
    }
}

/// Files and details of a merge that could not be applied cleanly
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetails {
    pub files: Vec<String>,
    pub details: String,
}

/// Outcome of folding one task branch into the target branch; terminal once produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub task_id: TaskId,
    pub strategy: MergeStrategy,
    pub merged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    /// Why the merge was never attempted (e.g. an earlier conflict halted a sequential merge)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    /// Non-conflict failure reported by git
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MergeResult {
    pub fn is_conflict(&self) -> bool {
        self.conflict.is_some()
    }

    /// Whether the branch must be kept for manual follow-up
    pub fn needs_preservation(&self) -> bool {
        !self.merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!(
            [Severity::Info, Severity::Critical, Severity::Warning]
                .into_iter()
                .max(),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn test_merge_strategy_from_str() {
        assert_eq!("squash".parse::<MergeStrategy>(), Ok(MergeStrategy::Squash));
        assert_eq!("REBASE".parse::<MergeStrategy>(), Ok(MergeStrategy::Rebase));
        assert!("octopus".parse::<MergeStrategy>().is_err());
        assert_eq!(MergeStrategy::default(), MergeStrategy::Sequential);
    }

    #[test]
    fn test_task_id_serializes_as_number() {
        let json = serde_json::to_string(&TaskId(3)).unwrap();
        assert_eq!(json, "3");
        assert_eq!(TaskId(3).to_string(), "task-3");
    }

    #[test]
    fn test_critical_partners() {
        let result = OverlapResult {
            has_overlap: true,
            overlapping_files: ["a.rs".to_string()].into_iter().collect(),
            task_pairs: vec![
                TaskOverlapPair {
                    task1: TaskId(1),
                    task2: TaskId(2),
                    overlapping_files: ["a.rs".to_string()].into_iter().collect(),
                    severity: Severity::Critical,
                },
                TaskOverlapPair {
                    task1: TaskId(1),
                    task2: TaskId(3),
                    overlapping_files: ["README.md".to_string()].into_iter().collect(),
                    severity: Severity::Info,
                },
            ],
            safe_groups: vec![],
        };

        let partners = result.critical_partners(TaskId(1));
        assert!(partners.contains(&TaskId(2)));
        assert!(!partners.contains(&TaskId(3)));
    }

    #[test]
    fn test_execution_result_serialization_skips_empty_fields() {
        let result = ExecutionResult::failed(TaskId(1), "boom");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["taskId"], 1);
        assert_eq!(json["error"], "boom");
        assert!(json.get("output").is_none());
    }
}
