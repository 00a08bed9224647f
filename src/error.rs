// Error types for the execution engine

use crate::models::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worktree error for {task_id}: {message}")]
    Worktree { task_id: TaskId, message: String },

    #[error("Task command unavailable: {0}")]
    CommandUnavailable(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worktree_error_message() {
        let err = EngineError::Worktree {
            task_id: TaskId(2),
            message: "path already exists".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Worktree error for task-2: path already exists"
        );
    }

    #[test]
    fn test_git_error_conversion() {
        let err: EngineError = git2::Error::from_str("bad ref").into();
        assert!(matches!(err, EngineError::Git(_)));
        assert!(err.to_string().contains("bad ref"));
    }
}
