// Progress event types and reporters
// Reporters observe the run; nothing they do feeds back into scheduling

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::{MergeStrategy, TaskId};

// Event name constants
pub const EVENT_WAVE_STARTED: &str = "wave-started";
pub const EVENT_TASK_STARTED: &str = "task-started";
pub const EVENT_TASK_COMPLETED: &str = "task-completed";
pub const EVENT_MERGE_STARTED: &str = "merge-started";
pub const EVENT_MERGE_COMPLETED: &str = "merge-completed";
pub const EVENT_MERGE_CONFLICT: &str = "merge-conflict";
pub const EVENT_WAVE_COMPLETE: &str = "wave-complete";
pub const EVENT_RESOURCE_FALLBACK: &str = "resource-fallback";

/// Lifecycle event emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    WaveStarted {
        wave: usize,
        task_ids: Vec<TaskId>,
        concurrency: usize,
    },
    #[serde(rename_all = "camelCase")]
    TaskStarted {
        wave: usize,
        task_id: TaskId,
        description: String,
    },
    #[serde(rename_all = "camelCase")]
    TaskCompleted {
        wave: usize,
        task_id: TaskId,
        success: bool,
        timed_out: bool,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MergeStarted {
        wave: usize,
        task_id: TaskId,
        strategy: MergeStrategy,
        branch: String,
    },
    #[serde(rename_all = "camelCase")]
    MergeCompleted {
        wave: usize,
        task_id: TaskId,
        merged: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        commit_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    MergeConflict {
        wave: usize,
        task_id: TaskId,
        files: Vec<String>,
        details: String,
    },
    #[serde(rename_all = "camelCase")]
    WaveComplete {
        wave: usize,
        succeeded: usize,
        failed: usize,
        merged: usize,
    },
    #[serde(rename_all = "camelCase")]
    ResourceFallback { wave: usize, reason: String },
}

impl ProgressEvent {
    /// Event name as used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::WaveStarted { .. } => EVENT_WAVE_STARTED,
            ProgressEvent::TaskStarted { .. } => EVENT_TASK_STARTED,
            ProgressEvent::TaskCompleted { .. } => EVENT_TASK_COMPLETED,
            ProgressEvent::MergeStarted { .. } => EVENT_MERGE_STARTED,
            ProgressEvent::MergeCompleted { .. } => EVENT_MERGE_COMPLETED,
            ProgressEvent::MergeConflict { .. } => EVENT_MERGE_CONFLICT,
            ProgressEvent::WaveComplete { .. } => EVENT_WAVE_COMPLETE,
            ProgressEvent::ResourceFallback { .. } => EVENT_RESOURCE_FALLBACK,
        }
    }
}

/// Caller-supplied observer of progress events
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Writes events through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::MergeConflict { task_id, files, .. } => {
                log::warn!("[Progress] merge-conflict {}: {}", task_id, files.join(", "))
            }
            ProgressEvent::ResourceFallback { wave, reason } => {
                log::warn!("[Progress] resource-fallback wave {}: {}", wave, reason)
            }
            ProgressEvent::TaskCompleted {
                task_id,
                success: false,
                error,
                ..
            } => log::warn!(
                "[Progress] task-completed {} failed: {}",
                task_id,
                error.as_deref().unwrap_or("unknown error")
            ),
            other => match serde_json::to_string(other) {
                Ok(json) => log::info!("[Progress] {}", json),
                Err(_) => log::info!("[Progress] {}", other.name()),
            },
        }
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// Reporter plus the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: &ProgressEvent) {
        // A dropped receiver only means nobody is listening
        if self.tx.send(event.clone()).is_err() {
            log::trace!("[Progress] receiver dropped, discarding {}", event.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_kebab_type() {
        let event = ProgressEvent::TaskStarted {
            wave: 1,
            task_id: TaskId(2),
            description: "Fix a.ts".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], EVENT_TASK_STARTED);
        assert_eq!(json["taskId"], 2);
        assert_eq!(event.name(), "task-started");
    }

    #[test]
    fn test_event_names_match_serde_tags() {
        let events = vec![
            ProgressEvent::WaveComplete {
                wave: 1,
                succeeded: 1,
                failed: 0,
                merged: 1,
            },
            ProgressEvent::MergeConflict {
                wave: 1,
                task_id: TaskId(1),
                files: vec!["a.rs".to_string()],
                details: "conflict".to_string(),
            },
            ProgressEvent::ResourceFallback {
                wave: 2,
                reason: "busy".to_string(),
            },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }

    #[tokio::test]
    async fn test_channel_reporter_forwards_events() {
        let (reporter, mut rx) = ChannelReporter::channel();
        reporter.report(&ProgressEvent::ResourceFallback {
            wave: 1,
            reason: "index.lock".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), EVENT_RESOURCE_FALLBACK);

        drop(rx);
        // Sending after the receiver is gone must not panic
        reporter.report(&event);
    }
}
