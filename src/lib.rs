// Clippy allows for reasonable defaults
// These suppress warnings where the suggested change doesn't improve readability
#![allow(clippy::new_without_default)] // Default not always appropriate for stateful types
#![allow(clippy::derivable_impls)] // Explicit Default impls can be clearer
#![allow(clippy::field_reassign_with_default)] // Builder pattern is clearer
#![allow(clippy::needless_borrow)] // Explicit borrows can clarify ownership
#![allow(clippy::clone_on_copy)] // .clone() can be clearer than implicit copy
#![allow(clippy::collapsible_if)] // Separate ifs can be more readable
#![allow(clippy::needless_borrows_for_generic_args)] // Explicit borrows clarify intent

//! Wave-based parallel execution of development tasks in isolated git worktrees.
//!
//! Task descriptions are analyzed for dependencies, their file footprints are
//! predicted, overlapping tasks are split into separate waves, and every wave
//! runs concurrently (bounded by host resources) before its branches are merged
//! back into the target branch.

// Module declarations
pub mod analysis;
pub mod config;
pub mod error;
pub mod events;
pub mod git;
pub mod models;
pub mod parallel;
pub mod utils;

// Re-export the types most callers need
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use events::{ChannelReporter, LogReporter, NoopReporter, ProgressEvent, ProgressReporter};
pub use models::*;
pub use parallel::{ParallelEngine, RunPlan, RunReport, WaveReport};
