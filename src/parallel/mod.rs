// Wave scheduling, isolated execution and merging

pub mod engine;
pub mod executor;
pub mod merge;
pub mod overlap;
pub mod resources;
pub mod worktrees;

// Re-export for convenience
pub use engine::{ParallelEngine, PlanWarning, PlannedWave, RunPlan, RunReport, WaveReport};
pub use executor::{ParallelExecutor, TaskCommand, TaskExecution};
pub use merge::{CompletedWork, MergeOrchestrator, MergeOrchestratorResult};
pub use overlap::{classify_severity, GreedyFirstFit, GroupingStrategy, OverlapDetector, ParallelCheck};
pub use resources::{
    FixedProbe, HostSample, OverallStatus, PerResourceStatus, ResourceCheck, ResourceLimits,
    ResourceMonitor, ResourceProbe, ResourceStatus, SystemProbe,
};
pub use worktrees::{WorktreeLease, WorktreeManager, BRANCH_PREFIX};
