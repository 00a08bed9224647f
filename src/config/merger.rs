// Configuration merging with priority

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::loader::{EngineConfig, ExecutionConfig, PredictionConfig};
use crate::models::MergeStrategy;
use crate::parallel::resources::ResourceLimits;

/// Partial configuration for merging
/// Uses Option<T> for all fields so each layer only sets what it names
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PartialConfig {
    #[serde(default)]
    pub execution: Option<PartialExecutionConfig>,
    #[serde(default)]
    pub resources: Option<PartialResourceLimits>,
    #[serde(default)]
    pub prediction: Option<PartialPredictionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartialExecutionConfig {
    #[serde(alias = "max_parallel")]
    pub max_parallel: Option<usize>,
    #[serde(alias = "timeout_seconds")]
    pub timeout_seconds: Option<u64>,
    pub strategy: Option<MergeStrategy>,
    #[serde(alias = "dry_run")]
    pub dry_run: Option<bool>,
    pub cleanup: Option<bool>,
    pub command: Option<Vec<String>>,
    #[serde(alias = "target_branch")]
    pub target_branch: Option<String>,
    #[serde(alias = "worktree_root")]
    pub worktree_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartialResourceLimits {
    #[serde(alias = "max_cpu_percent")]
    pub max_cpu_percent: Option<f32>,
    #[serde(alias = "min_free_memory_mb")]
    pub min_free_memory_mb: Option<u64>,
    #[serde(alias = "memory_per_task_mb")]
    pub memory_per_task_mb: Option<u64>,
    #[serde(alias = "min_free_disk_mb")]
    pub min_free_disk_mb: Option<u64>,
    #[serde(alias = "disk_per_task_mb")]
    pub disk_per_task_mb: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartialPredictionConfig {
    #[serde(alias = "low_confidence_threshold")]
    pub low_confidence_threshold: Option<f64>,
}

impl PartialConfig {
    /// Overlay the fields this layer sets onto `base`
    pub fn apply_to(&self, base: &EngineConfig) -> EngineConfig {
        EngineConfig {
            execution: self
                .execution
                .as_ref()
                .map(|p| p.apply_to(&base.execution))
                .unwrap_or_else(|| base.execution.clone()),
            resources: self
                .resources
                .as_ref()
                .map(|p| p.apply_to(&base.resources))
                .unwrap_or_else(|| base.resources.clone()),
            prediction: self
                .prediction
                .as_ref()
                .map(|p| p.apply_to(&base.prediction))
                .unwrap_or_else(|| base.prediction.clone()),
        }
    }
}

impl PartialExecutionConfig {
    fn apply_to(&self, base: &ExecutionConfig) -> ExecutionConfig {
        ExecutionConfig {
            max_parallel: self.max_parallel.unwrap_or(base.max_parallel),
            timeout_seconds: self.timeout_seconds.unwrap_or(base.timeout_seconds),
            strategy: self.strategy.unwrap_or(base.strategy),
            dry_run: self.dry_run.unwrap_or(base.dry_run),
            cleanup: self.cleanup.unwrap_or(base.cleanup),
            command: self.command.clone().unwrap_or_else(|| base.command.clone()),
            target_branch: self.target_branch.clone().or_else(|| base.target_branch.clone()),
            worktree_root: self.worktree_root.clone().or_else(|| base.worktree_root.clone()),
        }
    }
}

impl PartialResourceLimits {
    fn apply_to(&self, base: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            max_cpu_percent: self.max_cpu_percent.unwrap_or(base.max_cpu_percent),
            min_free_memory_mb: self.min_free_memory_mb.unwrap_or(base.min_free_memory_mb),
            memory_per_task_mb: self.memory_per_task_mb.unwrap_or(base.memory_per_task_mb),
            min_free_disk_mb: self.min_free_disk_mb.unwrap_or(base.min_free_disk_mb),
            disk_per_task_mb: self.disk_per_task_mb.unwrap_or(base.disk_per_task_mb),
        }
    }
}

impl PartialPredictionConfig {
    fn apply_to(&self, base: &PredictionConfig) -> PredictionConfig {
        PredictionConfig {
            low_confidence_threshold: self
                .low_confidence_threshold
                .unwrap_or(base.low_confidence_threshold),
        }
    }
}

/// Configuration merger
/// Priority order: CLI -> Project -> Global -> Defaults
pub struct ConfigMerger {
    defaults: EngineConfig,
    global: Option<PartialConfig>,
    project: Option<PartialConfig>,
    cli: Option<PartialConfig>,
}

impl ConfigMerger {
    /// Create a new config merger with defaults
    pub fn new() -> Self {
        Self {
            defaults: EngineConfig::default(),
            global: None,
            project: None,
            cli: None,
        }
    }

    /// Set global config
    pub fn with_global(mut self, config: Option<PartialConfig>) -> Self {
        self.global = config;
        self
    }

    /// Set project config
    pub fn with_project(mut self, config: Option<PartialConfig>) -> Self {
        self.project = config;
        self
    }

    /// Set CLI overrides
    pub fn with_cli(mut self, config: Option<PartialConfig>) -> Self {
        self.cli = config;
        self
    }

    /// Merge all layers with priority
    pub fn merge(&self) -> EngineConfig {
        [&self.global, &self.project, &self.cli]
            .into_iter()
            .flatten()
            .fold(self.defaults.clone(), |config, layer| layer.apply_to(&config))
    }
}

impl Default for ConfigMerger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(partial: PartialExecutionConfig) -> Option<PartialConfig> {
        Some(PartialConfig {
            execution: Some(partial),
            ..Default::default()
        })
    }

    #[test]
    fn test_defaults_only() {
        assert_eq!(ConfigMerger::new().merge(), EngineConfig::default());
    }

    #[test]
    fn test_priority_order() {
        let global = execution(PartialExecutionConfig {
            max_parallel: Some(8),
            timeout_seconds: Some(120),
            strategy: Some(MergeStrategy::Squash),
            ..Default::default()
        });
        let project = execution(PartialExecutionConfig {
            max_parallel: Some(2),
            ..Default::default()
        });
        let cli = execution(PartialExecutionConfig {
            strategy: Some(MergeStrategy::Rebase),
            ..Default::default()
        });

        let config = ConfigMerger::new()
            .with_global(global)
            .with_project(project)
            .with_cli(cli)
            .merge();

        assert_eq!(config.execution.max_parallel, 2);
        assert_eq!(config.execution.timeout_seconds, 120);
        assert_eq!(config.execution.strategy, MergeStrategy::Rebase);
        assert!(config.execution.cleanup);
    }

    #[test]
    fn test_project_layer_does_not_reset_global_values() {
        let global = Some(PartialConfig {
            resources: Some(PartialResourceLimits {
                min_free_disk_mb: Some(4096),
                ..Default::default()
            }),
            ..Default::default()
        });
        let project = Some(PartialConfig {
            resources: Some(PartialResourceLimits {
                max_cpu_percent: Some(75.0),
                ..Default::default()
            }),
            ..Default::default()
        });

        let config = ConfigMerger::new().with_global(global).with_project(project).merge();
        assert_eq!(config.resources.min_free_disk_mb, 4096);
        assert_eq!(config.resources.max_cpu_percent, 75.0);
        assert_eq!(config.resources.disk_per_task_mb, 256);
    }

    #[test]
    fn test_cli_false_overrides_true() {
        let cli = execution(PartialExecutionConfig {
            cleanup: Some(false),
            dry_run: Some(true),
            ..Default::default()
        });
        let config = ConfigMerger::new().with_cli(cli).merge();
        assert!(!config.execution.cleanup);
        assert!(config.execution.dry_run);
    }
}
