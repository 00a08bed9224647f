// Configuration file loading

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::merger::PartialConfig;
use crate::models::MergeStrategy;
use crate::parallel::resources::ResourceLimits;
use crate::utils::project_config_path;

/// Engine configuration, passed explicitly to every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Host resource thresholds
    #[serde(default)]
    pub resources: ResourceLimits,
    /// File prediction settings
    #[serde(default)]
    pub prediction: PredictionConfig,
}

/// Execution configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum tasks running at once
    #[serde(rename = "maxParallel", alias = "max_parallel", default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Per-task timeout; the process is killed when it expires
    #[serde(rename = "timeoutSeconds", alias = "timeout_seconds", default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// How finished task branches are merged back
    #[serde(default)]
    pub strategy: MergeStrategy,
    /// Plan waves without creating worktrees or running anything
    #[serde(rename = "dryRun", alias = "dry_run", default)]
    pub dry_run: bool,
    /// Remove worktrees and branches once they are no longer needed
    #[serde(default = "default_true")]
    pub cleanup: bool,
    /// Program and arguments run in each task's worktree
    #[serde(default)]
    pub command: Vec<String>,
    /// Branch to merge into; defaults to the repository's current branch
    #[serde(rename = "targetBranch", alias = "target_branch", default)]
    pub target_branch: Option<String>,
    /// Directory for task worktrees; defaults to `<repo>.worktrees`
    #[serde(rename = "worktreeRoot", alias = "worktree_root", default)]
    pub worktree_root: Option<PathBuf>,
}

fn default_max_parallel() -> usize { 4 }
fn default_timeout_seconds() -> u64 { 300 }
fn default_true() -> bool { true }

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            timeout_seconds: default_timeout_seconds(),
            strategy: MergeStrategy::default(),
            dry_run: false,
            cleanup: default_true(),
            command: Vec::new(),
            target_branch: None,
            worktree_root: None,
        }
    }
}

/// File prediction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Predictions below this confidence are flagged in the plan
    #[serde(
        rename = "lowConfidenceThreshold",
        alias = "low_confidence_threshold",
        default = "default_low_confidence_threshold"
    )]
    pub low_confidence_threshold: f64,
}

fn default_low_confidence_threshold() -> f64 { 0.3 }

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: default_low_confidence_threshold(),
        }
    }
}

/// Reject configurations no run can use
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    if config.execution.max_parallel == 0 {
        return Err(anyhow!("maxParallel must be greater than 0"));
    }

    if config.execution.timeout_seconds == 0 {
        return Err(anyhow!("timeoutSeconds must be greater than 0"));
    }

    let threshold = config.prediction.low_confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(anyhow!(
            "lowConfidenceThreshold must be between 0 and 1, got {}",
            threshold
        ));
    }

    if !(0.0..=100.0).contains(&config.resources.max_cpu_percent) {
        return Err(anyhow!("maxCpuPercent must be between 0 and 100"));
    }

    if config.execution.command.first().is_some_and(|p| p.trim().is_empty()) {
        return Err(anyhow!("command program must not be empty"));
    }

    Ok(())
}

/// Config loader
pub struct ConfigLoader {
    /// Global config path
    global_path: Option<PathBuf>,
    /// Project config path
    project_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            global_path: Self::get_global_config_path(),
            project_path: None,
        }
    }

    /// Set the repository whose `.parallel-engine/config.toml` is read
    pub fn with_project_path(mut self, path: &Path) -> Self {
        self.project_path = Some(project_config_path(path));
        self
    }

    /// Override the global config location
    pub fn with_global_path(mut self, path: Option<PathBuf>) -> Self {
        self.global_path = path;
        self
    }

    /// Get the global config path
    fn get_global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("parallel-engine").join("config.toml"))
    }

    /// Load global config
    pub fn load_global(&self) -> Result<Option<PartialConfig>> {
        if let Some(ref path) = self.global_path {
            self.load_from_path(path)
        } else {
            Ok(None)
        }
    }

    /// Load project config
    pub fn load_project(&self) -> Result<Option<PartialConfig>> {
        if let Some(ref path) = self.project_path {
            self.load_from_path(path)
        } else {
            Ok(None)
        }
    }

    /// Load a config layer from a specific path. Only the keys present in the
    /// file are set; the layer is validated on top of the defaults.
    pub fn load_from_path(&self, path: &Path) -> Result<Option<PartialConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

        let partial: PartialConfig = toml::from_str(&contents)
            .map_err(|e| anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;

        validate_config(&partial.apply_to(&EngineConfig::default()))
            .map_err(|e| anyhow!("Invalid config file '{}': {}", path.display(), e))?;

        log::debug!("[ConfigLoader] Loaded config layer from {}", path.display());
        Ok(Some(partial))
    }

    /// Get the global config path
    pub fn global_config_path(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the project config path
    pub fn project_config_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    /// Save config to project path
    pub fn save_project(&self, config: &EngineConfig) -> Result<()> {
        if let Some(ref path) = self.project_path {
            self.save_to_path(path, config)
        } else {
            Err(anyhow!("No project config path available"))
        }
    }

    /// Save config to a specific path
    pub fn save_to_path(&self, path: &Path, config: &EngineConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    anyhow!("Failed to create config directory '{}': {}", parent.display(), e)
                })?;
            }
        }

        validate_config(config)?;

        let contents = toml::to_string_pretty(config)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, contents)
            .map_err(|e| anyhow!("Failed to write config file '{}': {}", path.display(), e))?;

        log::info!("[ConfigLoader] Saved config to: {}", path.display());
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_project_config(dir: &Path, contents: &str) {
        let config_dir = dir.join(".parallel-engine");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("config.toml"), contents).unwrap();
    }

    #[test]
    fn test_loads_global_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[execution]
maxParallel = 6
strategy = "squash"
"#,
        )
        .unwrap();

        let loader = ConfigLoader::new().with_global_path(Some(path));
        let partial = loader.load_global().unwrap().unwrap();
        let execution = partial.execution.unwrap();
        assert_eq!(execution.max_parallel, Some(6));
        assert_eq!(execution.strategy, Some(MergeStrategy::Squash));
        assert_eq!(execution.timeout_seconds, None);
    }

    #[test]
    fn test_loads_project_config_with_snake_case_keys() {
        let temp_dir = TempDir::new().unwrap();
        write_project_config(
            temp_dir.path(),
            r#"
[execution]
timeout_seconds = 60
command = ["sh", "-c", "make"]

[resources]
min_free_memory_mb = 2048

[prediction]
low_confidence_threshold = 0.5
"#,
        );

        let loader = ConfigLoader::new()
            .with_global_path(None)
            .with_project_path(temp_dir.path());
        let config = loader
            .load_project()
            .unwrap()
            .unwrap()
            .apply_to(&EngineConfig::default());

        assert_eq!(config.execution.timeout_seconds, 60);
        assert_eq!(config.execution.command, vec!["sh", "-c", "make"]);
        assert_eq!(config.resources.min_free_memory_mb, 2048);
        assert_eq!(config.resources.memory_per_task_mb, 512);
        assert_eq!(config.prediction.low_confidence_threshold, 0.5);
    }

    #[test]
    fn test_handles_missing_config_files_gracefully() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new()
            .with_global_path(Some(temp_dir.path().join("missing.toml")))
            .with_project_path(temp_dir.path());

        assert!(loader.load_global().unwrap().is_none());
        assert!(loader.load_project().unwrap().is_none());
    }

    #[test]
    fn test_validates_max_parallel_greater_than_zero() {
        let temp_dir = TempDir::new().unwrap();
        write_project_config(temp_dir.path(), "[execution]\nmaxParallel = 0\n");

        let loader = ConfigLoader::new().with_project_path(temp_dir.path());
        assert!(loader.load_project().is_err());
    }

    #[test]
    fn test_rejects_unknown_strategy_and_bad_threshold() {
        let temp_dir = TempDir::new().unwrap();
        write_project_config(temp_dir.path(), "[execution]\nstrategy = \"octopus\"\n");
        let loader = ConfigLoader::new().with_project_path(temp_dir.path());
        assert!(loader.load_project().is_err());

        write_project_config(temp_dir.path(), "[prediction]\nlowConfidenceThreshold = 1.5\n");
        assert!(loader.load_project().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new()
            .with_global_path(None)
            .with_project_path(temp_dir.path());

        let mut config = EngineConfig::default();
        config.execution.max_parallel = 2;
        config.execution.strategy = MergeStrategy::Rebase;
        config.execution.target_branch = Some("develop".to_string());
        loader.save_project(&config).unwrap();

        let reloaded = loader
            .load_project()
            .unwrap()
            .unwrap()
            .apply_to(&EngineConfig::default());
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_default_config_values() {
        let config = EngineConfig::default();

        assert_eq!(config.execution.max_parallel, 4);
        assert_eq!(config.execution.timeout_seconds, 300);
        assert_eq!(config.execution.strategy, MergeStrategy::Sequential);
        assert!(!config.execution.dry_run);
        assert!(config.execution.cleanup);
        assert!(config.execution.command.is_empty());
        assert!(validate_config(&config).is_ok());
    }
}
