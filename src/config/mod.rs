// Layered configuration system

pub mod loader;
pub mod merger;

// Re-export main types
pub use loader::{validate_config, ConfigLoader, EngineConfig, ExecutionConfig, PredictionConfig};
pub use merger::{
    ConfigMerger, PartialConfig, PartialExecutionConfig, PartialPredictionConfig,
    PartialResourceLimits,
};

use anyhow::Result;
use std::path::Path;

/// Load and merge configuration from all sources
/// Priority: CLI -> Project -> Global -> Defaults
pub fn load_merged_config(
    project_path: Option<&Path>,
    cli_overrides: Option<PartialConfig>,
) -> Result<EngineConfig> {
    let loader = match project_path {
        Some(path) => ConfigLoader::new().with_project_path(path),
        None => ConfigLoader::new(),
    };
    merge_with_loader(&loader, cli_overrides)
}

/// Merge the layers a specific loader finds with CLI overrides
pub fn merge_with_loader(
    loader: &ConfigLoader,
    cli_overrides: Option<PartialConfig>,
) -> Result<EngineConfig> {
    let config = ConfigMerger::new()
        .with_global(loader.load_global()?)
        .with_project(loader.load_project()?)
        .with_cli(cli_overrides)
        .merge();

    validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn isolated_loader(project: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_global_path(None)
            .with_project_path(project)
    }

    #[test]
    fn test_merged_config_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = merge_with_loader(&isolated_loader(temp_dir.path()), None).unwrap();

        assert_eq!(config.execution.max_parallel, 4);
        assert_eq!(config.execution.timeout_seconds, 300);
    }

    #[test]
    fn test_merged_config_with_global_and_project() {
        let temp_dir = TempDir::new().unwrap();
        let global_path = temp_dir.path().join("global.toml");
        fs::write(&global_path, "[execution]\nmaxParallel = 8\ntimeoutSeconds = 90\n").unwrap();

        let config_dir = temp_dir.path().join(".parallel-engine");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("config.toml"), "[execution]\nmax_parallel = 5\n").unwrap();

        let loader = ConfigLoader::new()
            .with_global_path(Some(global_path))
            .with_project_path(temp_dir.path());
        let config = merge_with_loader(&loader, None).unwrap();

        assert_eq!(config.execution.max_parallel, 5);
        assert_eq!(config.execution.timeout_seconds, 90);
    }

    #[test]
    fn test_merged_config_with_cli_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let cli = PartialConfig {
            execution: Some(PartialExecutionConfig {
                max_parallel: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = merge_with_loader(&isolated_loader(temp_dir.path()), Some(cli)).unwrap();
        assert_eq!(config.execution.max_parallel, 10);
    }

    #[test]
    fn test_invalid_cli_override_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let cli = PartialConfig {
            execution: Some(PartialExecutionConfig {
                timeout_seconds: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(merge_with_loader(&isolated_loader(temp_dir.path()), Some(cli)).is_err());
    }
}
