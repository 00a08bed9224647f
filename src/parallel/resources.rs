// Host capacity and repository state sampling to bound wave concurrency

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use sysinfo::System;

use crate::git::GitManager;
use crate::utils::lock_mutex_recover;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Resource thresholds applied before every wave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceLimits {
    /// CPU usage (0-100) above which waves run one task at a time
    #[serde(alias = "max_cpu_percent")]
    pub max_cpu_percent: f32,
    /// Free memory floor; below it parallel execution is refused
    #[serde(alias = "min_free_memory_mb")]
    pub min_free_memory_mb: u64,
    /// Expected memory footprint of one task
    #[serde(alias = "memory_per_task_mb")]
    pub memory_per_task_mb: u64,
    /// Free disk floor on the repository's filesystem
    #[serde(alias = "min_free_disk_mb")]
    pub min_free_disk_mb: u64,
    /// Expected disk footprint of one worktree
    #[serde(alias = "disk_per_task_mb")]
    pub disk_per_task_mb: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_cpu_percent: 90.0,
            min_free_memory_mb: 512,
            memory_per_task_mb: 512,
            min_free_disk_mb: 1024,
            disk_per_task_mb: 256,
        }
    }
}

/// Raw host measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSample {
    pub cpu_count: usize,
    /// Average usage over all cores (0-100)
    pub cpu_usage_percent: f32,
    pub total_memory_mb: u64,
    pub available_memory_mb: u64,
    /// `None` when the filesystem could not be queried
    pub available_disk_mb: Option<u64>,
}

/// Source of host measurements
pub trait ResourceProbe: Send + Sync {
    fn sample(&self, repo_path: &Path) -> HostSample;
}

/// Probe backed by sysinfo (CPU, memory) and fs2 (disk)
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime the first one
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SystemProbe {
    fn sample(&self, repo_path: &Path) -> HostSample {
        let mut system = lock_mutex_recover(&self.system);
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu_count = system.cpus().len().max(1);
        let cpu_usage_percent =
            system.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / cpu_count as f32;

        let available_disk_mb = match fs2::available_space(repo_path) {
            Ok(bytes) => Some(bytes / BYTES_PER_MB),
            Err(e) => {
                log::warn!("[ResourceMonitor] Could not query free disk space: {}", e);
                None
            }
        };

        HostSample {
            cpu_count,
            cpu_usage_percent,
            total_memory_mb: system.total_memory() / BYTES_PER_MB,
            available_memory_mb: system.available_memory() / BYTES_PER_MB,
            available_disk_mb,
        }
    }
}

/// Probe returning the same sample every time
#[derive(Debug, Clone)]
pub struct FixedProbe(pub HostSample);

impl FixedProbe {
    /// A roomy idle host
    pub fn idle(cpu_count: usize) -> Self {
        Self(HostSample {
            cpu_count,
            cpu_usage_percent: 0.0,
            total_memory_mb: 64 * 1024,
            available_memory_mb: 64 * 1024,
            available_disk_mb: Some(1024 * 1024),
        })
    }
}

impl ResourceProbe for FixedProbe {
    fn sample(&self, _repo_path: &Path) -> HostSample {
        self.0.clone()
    }
}

/// Result of checking one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCheck {
    /// False when this resource is a hard gate against parallel execution
    pub ok: bool,
    /// Concurrency this resource can sustain, if it limits concurrency at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency_bound: Option<usize>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerResourceStatus {
    pub cpu: ResourceCheck,
    pub memory: ResourceCheck,
    pub disk: ResourceCheck,
    pub repository: ResourceCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStatus {
    pub can_parallelize: bool,
    pub recommended_concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Snapshot of capacity taken right before a wave starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    pub overall: OverallStatus,
    pub per_resource: PerResourceStatus,
    pub sample: HostSample,
}

/// Computes a concurrency bound for the next wave; never caches
pub struct ResourceMonitor {
    repo_path: PathBuf,
    max_parallel: usize,
    limits: ResourceLimits,
    probe: Arc<dyn ResourceProbe>,
}

impl ResourceMonitor {
    pub fn new(
        repo_path: impl Into<PathBuf>,
        max_parallel: usize,
        limits: ResourceLimits,
        probe: Arc<dyn ResourceProbe>,
    ) -> Self {
        Self {
            repo_path: repo_path.into(),
            max_parallel: max_parallel.max(1),
            limits,
            probe,
        }
    }

    /// Sample the host and repository and derive the wave's concurrency.
    /// Hard gates are reported in the status, never as errors.
    pub fn get_status(&self, wave_size: usize) -> ResourceStatus {
        let sample = self.probe.sample(&self.repo_path);

        let per_resource = PerResourceStatus {
            cpu: self.check_cpu(&sample),
            memory: self.check_memory(&sample),
            disk: self.check_disk(&sample),
            repository: self.check_repository(),
        };

        let gates = [
            &per_resource.repository,
            &per_resource.memory,
            &per_resource.disk,
        ];
        let blocked: Vec<&str> = gates
            .iter()
            .filter(|check| !check.ok)
            .map(|check| check.detail.as_str())
            .collect();

        let overall = if !blocked.is_empty() {
            OverallStatus {
                can_parallelize: false,
                recommended_concurrency: 1,
                reason: Some(blocked.join("; ")),
            }
        } else {
            self.bounded_concurrency(&per_resource, wave_size)
        };

        if overall.can_parallelize {
            log::debug!(
                "[ResourceMonitor] Recommended concurrency {} for wave of {}",
                overall.recommended_concurrency,
                wave_size
            );
        } else {
            log::info!(
                "[ResourceMonitor] Sequential execution for wave of {}: {}",
                wave_size,
                overall.reason.as_deref().unwrap_or("no reason")
            );
        }

        ResourceStatus {
            overall,
            per_resource,
            sample,
        }
    }

    fn bounded_concurrency(&self, per_resource: &PerResourceStatus, wave_size: usize) -> OverallStatus {
        let mut recommended = self.max_parallel;
        let mut limited_by = "max_parallel";

        let candidates = [
            ("cpu", per_resource.cpu.concurrency_bound),
            ("memory", per_resource.memory.concurrency_bound),
            ("disk", per_resource.disk.concurrency_bound),
            ("wave size", Some(wave_size)),
        ];
        for (name, bound) in candidates {
            if let Some(bound) = bound {
                if bound < recommended {
                    recommended = bound;
                    limited_by = name;
                }
            }
        }

        let recommended = recommended.max(1);
        let can_parallelize = recommended > 1;
        let reason = if can_parallelize {
            None
        } else if limited_by == "wave size" {
            Some("wave contains a single task".to_string())
        } else if limited_by == "max_parallel" {
            Some("max_parallel is 1".to_string())
        } else {
            Some(format!("concurrency limited to 1 by {}", limited_by))
        };

        OverallStatus {
            can_parallelize,
            recommended_concurrency: recommended,
            reason,
        }
    }

    fn check_cpu(&self, sample: &HostSample) -> ResourceCheck {
        let usage = sample.cpu_usage_percent.clamp(0.0, 100.0);
        if usage >= self.limits.max_cpu_percent {
            return ResourceCheck {
                ok: true,
                concurrency_bound: Some(1),
                detail: format!(
                    "CPU at {:.0}% (limit {:.0}%)",
                    usage, self.limits.max_cpu_percent
                ),
            };
        }

        let idle_cores = sample.cpu_count as f32 * (1.0 - usage / 100.0);
        ResourceCheck {
            ok: true,
            concurrency_bound: Some((idle_cores.floor() as usize).max(1)),
            detail: format!("{} cores at {:.0}%", sample.cpu_count, usage),
        }
    }

    fn check_memory(&self, sample: &HostSample) -> ResourceCheck {
        let available = sample.available_memory_mb;
        if available < self.limits.min_free_memory_mb {
            return ResourceCheck {
                ok: false,
                concurrency_bound: Some(1),
                detail: format!(
                    "only {} MB memory free (minimum {} MB)",
                    available, self.limits.min_free_memory_mb
                ),
            };
        }

        let spare = available - self.limits.min_free_memory_mb;
        let bound = (spare / self.limits.memory_per_task_mb.max(1)) as usize;
        ResourceCheck {
            ok: true,
            concurrency_bound: Some(bound.max(1)),
            detail: format!("{} MB of {} MB free", available, sample.total_memory_mb),
        }
    }

    fn check_disk(&self, sample: &HostSample) -> ResourceCheck {
        let Some(available) = sample.available_disk_mb else {
            return ResourceCheck {
                ok: true,
                concurrency_bound: None,
                detail: "free disk space unknown".to_string(),
            };
        };

        if available < self.limits.min_free_disk_mb {
            return ResourceCheck {
                ok: false,
                concurrency_bound: Some(1),
                detail: format!(
                    "only {} MB disk free (minimum {} MB)",
                    available, self.limits.min_free_disk_mb
                ),
            };
        }

        let spare = available - self.limits.min_free_disk_mb;
        let bound = (spare / self.limits.disk_per_task_mb.max(1)) as usize;
        ResourceCheck {
            ok: true,
            concurrency_bound: Some(bound.max(1)),
            detail: format!("{} MB disk free", available),
        }
    }

    fn check_repository(&self) -> ResourceCheck {
        match GitManager::new(&self.repo_path) {
            Ok(git) => match git.repository_busy() {
                Some(reason) => ResourceCheck {
                    ok: false,
                    concurrency_bound: Some(1),
                    detail: format!("repository busy: {}", reason),
                },
                None => ResourceCheck {
                    ok: true,
                    concurrency_bound: None,
                    detail: "repository idle".to_string(),
                },
            },
            Err(e) => ResourceCheck {
                ok: false,
                concurrency_bound: Some(1),
                detail: format!("repository unavailable: {}", e.message()),
            },
        }
    }
}
