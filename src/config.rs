use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for the sysstatsd agent.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Collection interval. Default: 1s.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Graphite server address (host:port). Empty logs lines to the console.
    #[serde(default)]
    pub server: String,

    /// Which metric families to collect.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Mount point of procfs. Default: "/proc".
    #[serde(default = "default_procfs_root")]
    pub procfs_root: PathBuf,
}

/// Metric family selection.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Send 1/5/15-minute load averages.
    #[serde(default)]
    pub load: bool,

    /// Send CPU utilization percentages.
    #[serde(default)]
    pub cpu: bool,

    /// Send memory usage percentage.
    #[serde(default)]
    pub memory: bool,

    /// Send usage percentage for the filesystem holding this path.
    /// Empty disables the filesystem collector.
    #[serde(default)]
    pub filesystem: String,
}

// --- Default value functions ---

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_procfs_root() -> PathBuf {
    PathBuf::from("/proc")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            server: String::new(),
            metrics: MetricsConfig::default(),
            procfs_root: default_procfs_root(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file without validating it.
    ///
    /// Command-line overrides are applied by the caller before [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if !self.metrics.any_enabled() {
            bail!("you must specify at least one of CPU, Load, Memory and Filesystem to output");
        }

        if self.interval.is_zero() {
            bail!("interval must be positive");
        }

        if self.procfs_root.as_os_str().is_empty() {
            bail!("procfs_root must not be empty");
        }

        Ok(())
    }

    /// Whether a Graphite server is configured.
    pub fn has_server(&self) -> bool {
        !self.server.is_empty()
    }
}

impl MetricsConfig {
    /// Whether at least one metric family is selected.
    pub fn any_enabled(&self) -> bool {
        self.load || self.cpu || self.memory || !self.filesystem.is_empty()
    }
}
