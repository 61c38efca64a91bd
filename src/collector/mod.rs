//! Host metric collectors.
//!
//! Each collector queries one metric family from the operating system and
//! turns it into a single [`MetricSample`]. Collectors run sequentially in the
//! order returned by [`from_config`].

pub mod cpu;
pub mod filesystem;
pub mod load;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::sample::MetricSample;

use self::cpu::{CpuCollector, CpuSampler, SAMPLE_INTERVAL};
use self::filesystem::FilesystemCollector;
use self::load::LoadCollector;
use self::memory::MemoryCollector;

/// Errors returned by a collector.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("reading {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: &'static str },

    #[error("unable to get filesystem usage for {path}")]
    Filesystem {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cpu sampler failed")]
    Sampler(#[source] Arc<CollectError>),

    #[error("cpu sampler stopped")]
    SamplerStopped,
}

/// A metric family collector.
///
/// Uses enum dispatch so the async CPU collector and the synchronous procfs
/// collectors share one call site in the scheduler.
#[derive(Debug)]
pub enum Collector {
    Load(LoadCollector),
    Cpu(CpuCollector),
    Memory(MemoryCollector),
    Filesystem(FilesystemCollector),
}

impl Collector {
    /// Returns the metric family name, used as the sample name suffix.
    pub fn family(&self) -> &'static str {
        match self {
            Self::Load(_) => load::FAMILY,
            Self::Cpu(_) => cpu::FAMILY,
            Self::Memory(_) => memory::FAMILY,
            Self::Filesystem(_) => filesystem::FAMILY,
        }
    }

    /// Collect one sample.
    ///
    /// The CPU collector may wait for its background sampler to publish.
    pub async fn collect(&mut self) -> Result<MetricSample, CollectError> {
        match self {
            Self::Load(c) => c.collect(),
            Self::Cpu(c) => c.collect().await,
            Self::Memory(c) => c.collect(),
            Self::Filesystem(c) => c.collect(),
        }
    }
}

/// Build the enabled collectors in their fixed order: load, cpu, memory,
/// filesystem.
///
/// Starts the CPU sampler when CPU collection is enabled, so this must run
/// inside a tokio runtime.
pub fn from_config(cfg: &Config, hostname: &str) -> Vec<Collector> {
    let mut collectors = Vec::with_capacity(4);
    let metrics = &cfg.metrics;

    if metrics.load {
        collectors.push(Collector::Load(LoadCollector::new(
            hostname,
            &cfg.procfs_root,
        )));
    }

    if metrics.cpu {
        let stat_path = cfg.procfs_root.join("stat");
        let sampler = CpuSampler::spawn(SAMPLE_INTERVAL, move || cpu::read_cpu_times(&stat_path));
        collectors.push(Collector::Cpu(CpuCollector::new(hostname, sampler)));
    }

    if metrics.memory {
        collectors.push(Collector::Memory(MemoryCollector::new(
            hostname,
            &cfg.procfs_root,
        )));
    }

    if !metrics.filesystem.is_empty() {
        collectors.push(Collector::Filesystem(FilesystemCollector::new(
            hostname,
            &metrics.filesystem,
        )));
    }

    let families: Vec<&str> = collectors.iter().map(Collector::family).collect();
    info!(?families, "collectors configured");

    collectors
}

/// Read a procfs file, mapping failures to [`CollectError::Read`].
pub(crate) fn read_proc_file(path: &std::path::Path) -> Result<String, CollectError> {
    std::fs::read_to_string(path).map_err(|source| CollectError::Read {
        path: path.to_path_buf(),
        source,
    })
}
