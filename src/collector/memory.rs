use std::path::{Path, PathBuf};

use super::{read_proc_file, CollectError};
use crate::sample::{truncated_percent, MetricSample};

pub const FAMILY: &str = "memory";

/// Memory totals in bytes.
///
/// Reclaimable page cache counts as free, so `actual_used` is what
/// applications really hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemStats {
    pub total: u64,
    pub actual_used: u64,
}

/// Reads memory usage from `<procfs>/meminfo`.
#[derive(Debug)]
pub struct MemoryCollector {
    hostname: String,
    path: PathBuf,
}

impl MemoryCollector {
    pub fn new(hostname: &str, procfs_root: &Path) -> Self {
        Self {
            hostname: hostname.to_string(),
            path: procfs_root.join("meminfo"),
        }
    }

    pub fn collect(&self) -> Result<MetricSample, CollectError> {
        let content = read_proc_file(&self.path)?;
        let stats = parse_meminfo(&content).ok_or_else(|| CollectError::Parse {
            path: self.path.clone(),
            reason: "missing MemTotal",
        })?;

        Ok(memory_sample(&self.hostname, &stats))
    }
}

/// Build the memory sample: truncated percentage of memory actually used.
pub fn memory_sample(hostname: &str, stats: &MemStats) -> MetricSample {
    MetricSample::new(
        hostname,
        FAMILY,
        vec!["percent"],
        vec![truncated_percent(stats.actual_used, stats.total)],
    )
}

/// Parse `/proc/meminfo`.
///
/// Uses `MemAvailable` as the free figure when the kernel provides it (3.14+),
/// otherwise `MemFree + Buffers + Cached`.
fn parse_meminfo(content: &str) -> Option<MemStats> {
    let mut total = None;
    let mut free = 0u64;
    let mut buffers = 0u64;
    let mut cached = 0u64;
    let mut available = None;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kib) = rest
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok())
        else {
            continue;
        };
        let bytes = kib.saturating_mul(1024);

        match key.trim() {
            "MemTotal" => total = Some(bytes),
            "MemFree" => free = bytes,
            "Buffers" => buffers = bytes,
            "Cached" => cached = bytes,
            "MemAvailable" => available = Some(bytes),
            _ => {}
        }
    }

    let total = total?;
    let actual_free =
        available.unwrap_or_else(|| free.saturating_add(buffers).saturating_add(cached));

    Some(MemStats {
        total,
        actual_used: total.saturating_sub(actual_free),
    })
}
