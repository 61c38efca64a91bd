use std::ffi::CString;
use std::io;

use super::CollectError;
use crate::sample::{truncated_percent, MetricSample};

pub const FAMILY: &str = "disk";

/// Space usage of one filesystem, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsUsage {
    pub total: u64,
    pub free: u64,
    pub used: u64,
}

/// Reports usage of the filesystem holding a configured path.
#[derive(Debug)]
pub struct FilesystemCollector {
    hostname: String,
    path: String,
}

impl FilesystemCollector {
    pub fn new(hostname: &str, path: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            path: path.to_string(),
        }
    }

    /// Query the filesystem. Blocks for as long as `statvfs(2)` does, which
    /// can be indefinitely on an unresponsive network mount.
    pub fn collect(&self) -> Result<MetricSample, CollectError> {
        let usage = statvfs(&self.path).map_err(|source| CollectError::Filesystem {
            path: self.path.clone(),
            source,
        })?;

        Ok(filesystem_sample(&self.hostname, &usage))
    }
}

/// Build the filesystem sample: truncated percentage of blocks in use.
pub fn filesystem_sample(hostname: &str, usage: &FsUsage) -> MetricSample {
    MetricSample::new(
        hostname,
        FAMILY,
        vec!["percent"],
        vec![truncated_percent(usage.used, usage.total)],
    )
}

/// Query space usage for the filesystem containing `path`.
#[allow(clippy::unnecessary_cast)]
pub fn statvfs(path: &str) -> io::Result<FsUsage> {
    let c_path = CString::new(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // SAFETY: statvfs is plain old data, so an all-zero value is valid.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: `c_path` is NUL-terminated and `stat` is a valid out pointer.
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let block_size = stat.f_frsize as u64;
    let total = (stat.f_blocks as u64).saturating_mul(block_size);
    let free = (stat.f_bfree as u64).saturating_mul(block_size);

    Ok(FsUsage {
        total,
        free,
        used: total.saturating_sub(free),
    })
}
