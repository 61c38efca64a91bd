use std::path::{Path, PathBuf};

use super::{read_proc_file, CollectError};
use crate::sample::{round_load, MetricSample};

pub const FAMILY: &str = "load";

const COLUMNS: [&str; 3] = ["one", "five", "fifteen"];

/// 1, 5 and 15 minute load averages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Reads load averages from `<procfs>/loadavg`.
#[derive(Debug)]
pub struct LoadCollector {
    hostname: String,
    path: PathBuf,
}

impl LoadCollector {
    pub fn new(hostname: &str, procfs_root: &Path) -> Self {
        Self {
            hostname: hostname.to_string(),
            path: procfs_root.join("loadavg"),
        }
    }

    pub fn collect(&self) -> Result<MetricSample, CollectError> {
        let content = read_proc_file(&self.path)?;
        let avg = parse_loadavg(&content).ok_or_else(|| CollectError::Parse {
            path: self.path.clone(),
            reason: "expected three load averages",
        })?;

        Ok(load_sample(&self.hostname, &avg))
    }
}

/// Build the load sample, rounding each average to two decimals.
pub fn load_sample(hostname: &str, avg: &LoadAverage) -> MetricSample {
    MetricSample::new(
        hostname,
        FAMILY,
        COLUMNS.to_vec(),
        vec![
            round_load(avg.one),
            round_load(avg.five),
            round_load(avg.fifteen),
        ],
    )
}

/// Parse the first three fields of `/proc/loadavg`.
///
/// Example: `0.52 0.58 0.59 2/1024 12345`.
fn parse_loadavg(content: &str) -> Option<LoadAverage> {
    let mut fields = content.split_whitespace().map(str::parse::<f64>);

    let one = fields.next()?.ok()?;
    let five = fields.next()?.ok()?;
    let fifteen = fields.next()?.ok()?;

    Some(LoadAverage { one, five, fifteen })
}
