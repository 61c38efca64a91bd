//! CPU utilization.
//!
//! `/proc/stat` only exposes cumulative tick counters, so a background
//! [`CpuSampler`] reads them on a fixed short cadence and publishes the
//! difference between consecutive reads. The collector consumes the newest
//! published sample through a single-slot `watch` mailbox and converts it into
//! truncated percentages.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{read_proc_file, CollectError};
use crate::sample::{truncated_percent, MetricSample};

pub const FAMILY: &str = "cpu";

/// How often the sampler differentiates the cumulative counters.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

const COLUMNS: [&str; 4] = ["user", "sys", "wait", "idle"];

/// Aggregate CPU time per category, in clock ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub sys: u64,
    pub idle: u64,
    pub wait: u64,
    pub irq: u64,
    pub soft_irq: u64,
    pub stolen: u64,
}

impl CpuTimes {
    /// Sum of every category.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.sys
            + self.idle
            + self.wait
            + self.irq
            + self.soft_irq
            + self.stolen
    }

    /// Time spent in each category since `previous`.
    ///
    /// Counters that went backwards (CPU hotplug) saturate at zero.
    pub fn delta(&self, previous: &CpuTimes) -> CpuTimes {
        CpuTimes {
            user: self.user.saturating_sub(previous.user),
            nice: self.nice.saturating_sub(previous.nice),
            sys: self.sys.saturating_sub(previous.sys),
            idle: self.idle.saturating_sub(previous.idle),
            wait: self.wait.saturating_sub(previous.wait),
            irq: self.irq.saturating_sub(previous.irq),
            soft_irq: self.soft_irq.saturating_sub(previous.soft_irq),
            stolen: self.stolen.saturating_sub(previous.stolen),
        }
    }
}

/// Read the aggregate `cpu` line from a `/proc/stat` file.
pub fn read_cpu_times(path: &Path) -> Result<CpuTimes, CollectError> {
    let content = read_proc_file(path)?;
    parse_proc_stat(&content).ok_or_else(|| CollectError::Parse {
        path: path.to_path_buf(),
        reason: "missing aggregate cpu line",
    })
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// Older kernels omit trailing columns; missing ones read as zero.
fn parse_proc_stat(content: &str) -> Option<CpuTimes> {
    let line = content
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))?;

    let mut values = [0u64; 8];
    let mut count = 0;
    for (slot, field) in values.iter_mut().zip(line.split_whitespace().skip(1)) {
        *slot = field.parse().ok()?;
        count += 1;
    }

    // user, nice, system, idle are present on every kernel.
    if count < 4 {
        return None;
    }

    let [user, nice, sys, idle, wait, irq, soft_irq, stolen] = values;
    Some(CpuTimes {
        user,
        nice,
        sys,
        idle,
        wait,
        irq,
        soft_irq,
        stolen,
    })
}

/// What the sampler last published.
type Published = Option<Result<CpuTimes, Arc<CollectError>>>;

/// Background task publishing CPU time deltas.
///
/// The first publication is the cumulative counters since boot, every later
/// one is the delta over [`SAMPLE_INTERVAL`]. A failed read is published as
/// the final value and ends the task. The task also stops when the sampler is
/// dropped.
#[derive(Debug)]
pub struct CpuSampler {
    rx: watch::Receiver<Published>,
    cancel: CancellationToken,
}

impl CpuSampler {
    /// Spawn the sampling task on the current tokio runtime.
    pub fn spawn<F>(period: Duration, mut read: F) -> Self
    where
        F: FnMut() -> Result<CpuTimes, CollectError> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut previous: Option<CpuTimes> = None;

            // Returns false once a read has failed and the task must stop.
            let mut sample_once = |previous: &mut Option<CpuTimes>| match read() {
                Ok(current) => {
                    let sample = match previous {
                        Some(prev) => current.delta(prev),
                        None => current,
                    };
                    *previous = Some(current);
                    tx.send_replace(Some(Ok(sample)));
                    true
                }
                Err(e) => {
                    error!(error = %e, "cpu sample failed, stopping sampler");
                    tx.send_replace(Some(Err(Arc::new(e))));
                    false
                }
            };

            if !sample_once(&mut previous) {
                return;
            }

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        debug!("cpu sampler stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !sample_once(&mut previous) {
                            break;
                        }
                    }
                }
            }
        });

        Self { rx, cancel }
    }

    /// Take the newest sample, waiting if none was published since the last
    /// call.
    ///
    /// Returns the sampler's read error once it has failed.
    pub async fn next(&mut self) -> Result<CpuTimes, CollectError> {
        let fresh = match self.rx.has_changed() {
            Ok(fresh) => fresh,
            Err(_) => return Err(self.stopped()),
        };

        if !fresh && self.rx.changed().await.is_err() {
            return Err(self.stopped());
        }

        let published = self.rx.borrow_and_update().clone();
        match published {
            Some(Ok(times)) => Ok(times),
            Some(Err(e)) => Err(CollectError::Sampler(e)),
            None => Err(CollectError::SamplerStopped),
        }
    }

    /// The error to report once the sampling task has exited.
    fn stopped(&self) -> CollectError {
        match &*self.rx.borrow() {
            Some(Err(e)) => CollectError::Sampler(Arc::clone(e)),
            _ => CollectError::SamplerStopped,
        }
    }
}

impl Drop for CpuSampler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Reports user/sys/wait/idle percentages from the sampler.
#[derive(Debug)]
pub struct CpuCollector {
    hostname: String,
    sampler: CpuSampler,
}

impl CpuCollector {
    pub fn new(hostname: &str, sampler: CpuSampler) -> Self {
        Self {
            hostname: hostname.to_string(),
            sampler,
        }
    }

    pub async fn collect(&mut self) -> Result<MetricSample, CollectError> {
        let times = self.sampler.next().await?;
        Ok(cpu_sample(&self.hostname, &times))
    }
}

/// Build the CPU sample. Each percentage is truncated on its own, so the
/// four need not add up to 100.
pub fn cpu_sample(hostname: &str, times: &CpuTimes) -> MetricSample {
    let total = times.total();

    MetricSample::new(
        hostname,
        FAMILY,
        COLUMNS.to_vec(),
        vec![
            truncated_percent(times.user, total),
            truncated_percent(times.sys, total),
            truncated_percent(times.wait, total),
            truncated_percent(times.idle, total),
        ],
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    const PROC_STAT: &str = "\
cpu  10132153 290696 3084719 46828483 16683 0 25195 0 0 0
cpu0 1393280 32966 572056 13343292 6130 0 17875 0 0 0
intr 199292 0 0 0
ctxt 2389
";

    fn times(user: u64, sys: u64, idle: u64, wait: u64) -> CpuTimes {
        CpuTimes {
            user,
            sys,
            idle,
            wait,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_proc_stat() {
        let t = parse_proc_stat(PROC_STAT).expect("valid");
        assert_eq!(
            t,
            CpuTimes {
                user: 10132153,
                nice: 290696,
                sys: 3084719,
                idle: 46828483,
                wait: 16683,
                irq: 0,
                soft_irq: 25195,
                stolen: 0,
            }
        );
    }

    #[test]
    fn test_parse_proc_stat_short_line() {
        let t = parse_proc_stat("cpu 1 2 3 4\n").expect("valid");
        assert_eq!(t.idle, 4);
        assert_eq!(t.wait, 0);
        assert_eq!(t.stolen, 0);
    }

    #[test]
    fn test_parse_proc_stat_missing_cpu_line() {
        assert!(parse_proc_stat("cpu0 1 2 3 4\nintr 1\n").is_none());
        assert!(parse_proc_stat("cpu 1 2\n").is_none());
        assert!(parse_proc_stat("cpu 1 x 3 4\n").is_none());
    }

    #[test]
    fn test_delta_saturates() {
        let prev = times(100, 50, 1000, 10);
        let cur = times(150, 40, 1100, 10);
        assert_eq!(cur.delta(&prev), times(50, 0, 100, 0));
    }

    #[test]
    fn test_cpu_sample_scenario() {
        let sample = cpu_sample("host1", &times(10, 5, 80, 5));

        assert_eq!(sample.name(), "host1.cpu");
        assert_eq!(sample.columns(), &["user", "sys", "wait", "idle"]);
        assert_eq!(sample.values(), &[10.0, 5.0, 5.0, 80.0]);
    }

    #[test]
    fn test_cpu_sample_truncates_each_category() {
        let t = CpuTimes {
            user: 1,
            nice: 1,
            sys: 1,
            ..Default::default()
        };
        let sample = cpu_sample("h", &t);
        assert_eq!(sample.values(), &[33.0, 33.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cpu_sample_zero_total() {
        let sample = cpu_sample("h", &CpuTimes::default());
        assert_eq!(sample.values(), &[0.0, 0.0, 0.0, 0.0]);
    }

    /// Yields `reads` in order, then fails like a missing `/proc/stat`.
    fn scripted(reads: Vec<CpuTimes>) -> impl FnMut() -> Result<CpuTimes, CollectError> {
        let mut reads: VecDeque<CpuTimes> = reads.into();
        move || {
            reads.pop_front().ok_or_else(|| CollectError::Read {
                path: "/proc/stat".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_first_sample_is_cumulative() {
        let first = times(100, 50, 800, 50);
        let mut sampler = CpuSampler::spawn(SAMPLE_INTERVAL, scripted(vec![first]));

        let got = sampler.next().await.expect("sample");
        assert_eq!(got, first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_publishes_deltas() {
        let first = times(100, 50, 800, 50);
        let second = times(110, 55, 880, 55);
        let mut sampler = CpuSampler::spawn(SAMPLE_INTERVAL, scripted(vec![first, second]));

        assert_eq!(sampler.next().await.expect("first"), first);
        assert_eq!(sampler.next().await.expect("second"), times(10, 5, 80, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_keeps_only_latest() {
        let reads = vec![
            times(0, 0, 0, 0),
            times(10, 0, 90, 0),
            times(30, 0, 170, 0),
        ];
        let mut sampler = CpuSampler::spawn(SAMPLE_INTERVAL, scripted(reads));

        // Let the sampler publish all three, but not attempt a fourth read,
        // before anything is consumed.
        tokio::time::sleep(SAMPLE_INTERVAL * 2 + SAMPLE_INTERVAL / 2).await;

        assert_eq!(sampler.next().await.expect("latest"), times(20, 0, 80, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_waits_for_first_sample() {
        let sampler = CpuSampler::spawn(SAMPLE_INTERVAL, scripted(vec![times(10, 5, 80, 5)]));
        let mut collector = CpuCollector::new("host1", sampler);

        let sample = collector.collect().await.expect("collects");
        assert_eq!(sample.values(), &[10.0, 5.0, 5.0, 80.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_fails_when_first_read_fails() {
        let sampler = CpuSampler::spawn(SAMPLE_INTERVAL, scripted(vec![]));
        let mut collector = CpuCollector::new("host1", sampler);

        let err = collector.collect().await.expect_err("read failed");
        assert!(matches!(err, CollectError::Sampler(_)));
        let source = std::error::Error::source(&err).expect("read error").to_string();
        assert_eq!(source, "reading /proc/stat");

        // The task has exited; later calls keep reporting the failure.
        let err = collector.collect().await.expect_err("still failed");
        assert!(matches!(err, CollectError::Sampler(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_fails_after_later_read_fails() {
        let sampler = CpuSampler::spawn(SAMPLE_INTERVAL, scripted(vec![times(10, 5, 80, 5)]));
        let mut collector = CpuCollector::new("host1", sampler);

        assert!(collector.collect().await.is_ok());
        let err = collector.collect().await.expect_err("second read failed");
        assert!(matches!(err, CollectError::Sampler(_)));
    }

    #[tokio::test]
    async fn test_sampler_fails_without_proc_stat() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("stat");
        let mut sampler = CpuSampler::spawn(SAMPLE_INTERVAL, move || read_cpu_times(&path));

        let outcome = tokio::time::timeout(Duration::from_secs(5), sampler.next())
            .await
            .expect("sampler does not hang");
        assert!(matches!(outcome, Err(CollectError::Sampler(_))));
    }

    #[test]
    fn test_read_cpu_times_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("stat");
        std::fs::write(&path, PROC_STAT).expect("write stat");

        let t = read_cpu_times(&path).expect("reads");
        assert_eq!(t.user, 10132153);
    }
}
