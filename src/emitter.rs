//! Graphite plaintext encoding and delivery.
//!
//! Every column of every sample becomes one line
//! `<sample name>.<column> <value> <unix seconds>`. Values are always printed
//! as floats with six decimals, and all lines of a batch share one timestamp.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, trace};

use crate::sample::MetricSample;
use crate::sink::{Output, Sink};

/// Errors that can occur while encoding a batch.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("{path} has non-finite value {value}")]
    NonFinite { path: String, value: f64 },

    #[error("system clock is before the unix epoch")]
    ClockBeforeEpoch,
}

/// Whole seconds since the Unix epoch.
pub fn unix_timestamp(now: SystemTime) -> Result<u64, EncodeError> {
    now.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| EncodeError::ClockBeforeEpoch)
}

/// Encode a batch into plaintext lines stamped with `timestamp`.
///
/// NaN and infinities are rejected since a Graphite server cannot store them.
pub fn encode_batch(batch: &[MetricSample], timestamp: u64) -> Result<Vec<String>, EncodeError> {
    let mut lines = Vec::with_capacity(batch.iter().map(|s| s.columns().len()).sum());

    for sample in batch {
        for (column, value) in sample.fields() {
            let path = format!("{}.{column}", sample.name());
            if !value.is_finite() {
                return Err(EncodeError::NonFinite { path, value });
            }
            lines.push(format!("{path} {value:.6} {timestamp}"));
        }
    }

    Ok(lines)
}

/// Encodes batches and writes each line to a sink.
#[derive(Debug)]
pub struct Emitter<S = Output> {
    sink: S,
}

impl<S: Sink> Emitter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Encode and deliver a batch stamped with the current time.
    ///
    /// Returns the number of lines delivered. Delivery failures are dropped.
    pub async fn emit(&self, batch: &[MetricSample]) -> Result<usize, EncodeError> {
        self.emit_at(batch, SystemTime::now()).await
    }

    /// Like [`Emitter::emit`] with an explicit clock reading.
    pub async fn emit_at(&self, batch: &[MetricSample], now: SystemTime) -> Result<usize, EncodeError> {
        if tracing::enabled!(tracing::Level::TRACE) {
            if let Ok(json) = serde_json::to_string(batch) {
                trace!(batch = %json, "encoding batch");
            }
        }

        let timestamp = unix_timestamp(now)?;
        let lines = encode_batch(batch, timestamp)?;

        let mut delivered = 0;
        for line in &lines {
            match self.sink.send(line).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(sink = self.sink.name(), error = %e, "dropping metric line"),
            }
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        lines: Mutex<Vec<String>>,
    }

    impl Sink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, line: &str) -> io::Result<()> {
            self.lines.lock().expect("not poisoned").push(line.to_string());
            Ok(())
        }
    }

    struct FailingSink;

    impl Sink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn send(&self, _line: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }

    fn two_samples() -> Vec<MetricSample> {
        vec![
            MetricSample::new("host1", "cpu", vec!["user", "sys"], vec![10.0, 5.0]),
            MetricSample::new("host1", "memory", vec!["percent"], vec![42.0]),
        ]
    }

    #[test]
    fn test_encode_batch_lines() {
        let lines = encode_batch(&two_samples(), 1_700_000_000).expect("encodes");
        assert_eq!(
            lines,
            vec![
                "host1.cpu.user 10.000000 1700000000",
                "host1.cpu.sys 5.000000 1700000000",
                "host1.memory.percent 42.000000 1700000000",
            ]
        );
    }

    #[test]
    fn test_encode_batch_six_decimals() {
        let batch = vec![MetricSample::new("h", "load", vec!["one"], vec![1.23])];
        let lines = encode_batch(&batch, 7).expect("encodes");
        assert_eq!(lines, vec!["h.load.one 1.230000 7"]);
    }

    #[test]
    fn test_encode_empty_batch() {
        assert!(encode_batch(&[], 1).expect("encodes").is_empty());
    }

    #[test]
    fn test_encode_rejects_non_finite() {
        let batch = vec![MetricSample::new("h", "load", vec!["one"], vec![f64::NAN])];
        let err = encode_batch(&batch, 1).expect_err("NaN");
        assert!(matches!(err, EncodeError::NonFinite { ref path, .. } if path == "h.load.one"));
    }

    #[test]
    fn test_unix_timestamp() {
        let now = UNIX_EPOCH + Duration::from_millis(1_700_000_000_999);
        assert_eq!(unix_timestamp(now).expect("after epoch"), 1_700_000_000);

        let before = UNIX_EPOCH - Duration::from_secs(1);
        assert!(matches!(
            unix_timestamp(before),
            Err(EncodeError::ClockBeforeEpoch)
        ));
    }

    #[tokio::test]
    async fn test_emit_shares_one_timestamp() {
        let emitter = Emitter::new(RecordingSink::default());
        let delivered = emitter.emit(&two_samples()).await.expect("emits");
        assert_eq!(delivered, 3);

        let lines = emitter.sink().lines.lock().expect("not poisoned").clone();
        assert_eq!(lines.len(), 3);

        let stamps: Vec<&str> = lines
            .iter()
            .map(|l| l.rsplit(' ').next().expect("timestamp field"))
            .collect();
        assert!(stamps.iter().all(|ts| *ts == stamps[0]));
    }

    #[tokio::test]
    async fn test_emit_ignores_send_failures() {
        let emitter = Emitter::new(FailingSink);
        let delivered = emitter.emit(&two_samples()).await.expect("still ok");
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_emit_identical_batches_differ_only_in_timestamp() {
        let emitter = Emitter::new(RecordingSink::default());
        let t0 = UNIX_EPOCH + Duration::from_secs(100);
        let t1 = UNIX_EPOCH + Duration::from_secs(101);

        emitter.emit_at(&two_samples(), t0).await.expect("first");
        emitter.emit_at(&two_samples(), t1).await.expect("second");

        let lines = emitter.sink().lines.lock().expect("not poisoned").clone();
        let strip = |l: &String| l.rsplit_once(' ').expect("timestamp").0.to_string();
        let first: Vec<String> = lines[..3].iter().map(strip).collect();
        let second: Vec<String> = lines[3..].iter().map(strip).collect();
        assert_eq!(first, second);
        assert!(lines[0].ends_with(" 100"));
        assert!(lines[3].ends_with(" 101"));
    }
}
