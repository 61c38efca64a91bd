use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::collector::{CollectError, Collector};
use crate::emitter::Emitter;
use crate::sample::Batch;
use crate::sink::{Output, Sink};

/// Drives collection and emission on a fixed interval.
///
/// Any collector or encoding failure stops the loop and is returned to the
/// caller; there is no partial batch and no retry. Relaxing this to skip a
/// failing family would be a policy change, not a bug fix.
#[derive(Debug)]
pub struct Scheduler<S = Output> {
    collectors: Vec<Collector>,
    emitter: Emitter<S>,
    interval: Duration,
}

impl<S: Sink> Scheduler<S> {
    pub fn new(collectors: Vec<Collector>, emitter: Emitter<S>, interval: Duration) -> Self {
        Self {
            collectors,
            emitter,
            interval,
        }
    }

    /// Run every collector in order and gather their samples.
    ///
    /// Stops at the first failing collector.
    pub async fn collect_batch(&mut self) -> Result<Batch, CollectError> {
        let mut batch = Batch::with_capacity(self.collectors.len());

        for collector in &mut self.collectors {
            batch.push(collector.collect().await?);
        }

        Ok(batch)
    }

    /// One collect-and-emit cycle. Returns the number of lines delivered.
    pub async fn tick(&mut self) -> Result<usize> {
        let batch = self.collect_batch().await.context("collecting metrics")?;

        let delivered = self
            .emitter
            .emit(&batch)
            .await
            .context("encoding metrics")?;

        Ok(delivered)
    }

    /// Tick forever. The first tick fires one interval after start; ticks
    /// missed while a slow cycle runs are skipped, never queued.
    ///
    /// Only returns on error.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval = ?self.interval,
            collectors = self.collectors.len(),
            sink = self.emitter.sink().name(),
            "scheduler started",
        );

        loop {
            ticker.tick().await;

            let started = Instant::now();
            let delivered = self.tick().await?;
            debug!(
                lines = delivered,
                elapsed_us = started.elapsed().as_micros() as u64,
                "tick complete",
            );
        }
    }
}
