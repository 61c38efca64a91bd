use std::io;

use super::Sink;

/// Log target for metric lines. The binary keeps it enabled at `info`
/// whatever `--log-level` says.
pub const TARGET: &str = "sysstatsd::console";

/// Fallback sink writing each line to the process log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, line: &str) -> io::Result<()> {
        tracing::info!(target: TARGET, "{line}");
        Ok(())
    }
}
