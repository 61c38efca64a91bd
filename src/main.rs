use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use sysstatsd::collector;
use sysstatsd::config::Config;
use sysstatsd::emitter::Emitter;
use sysstatsd::hostname;
use sysstatsd::scheduler::Scheduler;
use sysstatsd::sink::{console, Output};

/// Sends host load, CPU, memory and filesystem usage to Graphite.
#[derive(Parser)]
#[command(name = "sysstatsd", about)]
struct Cli {
    /// Monitoring interval (e.g. 1s, 500ms, 1m).
    #[arg(short, long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Graphite server hostname:port. Prints to the console when unset.
    #[arg(short, long, env = "GRAPHITE_SERVER")]
    server: Option<String>,

    /// Send load averages.
    #[arg(short, long)]
    load: bool,

    /// Send CPU usage.
    #[arg(short, long)]
    cpu: bool,

    /// Send memory usage.
    #[arg(short, long)]
    memory: bool,

    /// Send filesystem usage for the given path.
    #[arg(short, long)]
    filesystem: Option<String>,

    /// Path to an optional YAML configuration file. Flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hostname used as the metric prefix. Detected when unset.
    #[arg(long)]
    hostname: Option<String>,

    /// Logging verbosity level (trace, debug, info, warn, error). Metric lines
    /// printed to the console are not affected.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

impl Cli {
    /// Merge the optional config file with command-line flags and validate.
    fn build_config(&self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(interval) = self.interval {
            cfg.interval = interval;
        }
        if let Some(server) = &self.server {
            cfg.server = server.clone();
        }
        if let Some(filesystem) = &self.filesystem {
            cfg.metrics.filesystem = filesystem.clone();
        }
        cfg.metrics.load |= self.load;
        cfg.metrics.cpu |= self.cpu;
        cfg.metrics.memory |= self.memory;

        cfg.validate()?;

        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("sysstatsd {}", version::full());
        return Ok(());
    }

    let filter = log_filter(&cli.log_level)?;

    fmt().with_env_filter(filter).with_target(false).init();

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting sysstatsd",
    );

    let cfg = cli.build_config()?;

    let hostname = match &cli.hostname {
        Some(name) => name.clone(),
        None => hostname::resolve(&cfg.procfs_root)?,
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg, hostname).await })
}

/// Build the log filter for `level`, keeping console metric output visible.
fn log_filter(level: &str) -> Result<EnvFilter> {
    let filter =
        EnvFilter::try_new(level).with_context(|| format!("invalid log level: {level}"))?;
    let console_output = format!("{}=info", console::TARGET)
        .parse()
        .context("console log directive")?;

    Ok(filter.add_directive(console_output))
}

async fn run(cfg: Config, hostname: String) -> Result<()> {
    let output = Output::from_config(&cfg).await?;
    let collectors = collector::from_config(&cfg, &hostname);

    tracing::info!(%hostname, interval = ?cfg.interval, "sysstatsd running");

    let scheduler = Scheduler::new(collectors, Emitter::new(output), cfg.interval);
    let result = scheduler.run().await;

    if let Err(e) = &result {
        tracing::error!("sysstatsd stopped: {e:#}");
    }

    result
}
