use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use kiosk_mvp::logging::{FileSink, StderrSink};
use kiosk_mvp::{
    DashboardConfig, JitterMode, KioskRuntime, LogLevel, Logger, PreviewDriver, ResolverMap,
    RuntimeConfig, SolarFilePoller, ViewHandle, solar_channel,
};

#[derive(Parser, Debug)]
#[command(name = "kiosk")]
#[command(about = "Dashboard orchestration core with a terminal preview")]
struct Cli {
    /// Dashboard configuration (JSON array of widget records)
    #[arg(short, long, default_value = "dashboard.json")]
    config: PathBuf,

    /// JSON array of loadable module paths; defaults to every path the config names
    #[arg(long, value_name = "FILE")]
    modules: Option<PathBuf>,

    /// Weather JSON carrying `sunrise` and `sunset`
    #[arg(long, value_name = "FILE")]
    solar: Option<PathBuf>,

    /// Seconds between reads of the solar file
    #[arg(long, default_value_t = 300)]
    solar_poll_secs: u64,

    /// Write JSON-lines logs here instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Seconds between metrics snapshots; 0 disables them
    #[arg(long, default_value_t = 60)]
    metrics_secs: u64,

    /// Fixed swap start offset in milliseconds instead of a random one
    #[arg(long, value_name = "MS")]
    jitter_ms: Option<u64>,

    /// Print one frame and exit instead of running the live preview
    #[arg(long)]
    once: bool,
}

fn build_logger(cli: &Cli) -> Result<Logger> {
    let Some(level) = LogLevel::parse(&cli.log_level) else {
        bail!("unknown log level `{}`", cli.log_level);
    };
    let logger = match &cli.log_file {
        Some(path) => Logger::new(
            FileSink::new(path, 4 * 1024 * 1024)
                .with_context(|| format!("opening log file {}", path.display()))?,
        ),
        None => Logger::new(StderrSink),
    };
    Ok(logger.with_min_level(level))
}

/// Views are the module paths themselves; a real shell swaps in its loader.
fn build_resolver(dashboard: &DashboardConfig, modules: Option<&Path>) -> Result<ResolverMap> {
    let paths: Vec<String> = match modules {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading module list {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing module list {}", path.display()))?
        }
        None => dashboard.paths().into_iter().map(str::to_string).collect(),
    };

    let mut resolver = ResolverMap::new();
    for path in paths {
        resolver.insert_view(path.clone(), ViewHandle::new(path));
    }
    Ok(resolver)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let logger = build_logger(&cli)?;
    let dashboard = DashboardConfig::from_path(&cli.config)
        .with_context(|| format!("loading dashboard config {}", cli.config.display()))?;
    let resolver = build_resolver(&dashboard, cli.modules.as_deref())?;

    let config = RuntimeConfig {
        logger: Some(logger.clone()),
        metrics_interval: Duration::from_secs(cli.metrics_secs),
        jitter: cli
            .jitter_ms
            .map(|ms| JitterMode::Fixed(Duration::from_millis(ms)))
            .unwrap_or_default(),
        ..RuntimeConfig::default()
    };
    let preview_interval = config.preview_interval;
    let mut runtime = KioskRuntime::new(dashboard, Arc::new(resolver), config);

    let (solar_tx, solar_rx) = solar_channel();
    let poller = cli.solar.as_ref().map(|path| {
        SolarFilePoller::new(path, Duration::from_secs(cli.solar_poll_secs.max(1)))
            .with_logger(logger.clone())
    });
    if let Some(poller) = &poller {
        if let Ok(times) = poller.poll_once().await {
            solar_tx.send_replace(times);
        }
    }

    runtime.start(solar_rx).await.context("starting runtime")?;
    let poller_task = poller.map(|poller| poller.spawn(solar_tx, runtime.cancel_token()));

    let driver = PreviewDriver::new(runtime.hub().clone()).with_logger(logger);
    let outcome = if cli.once {
        driver.print_once(&mut io::stdout())
    } else {
        driver
            .fit_terminal()
            .with_interval(preview_interval)
            .run(runtime.cancel_token())
            .await
    };

    runtime.shutdown().await;
    if let Some(task) = poller_task {
        let _ = task.await;
    }
    outcome.context("preview driver failed")
}
