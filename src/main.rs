//! Entrypoint for the `ramcached` binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ramcache::app::App;
use ramcache::config::{CliOverrides, Config, LogFormat};
use ramcache::shutdown::GracefulShutdown;

/// In-memory, byte-budgeted LRU cache server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML config file; defaults are used for anything it omits.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "HOST:PORT")]
    listen_addr: Option<String>,

    #[arg(long)]
    total_bytes: Option<usize>,

    #[arg(long)]
    shards: Option<usize>,

    #[arg(long)]
    low_watermark: Option<usize>,

    #[arg(long)]
    high_watermark: Option<usize>,

    #[arg(long)]
    idle_timeout_ms: Option<u64>,

    #[arg(long)]
    max_queue: Option<usize>,

    /// Run the reactor-only single-threaded deployment instead of
    /// reactor+executor.
    #[arg(long)]
    single_threaded: bool,

    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[arg(long, value_name = "auto|json|pretty")]
    log_format: Option<String>,
}

impl Args {
    fn into_overrides(self) -> (Option<PathBuf>, CliOverrides) {
        let log_format = self.log_format.as_deref().and_then(|s| match s {
            "auto" => Some(LogFormat::Auto),
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        });
        (
            self.config,
            CliOverrides {
                listen_addr: self.listen_addr,
                total_bytes: self.total_bytes,
                shards: self.shards,
                low_watermark: self.low_watermark,
                high_watermark: self.high_watermark,
                idle_timeout_ms: self.idle_timeout_ms,
                max_queue: self.max_queue,
                threaded: if self.single_threaded { Some(false) } else { None },
                log_level: self.log_level,
                log_format,
            },
        )
    }
}

fn configure_logger(cfg: &Config) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.log.level.clone()));

    if cfg.is_prod() {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().pretty()).init();
    }
}

fn load_cfg(args: Args) -> Result<Config> {
    let (path, overrides) = args.into_overrides();
    Config::load(path.as_deref(), overrides).context("failed to load configuration")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = load_cfg(args)?;
    configure_logger(&cfg);

    info!(component = "main", event = "config_loaded", shards = cfg.shards, threaded = cfg.threaded);

    let shutdown_token = CancellationToken::new();
    let graceful = GracefulShutdown::new(shutdown_token.clone());

    let app = App::new(cfg)?;

    let serve_handle = std::thread::spawn({
        let token = shutdown_token.clone();
        move || {
            if let Err(err) = app.serve(token) {
                error!(component = "main", event = "serve_failed", error = %err);
            }
        }
    });

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create the shutdown-signal runtime")?
        .block_on(graceful.await_signal());

    serve_handle.join().expect("reactor thread panicked");
    info!(component = "main", event = "shutdown_complete");
    Ok(())
}
