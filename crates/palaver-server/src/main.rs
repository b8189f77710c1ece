//! # Palaver Server
//!
//! Chat server host process.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! palaver
//!
//! # Accept untrusted client certificates, stop after 60 seconds
//! palaver --auto-accept --timeout 60
//!
//! # Run with custom config
//! palaver --config /path/to/palaver.toml
//! ```

mod config;
mod launcher;
mod metrics;
mod monitor;
mod policy;
mod runtime;

use clap::Parser;
use launcher::{ExitCode, ServerLauncher};
use monitor::TracingStatusSink;
use policy::FixedIdentity;
use runtime::LocalRuntime;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "palaver", about = "Chat server host process")]
struct Args {
    /// Accept untrusted client certificates.
    #[arg(short = 'a', long)]
    auto_accept: bool,

    /// Stop after this many seconds; 0 runs until interrupted.
    #[arg(short = 't', long, default_value_t = 0)]
    timeout: u64,

    /// Path to a configuration file.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palaver=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Load configuration, then apply command-line overrides
    let config = match args.config {
        Some(path) => config::Config::from_file(&path),
        None => config::Config::load(),
    };
    let mut config = match config {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("Configuration error: {error:#}");
            return std::process::ExitCode::from(ExitCode::NotStarted.code());
        }
    };
    if args.auto_accept {
        config.security.auto_accept_untrusted = true;
    }
    if args.timeout != 0 {
        config.run.seconds = args.timeout;
    }

    tracing::info!("Starting palaver server '{}'", config.application_name);

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(error) = metrics::start_metrics_server(config.metrics.port) {
            tracing::warn!("Metrics server failed to start: {error}");
        }
    }

    let identity = Arc::new(FixedIdentity::new(format!(
        "CN={}",
        config.application_name
    )));
    let runtime = Arc::new(LocalRuntime::new());
    let launcher = ServerLauncher::new(config, identity, runtime, Arc::new(TracingStatusSink));

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
        }
    };

    let exit = launcher.run(shutdown).await;
    std::process::ExitCode::from(exit.code())
}
