//! Binary entry point: load config, open the store, assemble the runtime,
//! start the scheduler, serve the API. Catastrophic failures (store open,
//! unparseable config) abort startup loudly.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use nexira_config::AppConfig;
use nexira_gateway::{AppState, router};
use nexira_runtime::{Runtime, Scheduler, SystemClock};

#[derive(Debug, Parser)]
#[command(name = "nexira", version, about = "A persistent personal-AI runtime")]
struct Cli {
    /// Base data directory (databases, images, backups live under it).
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Path to the JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen port from the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Skip the background scheduler (API only).
    #[arg(long)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| cli.base_dir.join("config").join("default_config.json"));

    let config = AppConfig::load_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let file_appender =
        tracing_appender::rolling::daily(cli.base_dir.join("data").join("logs"), "nexira.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone())),
        )
        .with_writer(file_writer.and(std::io::stdout))
        .init();

    let host = config.web_interface.host.clone();
    let port = cli.port.unwrap_or(config.web_interface.port);

    let runtime = Runtime::new(config, config_path, cli.base_dir.clone())
        .context("assembling runtime")?;
    info!(name = %runtime.config.read().expect("config lock").display_name(), "runtime ready");

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler_handle = if cli.no_scheduler {
        None
    } else {
        let scheduler = Scheduler::new(
            runtime.clone(),
            std::sync::Arc::new(SystemClock),
            stop_rx,
        );
        Some(tokio::spawn(scheduler.run()))
    };

    let state = AppState::new(runtime);
    let app = router(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;
    info!(%addr, "gateway listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // Stop the scheduler at its next sleep boundary.
    let _ = stop_tx.send(true);
    if let Some(handle) = scheduler_handle {
        let _ = handle.await;
    }
    info!("goodbye");
    Ok(())
}
