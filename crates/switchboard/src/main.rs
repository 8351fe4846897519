//! # switchboard
//!
//! Relay binary: loads settings, starts the selected engine, and serves
//! WebSocket clients until Ctrl-C.

#![deny(unsafe_code)]

mod engines;
mod settings;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use switchboard_core::{engine_channel, logging};
use switchboard_server::RelayServer;
use tracing::{info, warn};

use crate::engines::EngineKind;
use crate::settings::Overrides;

/// How long the engine gets to finish after the relay stops.
const ENGINE_GRACE: Duration = Duration::from_secs(2);

/// WebSocket relay between many clients and one engine.
#[derive(Parser, Debug)]
#[command(name = "switchboard", about = "WebSocket relay between many clients and one engine")]
struct Cli {
    /// Path to a JSON settings file (default `./switchboard.json` if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Engine to run.
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,

    /// Log filter when `RUST_LOG` is unset (e.g. `info`, `switchboard_server=debug`).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_parser = ["compact", "json"])]
    log_format: Option<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            engine: self.engine,
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = settings::load(args.config.as_deref(), &args.overrides())
        .context("Failed to load settings")?;
    logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics_handle = switchboard_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let (engine_handle, ports) = engine_channel(settings.server.inbound_buffer);
    let engine = engines::build(settings.engine.kind);
    info!(engine = engine.name(), "starting engine");
    let engine_task = tokio::spawn(engine.run(ports));

    let server = RelayServer::new(settings.server, engine_handle).with_metrics(metrics_handle);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!("switchboard listening on ws://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    if !server.shutdown_gracefully().await {
        warn!("connections did not drain before the shutdown timeout");
    }
    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "server exited with error"),
        Err(e) => warn!(error = %e, "server task failed"),
    }

    // The engine's event stream ended during shutdown; let it finish.
    drop(server);
    if tokio::time::timeout(ENGINE_GRACE, engine_task).await.is_err() {
        warn!("engine did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}
