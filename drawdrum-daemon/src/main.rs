//! DrawDrum Daemon - display state sync for lottery draw screens
//!
//! Serves the admin API and the push channel that keeps every display in
//! step, plus a local control socket for operator shortcuts. The `display`
//! subcommand runs a terminal display against a running daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use drawdrum_daemon::config::DaemonConfig;
use drawdrum_daemon::ipc::ControlServer;
use drawdrum_daemon::server::{self, AppState};
use drawdrum_daemon::viewer::{self, DisplayClient};
use drawdrum_sync::SyncCoordinator;

#[derive(Parser)]
#[command(name = "drawdrum-daemon", version, about = "DrawDrum display sync daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync server (default)
    Serve {
        /// Config file to use instead of the default location
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address, overrides `bind_addr`
        #[arg(long)]
        bind: Option<String>,

        /// Keep state in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show a terminal display connected to a running server
    Display {
        #[arg(long, default_value = "ws://127.0.0.1:8000/ws")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve {
        config: None,
        bind: None,
        ephemeral: false,
    }) {
        Command::Serve {
            config,
            bind,
            ephemeral,
        } => {
            let mut config = match config {
                Some(path) => DaemonConfig::load_from(&path)?,
                None => DaemonConfig::load()?,
            };
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            init_logging(&config.log_level);
            run_server(config, ephemeral).await
        }
        Command::Display { url } => {
            init_logging("info");
            run_display(url).await
        }
    }
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}

async fn run_server(config: DaemonConfig, ephemeral: bool) -> Result<()> {
    info!("Starting DrawDrum daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", config.config_path.display());

    let store = config.open_store(ephemeral);

    std::fs::create_dir_all(&config.uploads_dir).with_context(|| {
        format!(
            "Failed to create uploads directory {}",
            config.uploads_dir.display()
        )
    })?;

    let coordinator = Arc::new(SyncCoordinator::with_timer_defaults(
        store,
        config.default_timer_duration_secs,
        config.default_timer_size_px,
    ));

    let control = ControlServer::new(&config.control_socket_path, Arc::clone(&coordinator))
        .context("Failed to start control socket")?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    let state = AppState::new(Arc::clone(&coordinator), config.uploads_dir.clone());

    info!("DrawDrum daemon ready");

    tokio::select! {
        result = server::serve(listener, state) => {
            if let Err(e) = result {
                error!("HTTP server error: {:#}", e);
            }
        }
        result = control.run() => {
            if let Err(e) = result {
                error!("Control socket error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down...");
    let _ = std::fs::remove_file(&config.control_socket_path);
    info!("DrawDrum daemon stopped");

    Ok(())
}

async fn run_display(url: String) -> Result<()> {
    let client = DisplayClient::new(url);

    tokio::select! {
        result = client.run(|model| info!("\n{}", viewer::render_frame(model))) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Display closed");
            Ok(())
        }
    }
}
