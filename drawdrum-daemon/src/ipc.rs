//! Unix socket control server for local operator commands

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use drawdrum_sync::{InitPayload, SyncCoordinator, TimerActionKind, TimerCommand};

/// Control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Status,
    Timer(TimerActionKind),
    ClearLogo,
}

impl ControlCommand {
    pub fn parse(s: &str) -> Result<Self> {
        let word = s.trim().to_lowercase();
        if let Some(action) = TimerActionKind::parse(&word) {
            return Ok(Self::Timer(action));
        }
        match word.as_str() {
            "status" => Ok(Self::Status),
            "clear-logo" | "clear_logo" => Ok(Self::ClearLogo),
            _ => anyhow::bail!("Unknown command: {}", s.trim()),
        }
    }
}

/// One-line summary of the current display state
pub fn status_line(snapshot: &InitPayload, clients: usize) -> String {
    let timer = &snapshot.timer;
    let logo = if snapshot.logo_path.is_empty() {
        "none"
    } else {
        snapshot.logo_path.as_str()
    };
    format!(
        "timer={} {}/{}s logo={} chars={} clients={}",
        timer.phase,
        timer.remaining,
        timer.duration,
        logo,
        snapshot.passport_text.chars().count(),
        clients
    )
}

/// Run one command against the coordinator and produce the reply line
pub async fn execute(command: ControlCommand, coordinator: &SyncCoordinator) -> String {
    let outcome = match command {
        ControlCommand::Status => Ok(()),
        ControlCommand::Timer(action) => coordinator
            .apply_timer(TimerCommand::new(action))
            .await
            .map(|_| ()),
        ControlCommand::ClearLogo => {
            coordinator.set_logo("").await;
            Ok(())
        }
    };

    match outcome {
        Ok(()) => {
            let snapshot = coordinator.snapshot().await;
            status_line(&snapshot, coordinator.client_count().await)
        }
        Err(e) => format!("Error: {}", e),
    }
}

/// Unix socket control server
pub struct ControlServer {
    listener: UnixListener,
    coordinator: Arc<SyncCoordinator>,
}

impl ControlServer {
    /// Bind the control socket, replacing a stale one
    pub fn new(socket_path: &Path, coordinator: Arc<SyncCoordinator>) -> Result<Self> {
        let _ = std::fs::remove_file(socket_path);

        let listener = UnixListener::bind(socket_path).context("Failed to bind Unix socket")?;
        drawdrum_paths::secure_socket_permissions(socket_path)?;

        info!("Control socket listening on {}", socket_path.display());

        Ok(Self {
            listener,
            coordinator,
        })
    }

    /// Accept connections until the listener fails
    pub async fn run(&self) -> Result<()> {
        loop {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .context("Failed to accept connection")?;
            let coordinator = Arc::clone(&self.coordinator);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, coordinator).await {
                    error!("Control connection error: {}", e);
                }
            });
        }
    }
}

/// Handle a single control connection
pub async fn handle_connection(
    mut stream: UnixStream,
    coordinator: Arc<SyncCoordinator>,
) -> Result<()> {
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer).await?;

    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buffer[..n]);
    debug!("Received control command: {}", request.trim());

    let response = match ControlCommand::parse(&request) {
        Ok(command) => execute(command, &coordinator).await,
        Err(e) => format!("Error: {}", e),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    Ok(())
}
