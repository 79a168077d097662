//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use drawdrum_sync::state::DEFAULT_TIMER_SIZE;
use drawdrum_sync::{MemoryStateStore, SqliteStateStore, StateStore, DEFAULT_TIMER_DURATION_SECS};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// HTTP / WebSocket listen address
    pub bind_addr: String,

    /// SQLite file holding the display state
    pub database_path: PathBuf,

    /// Directory served under `/uploads/`
    pub uploads_dir: PathBuf,

    /// Unix socket for local control commands
    pub control_socket_path: PathBuf,

    /// Countdown length until an admin sets another one
    pub default_timer_duration_secs: u32,

    pub default_timer_size_px: u32,

    /// Default `tracing` filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let fallback = || PathBuf::from(".");
        Self {
            config_path: Self::default_config_path(),
            bind_addr: "0.0.0.0:8000".to_string(),
            database_path: drawdrum_paths::get_db_path()
                .unwrap_or_else(|_| fallback().join("drawdrum.db")),
            uploads_dir: drawdrum_paths::get_uploads_dir()
                .unwrap_or_else(|_| fallback().join("uploads")),
            control_socket_path: drawdrum_paths::get_control_socket_path()
                .unwrap_or_else(|_| fallback().join("drawdrum.sock")),
            default_timer_duration_secs: DEFAULT_TIMER_DURATION_SECS,
            default_timer_size_px: DEFAULT_TIMER_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Load configuration from `path`, writing defaults there on first run
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;

            let mut config: DaemonConfig = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;

            config.config_path = path.to_path_buf();
            Ok(config)
        } else {
            let config = Self {
                config_path: path.to_path_buf(),
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Store for the display state.
    ///
    /// An unusable database is moved aside and recreated; if even that
    /// fails the daemon runs on memory only rather than refusing to start.
    pub fn open_store(&self, ephemeral: bool) -> Arc<dyn StateStore> {
        if ephemeral {
            info!("Ephemeral mode: state is kept in memory only");
            return Arc::new(MemoryStateStore::new());
        }

        info!("Database: {}", self.database_path.display());
        match SqliteStateStore::open_or_recover(&self.database_path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(
                    "Failed to open display state database {}: {}",
                    self.database_path.display(),
                    e
                );
                warn!("Continuing with in-memory state; changes will not survive a restart");
                Arc::new(MemoryStateStore::new())
            }
        }
    }

    fn default_config_path() -> PathBuf {
        drawdrum_paths::get_config_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(CONFIG_FILE_NAME)
    }
}
