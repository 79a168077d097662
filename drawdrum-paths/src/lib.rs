//! Cross-platform path utilities for DrawDrum.
//!
//! Single source of truth for where the daemon keeps its database, uploaded
//! logos, configuration and control socket.
//!
//! # Platform Behavior
//!
//! | Platform | Data Directory | Socket Directory |
//! |----------|----------------|------------------|
//! | Linux    | `~/.local/share/drawdrum` | `$XDG_RUNTIME_DIR` or data dir |
//! | macOS    | `~/Library/Application Support/drawdrum` | Same as data dir |
//! | Windows  | `%APPDATA%/drawdrum` | Same as data dir |
//!
//! Setting `DRAWDRUM_DATA_DIR` moves the data directory anywhere, which is how
//! container deployments point it at a mounted persistent disk.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine data directory")]
    NoDataDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,
}

/// Application identifier used in path construction.
const APP_NAME: &str = "drawdrum";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DRAWDRUM_DATA_DIR";

/// SQLite database file name.
const DB_FILE_NAME: &str = "drawdrum.db";

/// Control socket file name.
const CONTROL_SOCKET_NAME: &str = "drawdrum.sock";

/// URL prefix under which uploaded files are served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads/";

/// Create `dir` (and parents) with owner-only permissions if it is missing.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }

    Ok(())
}

/// Pick the data directory from an explicit override or the platform default.
fn data_dir_from(override_dir: Option<PathBuf>) -> Result<PathBuf> {
    match override_dir {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(dir),
        _ => {
            let base_dir = dirs::data_dir().ok_or(PathError::NoDataDirectory)?;
            Ok(base_dir.join(APP_NAME))
        }
    }
}

/// Get the application data directory.
///
/// Creates the directory if it doesn't exist with secure permissions (0o700).
///
/// # Errors
/// Returns an error if the directory cannot be determined or created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = data_dir_from(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))?;
    ensure_private_dir(&data_dir)?;
    Ok(data_dir)
}

/// Get the configuration directory.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/drawdrum`
/// - **macOS / Windows**: config lives with data
pub fn get_config_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let config_base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
        let config_dir = config_base.join(APP_NAME);
        ensure_private_dir(&config_dir)?;
        Ok(config_dir)
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Get the path of the display-state database file.
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(DB_FILE_NAME))
}

/// Get the directory holding uploaded logo images.
pub fn get_uploads_dir() -> Result<PathBuf> {
    let uploads_dir = get_data_dir()?.join("uploads");
    ensure_private_dir(&uploads_dir)?;
    Ok(uploads_dir)
}

/// Get the socket directory.
///
/// On Linux prefers `$XDG_RUNTIME_DIR`, everywhere else the data directory.
pub fn get_socket_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        if let Some(runtime_dir) = dirs::runtime_dir() {
            if runtime_dir.exists() {
                return Ok(runtime_dir);
            }
        }
        get_data_dir()
    }

    #[cfg(not(target_os = "linux"))]
    {
        get_data_dir()
    }
}

/// Get the path to the local control socket.
pub fn get_control_socket_path() -> Result<PathBuf> {
    Ok(get_socket_dir()?.join(CONTROL_SOCKET_NAME))
}

/// Set secure Unix socket permissions (0o600, owner read/write only).
#[cfg(unix)]
pub fn secure_socket_permissions(socket_path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if socket_path.exists() {
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(socket_path, perms).with_context(|| {
            format!("Failed to set socket permissions: {}", socket_path.display())
        })?;
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn secure_socket_permissions(_socket_path: &Path) -> Result<()> {
    Ok(())
}

/// Map a served logo URL (`/uploads/logo_ab12.png`) back to its file inside
/// `uploads_dir`.
///
/// Returns `None` for empty paths, paths outside the uploads prefix, and any
/// name that would escape the directory.
pub fn resolve_upload(uploads_dir: &Path, logo_path: &str) -> Option<PathBuf> {
    let name = logo_path.strip_prefix(UPLOADS_URL_PREFIX)?;
    let relative = Path::new(name);

    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Some(uploads_dir.join(file)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins_over_platform_dir() {
        let dir = data_dir_from(Some(PathBuf::from("/data"))).unwrap();
        assert_eq!(dir, PathBuf::from("/data"));
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let dir = data_dir_from(Some(PathBuf::new())).unwrap();
        assert!(dir.ends_with(APP_NAME), "Should fall back to platform dir");
    }

    #[test]
    fn test_ensure_private_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_private_dir(&nested).unwrap();
        assert!(nested.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&nested).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_control_socket_path() {
        let path = get_control_socket_path().expect("Should get socket path");
        assert!(path.ends_with(CONTROL_SOCKET_NAME));
    }

    #[test]
    fn test_resolve_upload() {
        let uploads = Path::new("/srv/uploads");
        assert_eq!(
            resolve_upload(uploads, "/uploads/logo_1a2b3c4d.png"),
            Some(PathBuf::from("/srv/uploads/logo_1a2b3c4d.png"))
        );
        assert_eq!(resolve_upload(uploads, ""), None);
        assert_eq!(resolve_upload(uploads, "https://cdn.example/logo.png"), None);
        assert_eq!(resolve_upload(uploads, "/uploads/../drawdrum.db"), None);
        assert_eq!(resolve_upload(uploads, "/uploads/nested/logo.png"), None);
    }
}
