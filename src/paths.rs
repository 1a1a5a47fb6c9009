//! Path resolution for floe
//!
//! # Environment Variables
//!
//! - `FLOE_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/floe`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `FLOE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/floe` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\floe`
//!    - macOS/Linux: `~/.config/floe`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "FLOE_CONFIG_DIR";

/// Blueprint file looked up in the config directory
pub const BLUEPRINT_FILE: &str = "blueprint.toml";

/// Account snapshot looked up in the config directory
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// Get the floe config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("floe");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("floe");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("floe");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// The given path expanded, or `<config_dir>/<file>` when none is given
pub fn resolve(path: Option<&str>, file: &str) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(expand(path)),
        None => Ok(config_dir()?.join(file)),
    }
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
