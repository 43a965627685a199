//! Config and state directory resolution
//!
//! # Environment Variables
//!
//! - `KUBEFLEET_CONFIG_DIR` - Override config directory
//! - `KUBEFLEET_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `KUBEFLEET_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/kubefleet` (if set)
//! 3. `~/.config/kubefleet`
//!
//! For state_dir():
//! 1. `KUBEFLEET_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/kubefleet` (if set)
//! 3. `~/.local/state/kubefleet`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "KUBEFLEET_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "KUBEFLEET_STATE_DIR";

const APP_DIR: &str = "kubefleet";

/// Get the kubefleet config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = resolve_dir(
        std::env::var(ENV_CONFIG_DIR).ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
        &home.join(".config"),
    );
    log::debug!("Using config dir: {}", path.display());
    Ok(path)
}

/// Get the kubefleet state directory path
pub fn state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = resolve_dir(
        std::env::var(ENV_STATE_DIR).ok(),
        std::env::var("XDG_STATE_HOME").ok(),
        &home.join(".local").join("state"),
    );
    log::debug!("Using state dir: {}", path.display());
    Ok(path)
}

/// Pick a directory: explicit override, then XDG base, then the fallback base
fn resolve_dir(explicit: Option<String>, xdg: Option<String>, fallback: &Path) -> PathBuf {
    if let Some(dir) = explicit.filter(|d| !d.is_empty()) {
        return expand(&dir);
    }
    if let Some(base) = xdg.filter(|d| !d.is_empty()) {
        return PathBuf::from(base).join(APP_DIR);
    }
    fallback.join(APP_DIR)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
