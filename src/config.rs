//! User configuration (`~/.config/kubefleet/config.toml`)

use anyhow::{Context, Result, bail};
use connector::SshOptions;
use engine::{DEFAULT_CONCURRENCY, RetryPolicy};
use inventory::{ConnectionDefaults, SelectionPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub ssh: SshConfig,
    pub selection: SelectionConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default extra attempts for tasks that do not set `retries`
    pub retries: u32,
    /// Pause between attempts
    pub retry_delay_ms: u64,
    /// Hosts a parallel task works on at once
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            retry_delay_ms: 1000,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    pub port: u16,
    pub private_key: Option<String>,
    pub connect_timeout: u64,
    /// OpenSSH known_hosts file; empty disables host key checks
    pub known_hosts: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            private_key: None,
            connect_timeout: 30,
            known_hosts: "~/.ssh/known_hosts".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// `random` or `sequential`
    pub policy: String,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Overrides the state directory
    pub dir: Option<String>,
}

impl Config {
    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?.join(CONFIG_FILE))
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values no run could use
    pub fn validate(&self) -> Result<()> {
        if self.engine.concurrency == 0 {
            bail!("engine.concurrency must be at least 1");
        }
        if self.ssh.port == 0 {
            bail!("ssh.port must not be 0");
        }
        if self.ssh.user.trim().is_empty() {
            bail!("ssh.user must not be empty");
        }
        self.selection_policy()?;
        Ok(())
    }

    /// Fallback connection settings for hosts
    pub fn connection_defaults(&self) -> ConnectionDefaults {
        ConnectionDefaults {
            user: self.ssh.user.clone(),
            port: self.ssh.port,
            private_key: self
                .ssh
                .private_key
                .as_deref()
                .map(|key| paths::expand(key).to_string_lossy().into_owned()),
        }
    }

    /// Client-side SSH settings
    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            connect_timeout: self.ssh.connect_timeout,
            known_hosts: Some(self.ssh.known_hosts.trim())
                .filter(|path| !path.is_empty())
                .map(paths::expand),
            ..SshOptions::default()
        }
    }

    /// Retry policy for tasks that do not set their own
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.engine.retries,
            Duration::from_millis(self.engine.retry_delay_ms),
        )
    }

    /// Default host selection policy
    pub fn selection_policy(&self) -> Result<SelectionPolicy> {
        self.selection
            .policy
            .parse()
            .with_context(|| format!("selection.policy = \"{}\"", self.selection.policy))
    }

    /// Where run records are kept
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state.dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::state_dir(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
