//! Running commands on the controller itself.

use crate::error::{Error, Result};
use crate::output::CommandOutput;
use crate::runtime::Connector;
use crate::shell::DEFAULT_SHELL;
use inventory::Cache;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Connector for the machine the engine runs on
#[derive(Debug, Clone)]
pub struct LocalConnector {
    host: String,
    shell: String,
    password: Option<String>,
    cache: Arc<Cache>,
}

impl LocalConnector {
    /// Create a connector with a fresh cache, using `$SHELL` or bash
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_cache(host, Arc::new(Cache::new()))
    }

    /// Create a connector sharing an existing host cache
    pub fn with_cache(host: impl Into<String>, cache: Arc<Cache>) -> Self {
        let shell = std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SHELL.to_string());
        Self {
            host: host.into(),
            shell,
            password: None,
            cache,
        }
    }

    /// Override the shell
    pub fn shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Password fed to `sudo -S`
    pub fn password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    fn command(&self, cmd: &str, sudo: bool) -> Command {
        if !sudo {
            let mut command = Command::new(&self.shell);
            command.arg("-c").arg(cmd);
            return command;
        }

        let mut command = Command::new("sudo");
        if self.password.is_some() {
            command.args(["-S", "-p", ""]);
        }
        command.arg("-E").arg(&self.shell).arg("-c").arg(cmd);
        command
    }
}

impl Connector for LocalConnector {
    fn host(&self) -> &str {
        &self.host
    }

    fn run_command(&self, cmd: &str, sudo: bool) -> Result<CommandOutput> {
        log::trace!("[{}] {}{cmd}", self.host, if sudo { "sudo: " } else { "" });

        let mut command = self.command(cmd, sudo);
        let spawn_err = |source| Error::Spawn {
            program: if sudo { "sudo".to_string() } else { self.shell.clone() },
            source,
        };

        let output = match (&self.password, sudo) {
            (Some(password), true) => {
                let mut child = command
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .map_err(spawn_err)?;
                if let Some(mut stdin) = child.stdin.take() {
                    writeln!(stdin, "{password}")?;
                }
                child.wait_with_output()?
            }
            _ => command.stdin(Stdio::null()).output().map_err(spawn_err)?,
        };

        Ok(output.into())
    }

    fn copy_to(&self, local: &Path, remote: &str) -> Result<()> {
        copy_file(&self.host, local, Path::new(remote))
    }

    fn fetch_from(&self, remote: &str, local: &Path) -> Result<()> {
        copy_file(&self.host, Path::new(remote), local)
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(Path::new(path).exists())
    }

    fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }
}

fn copy_file(host: &str, from: &Path, to: &Path) -> Result<()> {
    let copy_err = |message: String| Error::Copy {
        host: host.to_string(),
        source_path: from.to_path_buf(),
        destination: to.display().to_string(),
        message,
    };

    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| copy_err(e.to_string()))?;
    }
    fs::copy(from, to).map_err(|e| copy_err(e.to_string()))?;
    Ok(())
}
