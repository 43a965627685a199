//! Running commands on remote hosts over an `ssh2` session.
//!
//! One session is opened lazily per connector and reused for every command
//! and transfer. Commands run on their own exec channel; files move over SCP.

use crate::error::{Error, Result};
use crate::output::CommandOutput;
use crate::runtime::Connector;
use crate::shell::{self, DEFAULT_SHELL};
use inventory::{Cache, ConnectionSpec};
use ssh2::{CheckResult, KnownHostFileKind, Session};
use std::fs;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Mode for files written through SCP
const SCP_FILE_MODE: i32 = 0o644;

/// Client-side SSH settings shared by every host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    /// Seconds before a connection attempt or a blocking read is abandoned
    pub connect_timeout: u64,
    /// OpenSSH `known_hosts` file. Unknown hosts are appended; a changed key
    /// is refused. `None` skips host key verification.
    pub known_hosts: Option<PathBuf>,
    /// Remote shell used to run commands
    pub shell: String,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            known_hosts: None,
            shell: DEFAULT_SHELL.to_string(),
        }
    }
}

/// How the session proves who we are
#[derive(Debug, Clone, PartialEq, Eq)]
enum AuthMethod<'a> {
    Key(&'a Path),
    Password(&'a str),
    Agent,
}

/// Key file first, then password, then the running agent
fn auth_method(spec: &ConnectionSpec) -> AuthMethod<'_> {
    if let Some(key) = &spec.private_key {
        AuthMethod::Key(Path::new(key))
    } else if let Some(password) = &spec.password {
        AuthMethod::Password(password)
    } else {
        AuthMethod::Agent
    }
}

/// `known_hosts` label: bare address on port 22, `[address]:port` otherwise
fn known_hosts_label(address: &str, port: u16) -> String {
    if port == 22 {
        address.to_string()
    } else {
        format!("[{address}]:{port}")
    }
}

/// Connector driving one remote host
pub struct SshConnector {
    host: String,
    spec: ConnectionSpec,
    options: SshOptions,
    cache: Arc<Cache>,
    session: Mutex<Option<Session>>,
}

impl SshConnector {
    /// Create a connector for `host` reached through `spec`.
    ///
    /// Nothing is dialed until the first command or transfer.
    pub fn new(
        host: impl Into<String>,
        spec: ConnectionSpec,
        options: SshOptions,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            host: host.into(),
            spec,
            options,
            cache,
            session: Mutex::new(None),
        }
    }

    /// Resolved connection settings
    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.options.connect_timeout.max(1))
    }

    fn transport_err(&self, message: impl Into<String>) -> Error {
        Error::Transport {
            host: self.host.clone(),
            message: message.into(),
        }
    }

    fn session_err(&self, source: ssh2::Error) -> Error {
        Error::Session {
            host: self.host.clone(),
            source,
        }
    }

    /// The shared session, dialing and authenticating on first use
    fn session(&self) -> Result<Session> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = self.open()?;
        *slot = Some(session.clone());
        Ok(session)
    }

    fn open(&self) -> Result<Session> {
        let target = format!("{}:{}", self.spec.address, self.spec.port);
        let addr = target
            .to_socket_addrs()
            .map_err(|e| self.transport_err(format!("cannot resolve {target}: {e}")))?
            .next()
            .ok_or_else(|| self.transport_err(format!("no address for {target}")))?;

        let tcp = TcpStream::connect_timeout(&addr, self.timeout())
            .map_err(|e| self.transport_err(format!("connect {target}: {e}")))?;

        let mut session = Session::new().map_err(|e| self.session_err(e))?;
        session.set_timeout(u32::try_from(self.timeout().as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|e| self.session_err(e))?;

        self.verify_host_key(&session)?;
        self.authenticate(&session)?;

        log::debug!(
            "{}: ssh session open as {}@{target}",
            self.host,
            self.spec.user
        );
        Ok(session)
    }

    fn verify_host_key(&self, session: &Session) -> Result<()> {
        let Some(path) = &self.options.known_hosts else {
            log::debug!("{}: host key verification disabled", self.host);
            return Ok(());
        };
        let (key, key_type) = session
            .host_key()
            .ok_or_else(|| self.transport_err("server sent no host key"))?;

        let mut known = session.known_hosts().map_err(|e| self.session_err(e))?;
        if path.exists() {
            known
                .read_file(path, KnownHostFileKind::OpenSSH)
                .map_err(|e| self.session_err(e))?;
        }

        let label = known_hosts_label(&self.spec.address, self.spec.port);
        match known.check_port(&self.spec.address, self.spec.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::NotFound => {
                log::info!("{}: adding host key for {label} to {}", self.host, path.display());
                known
                    .add(&label, key, "added by kubefleet", key_type.into())
                    .map_err(|e| self.session_err(e))?;
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    fs::create_dir_all(dir)?;
                }
                known
                    .write_file(path, KnownHostFileKind::OpenSSH)
                    .map_err(|e| self.session_err(e))
            }
            CheckResult::Mismatch => Err(Error::HostKeyMismatch {
                host: self.host.clone(),
                known_hosts: path.clone(),
            }),
            CheckResult::Failure => Err(self.transport_err("host key check failed")),
        }
    }

    fn authenticate(&self, session: &Session) -> Result<()> {
        let user = &self.spec.user;
        let attempt = match auth_method(&self.spec) {
            AuthMethod::Key(key) => session.userauth_pubkey_file(user, None, key, None),
            AuthMethod::Password(password) => session.userauth_password(user, password),
            AuthMethod::Agent => session.userauth_agent(user),
        };

        if let Err(e) = &attempt {
            log::debug!("{}: authentication error: {e}", self.host);
        }
        if attempt.is_err() || !session.authenticated() {
            return Err(Error::Authentication {
                host: self.host.clone(),
                user: user.clone(),
            });
        }
        Ok(())
    }

    fn copy_err(&self, source_path: &Path, destination: &str, message: String) -> Error {
        Error::Copy {
            host: self.host.clone(),
            source_path: source_path.to_path_buf(),
            destination: destination.to_string(),
            message,
        }
    }
}

impl Connector for SshConnector {
    fn host(&self) -> &str {
        &self.host
    }

    fn run_command(&self, cmd: &str, sudo: bool) -> Result<CommandOutput> {
        log::trace!("[{}] {}{cmd}", self.host, if sudo { "sudo: " } else { "" });

        let password = self.spec.password.as_deref().filter(|_| sudo);
        let remote = shell::wrap(&self.options.shell, cmd, sudo, password.is_some());

        let session = self.session()?;
        let mut channel = session.channel_session().map_err(|e| self.session_err(e))?;
        channel.exec(&remote).map_err(|e| self.session_err(e))?;

        if let Some(password) = password {
            writeln!(channel, "{password}")?;
            channel.flush()?;
        }
        channel.send_eof().map_err(|e| self.session_err(e))?;

        let mut stdout = String::new();
        channel.read_to_string(&mut stdout)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;

        channel.wait_close().map_err(|e| self.session_err(e))?;
        let code = channel.exit_status().map_err(|e| self.session_err(e))?;

        Ok(CommandOutput {
            stdout,
            stderr,
            code: Some(code),
        })
    }

    fn copy_to(&self, local: &Path, remote: &str) -> Result<()> {
        let content = fs::read(local).map_err(|e| self.copy_err(local, remote, e.to_string()))?;
        if let Some(parent) = shell::parent_dir(remote) {
            self.run(&format!("mkdir -p {}", shell::quote(parent)), false)?;
        }

        let session = self.session()?;
        let size = content.len() as u64;
        let mut channel = session
            .scp_send(Path::new(remote), SCP_FILE_MODE, size, None)
            .map_err(|e| self.copy_err(local, remote, e.to_string()))?;
        channel
            .write_all(&content)
            .map_err(|e| self.copy_err(local, remote, e.to_string()))?;

        channel.send_eof().map_err(|e| self.session_err(e))?;
        channel.wait_eof().map_err(|e| self.session_err(e))?;
        channel.close().map_err(|e| self.session_err(e))?;
        channel.wait_close().map_err(|e| self.session_err(e))?;

        log::debug!("{}: copied {} -> {remote} ({size} bytes)", self.host, local.display());
        Ok(())
    }

    fn fetch_from(&self, remote: &str, local: &Path) -> Result<()> {
        let destination = local.display().to_string();
        let session = self.session()?;
        let (mut channel, stat) = session
            .scp_recv(Path::new(remote))
            .map_err(|e| self.copy_err(Path::new(remote), &destination, e.to_string()))?;

        let mut content = Vec::with_capacity(usize::try_from(stat.size()).unwrap_or(0));
        channel
            .read_to_end(&mut content)
            .map_err(|e| self.copy_err(Path::new(remote), &destination, e.to_string()))?;
        channel.send_eof().map_err(|e| self.session_err(e))?;
        channel.wait_eof().map_err(|e| self.session_err(e))?;
        channel.close().map_err(|e| self.session_err(e))?;
        channel.wait_close().map_err(|e| self.session_err(e))?;

        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(local, content)
            .map_err(|e| self.copy_err(Path::new(remote), &destination, e.to_string()))?;
        Ok(())
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        let output = self.run_command(&format!("test -e {}", shell::quote(path)), false)?;
        match output.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => Err(Error::CommandFailed {
                host: self.host.clone(),
                code,
                stdout: output.stdout,
                stderr: output.stderr,
            }),
        }
    }

    fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }
}
