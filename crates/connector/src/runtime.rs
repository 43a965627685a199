//! The connector contract shared by every transport.

use crate::error::{Error, Result};
use crate::output::CommandOutput;
use inventory::Cache;
use std::path::Path;
use std::sync::Arc;

/// Somewhere commands can run: the controller itself or a remote host.
///
/// Implementations must be shareable across worker threads; the engine calls
/// a host's connector only from that host's worker, but holds connectors for
/// many hosts at once.
pub trait Connector: Send + Sync {
    /// Inventory name of the host this connector drives
    fn host(&self) -> &str;

    /// Run a shell command, optionally elevated.
    ///
    /// A non-zero exit is reported through [`CommandOutput::code`], not as an
    /// error. Errors mean the command could not be run at all.
    fn run_command(&self, cmd: &str, sudo: bool) -> Result<CommandOutput>;

    /// Run a command and return its stdout, failing on a non-zero exit
    fn run(&self, cmd: &str, sudo: bool) -> Result<String> {
        let output = self.run_command(cmd, sudo)?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(Error::CommandFailed {
                host: self.host().to_string(),
                code: output.code,
                stdout: output.stdout,
                stderr: output.stderr,
            })
        }
    }

    /// Copy a controller file to the host
    fn copy_to(&self, local: &Path, remote: &str) -> Result<()>;

    /// Copy a host file to the controller
    fn fetch_from(&self, remote: &str, local: &Path) -> Result<()>;

    /// Check whether a path exists on the host
    fn file_exists(&self, path: &str) -> Result<bool>;

    /// Host-scope fact cache
    fn cache(&self) -> &Arc<Cache>;
}
