//! Recording connectors for engine tests.

use connector::{CommandOutput, Connector, ConnectorFactory, Result};
use inventory::{Cache, Inventory};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Connector that records every call and answers from a script
pub struct MockConnector {
    host: String,
    cache: Arc<Cache>,
    calls: Mutex<Vec<String>>,
    script: Vec<(String, CommandOutput)>,
    files: Mutex<HashSet<String>>,
}

impl MockConnector {
    pub fn new(host: &str) -> Self {
        Self::with_cache(host, Arc::new(Cache::new()))
    }

    pub fn with_cache(host: &str, cache: Arc<Cache>) -> Self {
        Self {
            host: host.to_string(),
            cache,
            calls: Mutex::new(Vec::new()),
            script: Vec::new(),
            files: Mutex::new(HashSet::new()),
        }
    }

    /// Commands containing `pattern` return `output`
    pub fn respond(mut self, pattern: &str, output: CommandOutput) -> Self {
        self.script.push((pattern.to_string(), output));
        self
    }

    pub fn add_file(&self, path: &str) {
        self.files.lock().unwrap().insert(path.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(pattern)).count()
    }
}

impl Connector for MockConnector {
    fn host(&self) -> &str {
        &self.host
    }

    fn run_command(&self, cmd: &str, sudo: bool) -> Result<CommandOutput> {
        let recorded = if sudo { format!("sudo {cmd}") } else { cmd.to_string() };
        self.calls.lock().unwrap().push(recorded);
        Ok(self
            .script
            .iter()
            .find(|(pattern, _)| cmd.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }

    fn copy_to(&self, local: &Path, remote: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("copy_to {} {remote}", local.display()));
        self.add_file(remote);
        Ok(())
    }

    fn fetch_from(&self, remote: &str, local: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("fetch_from {remote} {}", local.display()));
        Ok(())
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains(path))
    }

    fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }
}

type Script = Vec<(Option<String>, String, CommandOutput)>;

/// Factory handing out one [`MockConnector`] per host
#[derive(Default)]
pub struct MockFactory {
    connectors: Mutex<HashMap<String, Arc<MockConnector>>>,
    script: Script,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `pattern` fail on `host` (every host when `None`)
    pub fn fail(mut self, host: Option<&str>, pattern: &str, code: i32, stderr: &str) -> Self {
        self.script.push((
            host.map(str::to_string),
            pattern.to_string(),
            CommandOutput::failed(code, stderr),
        ));
        self
    }

    /// Commands containing `pattern` print `stdout` on every host
    pub fn respond(mut self, pattern: &str, stdout: &str) -> Self {
        self.script
            .push((None, pattern.to_string(), CommandOutput::ok(stdout)));
        self
    }

    pub fn connector(&self, host: &str) -> Arc<MockConnector> {
        Arc::clone(
            self.connectors
                .lock()
                .unwrap()
                .get(host)
                .unwrap_or_else(|| panic!("no connector created for {host}")),
        )
    }

    /// Hosts that received a command containing `pattern`, sorted
    pub fn hosts_running(&self, pattern: &str) -> Vec<String> {
        let mut hosts: Vec<String> = self
            .connectors
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, c)| c.count(pattern) > 0)
            .map(|(h, _)| h.clone())
            .collect();
        hosts.sort();
        hosts
    }

    fn build(&self, host: &str, cache: Arc<Cache>) -> Arc<MockConnector> {
        let mut guard = self.connectors.lock().unwrap();
        let conn = guard.entry(host.to_string()).or_insert_with(|| {
            let mut conn = MockConnector::with_cache(host, cache);
            for (target, pattern, output) in &self.script {
                if target.as_deref().is_none_or(|t| t == host) {
                    conn = conn.respond(pattern, output.clone());
                }
            }
            Arc::new(conn)
        });
        Arc::clone(conn)
    }
}

impl ConnectorFactory for MockFactory {
    fn connect(&self, inventory: &Inventory, host: &str) -> Result<Arc<dyn Connector>> {
        let cache = Arc::clone(inventory.require_host(host)?.cache());
        Ok(self.build(host, cache))
    }

    fn local(&self) -> Arc<dyn Connector> {
        self.build(inventory::LOCALHOST, Arc::new(Cache::new()))
    }
}
