//! Discovering operating system facts about a host.

use crate::error::Result;
use crate::runtime::Connector;
use serde_json::{Map, Value, json};

/// Host cache key holding gathered facts
pub const FACTS_KEY: &str = "os";

/// Host cache key holding process facts
pub const PROCESS_KEY: &str = "process";

/// Parse `KEY=value` lines, stripping optional quotes
pub fn parse_os_release(content: &str) -> Map<String, Value> {
    parse_pairs(content, '=')
}

fn parse_pairs(content: &str, separator: char) -> Map<String, Value> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(separator))
        .map(|(key, value)| {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            (key.trim().to_string(), Value::String(value.to_string()))
        })
        .collect()
}

/// Normalize `uname -m` style names to the names release artifacts use
pub fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" | "amd64" => "amd64",
        "aarch64" | "arm64" => "arm64",
        other => other,
    }
}

/// Collect OS and process facts and store them in the host cache.
///
/// Facts already cached are returned without touching the host again.
pub fn gather_facts(connector: &dyn Connector) -> Result<Value> {
    if let Some(os) = connector.cache().get(FACTS_KEY) {
        return Ok(os);
    }
    log::debug!("{}: gathering facts", connector.host());

    let release = connector.run("cat /etc/os-release", false)?;
    let kernel = connector.run("uname -r", false)?;
    let hostname = connector.run("hostname", false)?;
    let arch = connector.run("uname -m", false)?;
    let arch = arch.trim();

    let os = json!({
        "release": parse_os_release(&release),
        "kernel_version": kernel.trim(),
        "hostname": hostname.trim(),
        "architecture": normalize_arch(arch),
        "machine": arch,
    });

    // not every host exposes /proc (containers, BSDs)
    if let Ok(meminfo) = connector.run("cat /proc/meminfo", false) {
        let cpus = connector
            .run("nproc", false)
            .ok()
            .and_then(|n| n.trim().parse::<u64>().ok());
        connector.cache().set(
            PROCESS_KEY,
            json!({ "memory": parse_pairs(&meminfo, ':'), "cpu_count": cpus }),
        );
    }

    connector.cache().set(FACTS_KEY, os.clone());
    Ok(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CommandOutput;
    use inventory::Cache;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    struct Scripted {
        cache: Arc<Cache>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                cache: Arc::new(Cache::new()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Connector for Scripted {
        fn host(&self) -> &str {
            "node1"
        }

        fn run_command(&self, cmd: &str, _sudo: bool) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(cmd.to_string());
            Ok(match cmd {
                "cat /etc/os-release" => {
                    CommandOutput::ok("NAME=\"Ubuntu\"\nID=ubuntu\n# comment\nVERSION_ID=\"22.04\"\n")
                }
                "uname -r" => CommandOutput::ok("5.15.0-91-generic\n"),
                "hostname" => CommandOutput::ok("node1\n"),
                "uname -m" => CommandOutput::ok("x86_64\n"),
                "cat /proc/meminfo" => CommandOutput::ok("MemTotal:  16384 kB\n"),
                "nproc" => CommandOutput::ok("8\n"),
                _ => CommandOutput::failed(127, "not found"),
            })
        }

        fn copy_to(&self, _local: &Path, _remote: &str) -> Result<()> {
            Ok(())
        }

        fn fetch_from(&self, _remote: &str, _local: &Path) -> Result<()> {
            Ok(())
        }

        fn file_exists(&self, _path: &str) -> Result<bool> {
            Ok(false)
        }

        fn cache(&self) -> &Arc<Cache> {
            &self.cache
        }
    }

    #[test]
    fn test_parse_os_release() {
        let map = parse_os_release("ID=debian\nPRETTY_NAME='Debian 12'\n\n");
        assert_eq!(map["ID"], json!("debian"));
        assert_eq!(map["PRETTY_NAME"], json!("Debian 12"));
    }

    #[test]
    fn test_normalize_arch() {
        assert_eq!(normalize_arch("x86_64"), "amd64");
        assert_eq!(normalize_arch("aarch64"), "arm64");
        assert_eq!(normalize_arch("riscv64"), "riscv64");
    }

    #[test]
    fn test_gather_facts_populates_cache_once() {
        let conn = Scripted::new();
        let os = gather_facts(&conn).unwrap();
        assert_eq!(os["release"]["VERSION_ID"], json!("22.04"));
        assert_eq!(os["kernel_version"], json!("5.15.0-91-generic"));
        assert_eq!(os["architecture"], json!("amd64"));
        assert_eq!(conn.cache().get(FACTS_KEY), Some(os));
        assert_eq!(
            conn.cache().get(PROCESS_KEY).unwrap()["memory"]["MemTotal"],
            json!("16384 kB")
        );

        let calls = conn.calls.lock().unwrap().len();
        gather_facts(&conn).unwrap();
        assert_eq!(conn.calls.lock().unwrap().len(), calls);
    }
}
