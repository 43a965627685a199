use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use engine::{Phase, PipelineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// State file name inside the state directory
pub const RUNS_FILE: &str = "runs.toml";

/// Oldest records beyond this count are dropped on save
pub const MAX_RUNS: usize = 100;

// ============================================================================
// State Structures
// ============================================================================

/// Every recorded pipeline run, keyed by run id
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RunStore {
    #[serde(default)]
    pub runs: BTreeMap<String, RunRecord>,

    #[serde(skip)]
    path: PathBuf,
}

/// One pipeline run
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RunRecord {
    /// Playbook name
    pub playbook: String,

    /// Inventory file the run targeted
    pub inventory: String,

    /// Current phase
    #[serde(default)]
    pub phase: Phase,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Final aggregate, once the run ends
    pub result: Option<PipelineResult>,
}

// ============================================================================
// RunStore Implementation
// ============================================================================

impl RunStore {
    /// Load `runs.toml` from `dir`, or start empty if it doesn't exist
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(RUNS_FILE);

        if !path.exists() {
            log::debug!("Run state does not exist, starting empty");
            return Ok(Self {
                path,
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run state: {}", path.display()))?;
        let mut store: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse run state: {}", path.display()))?;
        store.path = path;

        log::debug!("Loaded {} run(s) from {}", store.runs.len(), store.path.display());
        Ok(store)
    }

    /// Save to disk, dropping the oldest records beyond [`MAX_RUNS`]
    pub fn save(&mut self) -> Result<()> {
        while self.runs.len() > MAX_RUNS {
            self.runs.pop_first();
        }

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }
        let content =
            toml::to_string_pretty(&self).context("Failed to serialize run state to TOML")?;
        fs::write(&self.path, &content)
            .with_context(|| format!("Failed to write run state: {}", self.path.display()))?;

        log::debug!("Saved run state to {}", self.path.display());
        Ok(())
    }

    /// Record a new run in `Pending` and return its id
    pub fn begin(&mut self, playbook: &str, inventory: &Path) -> String {
        let now = Utc::now();
        let base = format!("{}-{}", now.format("%Y%m%d-%H%M%S"), slug(playbook));
        let mut id = base.clone();
        let mut n = 1;
        while self.runs.contains_key(&id) {
            n += 1;
            id = format!("{base}-{n}");
        }

        self.runs.insert(
            id.clone(),
            RunRecord {
                playbook: playbook.to_string(),
                inventory: inventory.display().to_string(),
                phase: Phase::Pending,
                started_at: now,
                finished_at: None,
                result: None,
            },
        );
        id
    }

    /// Move a run to `Running`
    pub fn mark_running(&mut self, id: &str) -> Result<()> {
        let record = self.get_mut(id)?;
        if record.phase != Phase::Pending {
            bail!("run {id} is {} and cannot start", record.phase);
        }
        record.phase = Phase::Running;
        Ok(())
    }

    /// Store the final result; the phase follows the result
    pub fn finish(&mut self, id: &str, result: PipelineResult) -> Result<()> {
        let record = self.get_mut(id)?;
        if record.phase.is_terminal() {
            bail!("run {id} already finished");
        }
        record.phase = if result.phase.is_terminal() {
            result.phase
        } else {
            Phase::Failed
        };
        record.finished_at = Some(Utc::now());
        record.result = Some(result);
        Ok(())
    }

    /// Look up a run
    pub fn get(&self, id: &str) -> Option<&RunRecord> {
        self.runs.get(id)
    }

    /// Most recent run
    pub fn latest(&self) -> Option<(&String, &RunRecord)> {
        self.runs.iter().max_by_key(|(_, r)| r.started_at)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut RunRecord> {
        self.runs
            .get_mut(id)
            .with_context(|| format!("Unknown run: {id}"))
    }
}

/// Lowercase alphanumerics and dashes
fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() { "run".to_string() } else { slug.to_string() }
}

// ============================================================================
// Tests
// ============================================================================
