//! Assigning ungrouped hosts to role groups as a cluster scales up.

use crate::error::{Error, Result};
use crate::model::{Group, Inventory};
use crate::resolve::{ALL_GROUP, UNGROUPED_GROUP};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How candidates are picked from the ungrouped pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// First hosts in inventory order
    Sequential,
    /// Securely shuffled pool
    #[default]
    Random,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Random => write!(f, "random"),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "sequence" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            other => Err(Error::Invalid(format!("unknown selection policy \"{other}\""))),
        }
    }
}

/// Outcome of one selection.
///
/// A short pool is not an error: `assigned` holds what was available and
/// [`Selection::shortfall`] tells how many hosts are still missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Hosts appended to the group by this call
    pub assigned: Vec<String>,
    /// How many hosts were asked for
    pub requested: usize,
}

impl Selection {
    /// Hosts still missing
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.assigned.len())
    }

    /// Whether every requested host was assigned
    pub fn is_complete(&self) -> bool {
        self.shortfall() == 0
    }
}

impl Inventory {
    /// Move `needed` hosts from the ungrouped pool into `group`.
    ///
    /// The group is created when absent. Selected hosts are removed from an
    /// explicit `ungrouped` group. `needed == 0` selects nothing.
    pub fn select(
        &mut self,
        group: &str,
        needed: usize,
        policy: SelectionPolicy,
    ) -> Result<Selection> {
        if group == ALL_GROUP || group == UNGROUPED_GROUP {
            return Err(Error::Invalid(format!("cannot assign hosts to pseudo-group {group}")));
        }

        let mut selection = Selection {
            assigned: Vec::new(),
            requested: needed,
        };
        if needed == 0 {
            return Ok(selection);
        }

        let members = self.resolve_group(group);
        let mut pool: Vec<String> = self
            .ungrouped()
            .into_iter()
            .filter(|host| !members.contains(host))
            .collect();

        if policy == SelectionPolicy::Random {
            pool.shuffle(&mut OsRng);
        }
        pool.truncate(needed);
        selection.assigned = pool;

        self.groups
            .entry(group.to_string())
            .or_insert_with(Group::default)
            .hosts
            .extend(selection.assigned.iter().cloned());

        if let Some(ungrouped) = self.groups.get_mut(UNGROUPED_GROUP) {
            ungrouped.hosts.retain(|h| !selection.assigned.contains(h));
        }

        if selection.is_complete() {
            log::info!(
                "Assigned {} host(s) to {group} ({policy})",
                selection.assigned.len()
            );
        } else {
            log::warn!(
                "Group {group} needs {} more host(s) but only {} were available",
                needed,
                selection.assigned.len()
            );
        }
        Ok(selection)
    }

    /// Grow `group` until it resolves to `desired` hosts.
    ///
    /// Groups already at or above the target are left untouched.
    pub fn scale_group(
        &mut self,
        group: &str,
        desired: usize,
        policy: SelectionPolicy,
    ) -> Result<Selection> {
        let current = self.resolve_group(group).len();
        self.select(group, desired.saturating_sub(current), policy)
    }
}
