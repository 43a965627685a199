//! Group flattening and host patterns.

use crate::error::{Error, Result};
use crate::model::Inventory;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Pseudo-group containing every host in inventory order
pub const ALL_GROUP: &str = "all";

/// Pseudo-group containing hosts no declared group claims
pub const UNGROUPED_GROUP: &str = "ungrouped";

static INDEXED_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\[(\d+)\]$").expect("valid regex"));

static RANDOM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\|\s*random$").expect("valid regex"));

/// State for one depth-first expansion.
///
/// Each resolution owns its own traversal, so concurrent resolutions never
/// share visited sets.
struct Traversal<'a> {
    inventory: &'a Inventory,
    visited_groups: HashSet<&'a str>,
    emitted_hosts: HashSet<&'a str>,
    output: Vec<String>,
}

impl<'a> Traversal<'a> {
    fn new(inventory: &'a Inventory) -> Self {
        Self {
            inventory,
            visited_groups: HashSet::new(),
            emitted_hosts: HashSet::new(),
            output: Vec::new(),
        }
    }

    fn expand(&mut self, name: &str) {
        let Some((name, group)) = self.inventory.groups.get_key_value(name) else {
            return;
        };
        self.visited_groups.insert(name.as_str());

        for child in &group.groups {
            if self.visited_groups.contains(child.as_str()) {
                continue;
            }
            self.expand(child);
        }

        for host in &group.hosts {
            let Some((host, _)) = self.inventory.hosts.get_key_value(host) else {
                continue;
            };
            if self.emitted_hosts.insert(host.as_str()) {
                self.output.push(host.clone());
            }
        }
    }
}

impl Inventory {
    /// Flatten a group into an ordered, duplicate-free list of host names.
    ///
    /// Child groups are expanded before the group's own hosts. Unknown groups
    /// resolve to an empty list and hosts missing from the inventory are
    /// dropped. Cycles terminate. `all` and `ungrouped` are answered as
    /// pseudo-groups unless the inventory declares a group of that name.
    pub fn resolve_group(&self, name: &str) -> Vec<String> {
        if !self.groups.contains_key(name) {
            match name {
                ALL_GROUP => return self.host_names(),
                UNGROUPED_GROUP => return self.ungrouped(),
                _ => {}
            }
        }

        let mut traversal = Traversal::new(self);
        traversal.expand(name);
        traversal.output
    }

    /// Hosts available for assignment to a role.
    ///
    /// An explicit `ungrouped` group is used when declared; otherwise these
    /// are the hosts that no declared group resolves to.
    pub fn ungrouped(&self) -> Vec<String> {
        if self.groups.contains_key(UNGROUPED_GROUP) {
            return self.resolve_group(UNGROUPED_GROUP);
        }

        let claimed: HashSet<String> = self
            .groups
            .keys()
            .filter(|name| name.as_str() != ALL_GROUP)
            .flat_map(|name| self.resolve_group(name))
            .collect();

        self.hosts
            .keys()
            .filter(|host| !claimed.contains(*host))
            .cloned()
            .collect()
    }

    /// Whether `name` is a declared group or a pseudo-group
    pub fn is_group(&self, name: &str) -> bool {
        self.groups.contains_key(name) || name == ALL_GROUP || name == UNGROUPED_GROUP
    }

    /// Expand host patterns into host names.
    ///
    /// Each pattern is a host name, a group name, `group[i]` for the i-th
    /// resolved host of a group, or `group | random` for one randomly chosen
    /// host. Results keep first-seen order without duplicates. A pattern that
    /// matches nothing contributes nothing.
    pub fn hosts_for<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut hosts = Vec::new();

        for pattern in patterns {
            for host in self.expand_pattern(pattern.as_ref().trim())? {
                if seen.insert(host.clone()) {
                    hosts.push(host);
                }
            }
        }
        Ok(hosts)
    }

    /// Whether a pattern names a known host or group, directly or through
    /// the `group[i]` and `group | random` forms
    pub fn is_known_pattern(&self, pattern: &str) -> bool {
        let pattern = pattern.trim();
        if self.contains_host(pattern) || self.is_group(pattern) {
            return true;
        }
        [&INDEXED_PATTERN, &RANDOM_PATTERN]
            .iter()
            .filter_map(|re| re.captures(pattern))
            .any(|caps| self.is_group(caps[1].trim()))
    }

    fn expand_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        if self.contains_host(pattern) {
            return Ok(vec![pattern.to_string()]);
        }
        if self.is_group(pattern) {
            return Ok(self.resolve_group(pattern));
        }

        if let Some(caps) = INDEXED_PATTERN.captures(pattern) {
            let group = caps[1].trim();
            let index: usize = caps[2]
                .parse()
                .map_err(|_| Error::Invalid(format!("bad host index in \"{pattern}\"")))?;
            let members = self.resolve_group(group);
            return members
                .get(index)
                .map(|host| vec![host.clone()])
                .ok_or_else(|| Error::IndexOutOfRange {
                    group: group.to_string(),
                    index,
                    len: members.len(),
                });
        }

        if let Some(caps) = RANDOM_PATTERN.captures(pattern) {
            let members = self.resolve_group(caps[1].trim());
            return Ok(members.choose(&mut OsRng).cloned().into_iter().collect());
        }

        log::debug!("Host pattern \"{pattern}\" matched nothing");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Group;
    use serde_json::json;

    fn inventory(hosts: &[&str]) -> Inventory {
        let mut inv = Inventory::new();
        for host in hosts {
            inv.add_host(*host, json!({}));
        }
        inv
    }

    #[test]
    fn test_children_before_own_hosts() {
        let mut inv = inventory(&["a", "b", "c"]);
        inv.add_group("child", Group::with_hosts(["b"]));
        inv.add_group("parent", Group::with_hosts(["c", "a"]).child("child"));
        assert_eq!(inv.resolve_group("parent"), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_diamond_membership_deduplicates() {
        let mut inv = inventory(&["a", "b", "c"]);
        inv.add_group("left", Group::with_hosts(["a", "b"]));
        inv.add_group("right", Group::with_hosts(["b", "c"]));
        inv.add_group("top", Group::default().child("left").child("right"));
        assert_eq!(inv.resolve_group("top"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycles_terminate() {
        let mut inv = inventory(&["a", "b"]);
        inv.add_group("x", Group::with_hosts(["a"]).child("y"));
        inv.add_group("y", Group::with_hosts(["b"]).child("x"));
        assert_eq!(inv.resolve_group("x"), vec!["b", "a"]);
        assert_eq!(inv.resolve_group("y"), vec!["a", "b"]);
    }

    #[test]
    fn test_self_reference_terminates() {
        let mut inv = inventory(&["a"]);
        inv.add_group("loop", Group::with_hosts(["a"]).child("loop"));
        assert_eq!(inv.resolve_group("loop"), vec!["a"]);
    }

    #[test]
    fn test_unknown_group_and_missing_hosts() {
        let mut inv = inventory(&["a"]);
        inv.add_group("g", Group::with_hosts(["ghost", "a"]).child("nope"));
        assert!(inv.resolve_group("does-not-exist").is_empty());
        assert_eq!(inv.resolve_group("g"), vec!["a"]);
    }

    #[test]
    fn test_child_order_permutation_keeps_host_set() {
        let build = |children: [&str; 2]| {
            let mut inv = inventory(&["a", "b", "c"]);
            inv.add_group("p", Group::with_hosts(["a", "b"]));
            inv.add_group("q", Group::with_hosts(["b", "c"]));
            inv.add_group(
                "top",
                Group::default().child(children[0]).child(children[1]),
            );
            let mut hosts = inv.resolve_group("top");
            let len = hosts.len();
            hosts.sort();
            hosts.dedup();
            assert_eq!(hosts.len(), len);
            hosts
        };
        assert_eq!(build(["p", "q"]), build(["q", "p"]));
    }

    #[test]
    fn test_all_and_ungrouped_pseudo_groups() {
        let mut inv = inventory(&["a", "b", "c", "d"]);
        inv.add_group("workers", Group::with_hosts(["b"]));
        inv.add_group("k8s", Group::default().child("workers").child("etcd"));
        inv.add_group("etcd", Group::with_hosts(["d"]));
        assert_eq!(inv.resolve_group(ALL_GROUP), vec!["a", "b", "c", "d"]);
        assert_eq!(inv.resolve_group(UNGROUPED_GROUP), vec!["a", "c"]);
    }

    #[test]
    fn test_explicit_ungrouped_group_is_used() {
        let mut inv = inventory(&["a", "b", "c"]);
        inv.add_group(UNGROUPED_GROUP, Group::with_hosts(["c"]));
        assert_eq!(inv.ungrouped(), vec!["c"]);
    }

    #[test]
    fn test_hosts_for_patterns() {
        let mut inv = inventory(&["n1", "n2", "n3"]);
        inv.add_group("etcd", Group::with_hosts(["n2", "n3"]));

        assert_eq!(inv.hosts_for(&["etcd[0]"]).unwrap(), vec!["n2"]);
        assert_eq!(inv.hosts_for(&["n1", "etcd"]).unwrap(), vec!["n1", "n2", "n3"]);
        assert_eq!(inv.hosts_for(&["etcd", "n2"]).unwrap(), vec!["n2", "n3"]);
        assert!(inv.hosts_for(&["nothing"]).unwrap().is_empty());
        assert!(matches!(
            inv.hosts_for(&["etcd[5]"]),
            Err(Error::IndexOutOfRange { index: 5, len: 2, .. })
        ));
    }

    #[test]
    fn test_known_patterns() {
        let mut inv = Inventory::new();
        inv.add_host("n1", json!({}));
        inv.add_group("etcd", Group::with_hosts(["n1"]));

        assert!(inv.is_known_pattern("n1"));
        assert!(inv.is_known_pattern("etcd"));
        assert!(inv.is_known_pattern("all"));
        assert!(inv.is_known_pattern("etcd[3]"));
        assert!(inv.is_known_pattern("etcd | random"));
        assert!(!inv.is_known_pattern("workers"));
        assert!(!inv.is_known_pattern("workers[0]"));
    }

    #[test]
    fn test_random_pattern_picks_one_member() {
        let mut inv = inventory(&["n1", "n2", "n3"]);
        inv.add_group("etcd", Group::with_hosts(["n2", "n3"]));
        for _ in 0..20 {
            let picked = inv.hosts_for(&["etcd | random"]).unwrap();
            assert_eq!(picked.len(), 1);
            assert!(picked[0] == "n2" || picked[0] == "n3");
        }
        assert!(inv.hosts_for(&["empty|random"]).unwrap().is_empty());
    }
}
