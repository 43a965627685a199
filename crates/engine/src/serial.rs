//! Splitting host lists into rollout waves.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One wave size: an absolute count or a share of all hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum SerialEntry {
    /// Exact number of hosts
    Count(usize),
    /// Whole-number percentage of the total, rounded up
    Percent(u32),
}

impl SerialEntry {
    /// Absolute batch size for `total` hosts, never more than `total`
    pub fn resolve(&self, total: usize) -> Result<usize> {
        let size = match *self {
            Self::Count(n) => n,
            Self::Percent(pct) => total
                .saturating_mul(usize::try_from(pct).unwrap_or(usize::MAX))
                .div_ceil(100),
        };
        if size == 0 {
            return Err(Error::InvalidSerial {
                entry: self.to_string(),
                reason: "serial entry must not be zero",
            });
        }
        Ok(size.min(total.max(1)))
    }
}

impl fmt::Display for SerialEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Percent(p) => write!(f, "{p}%"),
        }
    }
}

impl std::str::FromStr for SerialEntry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidSerial {
            entry: format!("\"{s}\""),
            reason,
        };
        let trimmed = s.trim();

        if let Some(number) = trimmed.strip_suffix('%') {
            return number
                .trim()
                .parse::<u32>()
                .map(Self::Percent)
                .map_err(|_| invalid("percentage must be a whole number"));
        }

        trimmed
            .parse::<usize>()
            .map(Self::Count)
            .map_err(|_| invalid("expected a whole number or a percentage"))
    }
}

impl TryFrom<Value> for SerialEntry {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match &value {
            Value::Number(n) => n
                .as_u64()
                .map(|n| Self::Count(n as usize))
                .ok_or_else(|| Error::InvalidSerial {
                    entry: value.to_string(),
                    reason: "expected a whole number",
                }),
            Value::String(s) => s.parse(),
            other => Err(Error::InvalidSerial {
                entry: other.to_string(),
                reason: "unsupported type",
            }),
        }
    }
}

impl From<SerialEntry> for Value {
    fn from(entry: SerialEntry) -> Self {
        match entry {
            SerialEntry::Count(n) => Value::from(n),
            SerialEntry::Percent(_) => Value::String(entry.to_string()),
        }
    }
}

/// Parse a list of raw entries as written in playbooks
pub fn parse_spec(raw: &[Value]) -> Result<Vec<SerialEntry>> {
    raw.iter().cloned().map(SerialEntry::try_from).collect()
}

/// Partition `hosts` into ordered batches.
///
/// An empty spec yields a single batch. When the resolved sizes do not cover
/// every host, the last size repeats. The final batch may be short.
pub fn batch<T: Clone>(hosts: &[T], spec: &[SerialEntry]) -> Result<Vec<Vec<T>>> {
    if spec.is_empty() {
        return Ok(vec![hosts.to_vec()]);
    }

    let total = hosts.len();
    let mut sizes = spec
        .iter()
        .map(|entry| entry.resolve(total))
        .collect::<Result<Vec<_>>>()?;

    let mut covered = sizes.iter().fold(0usize, |sum, &n| sum.saturating_add(n));
    if let Some(&last) = sizes.last() {
        while covered < total {
            sizes.push(last);
            covered = covered.saturating_add(last);
        }
    }

    let mut batches = Vec::new();
    let mut remaining = hosts;
    for size in sizes {
        if remaining.is_empty() {
            break;
        }
        let (head, tail) = remaining.split_at(size.min(remaining.len()));
        batches.push(head.to_vec());
        remaining = tail;
    }
    Ok(batches)
}

/// Parse raw entries and batch in one step
pub fn batch_raw<T: Clone>(hosts: &[T], raw: &[Value]) -> Result<Vec<Vec<T>>> {
    batch(hosts, &parse_spec(raw)?)
}
