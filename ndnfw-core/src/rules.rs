use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cuckoo::CuckooFilter;
use crate::name::Name;

/// Which rule set an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Allow set
    #[serde(alias = "white", alias = "allow")]
    Whitelist,
    /// Deny set
    #[serde(alias = "black", alias = "deny")]
    Blacklist,
}

impl RuleKind {
    pub fn other(self) -> Self {
        match self {
            RuleKind::Whitelist => RuleKind::Blacklist,
            RuleKind::Blacklist => RuleKind::Whitelist,
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Whitelist => write!(f, "whitelist"),
            RuleKind::Blacklist => write!(f, "blacklist"),
        }
    }
}

impl FromStr for RuleKind {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white" | "whitelist" | "allow" | "accept" => Ok(RuleKind::Whitelist),
            "black" | "blacklist" | "deny" | "drop" => Ok(RuleKind::Blacklist),
            other => Err(RuleError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("'{0}' is not a valid name prefix")]
    InvalidPrefix(String),
    #[error("'{prefix}' has been already appended in {existing}, so that it cannot be appended in {requested}")]
    Conflict {
        prefix: String,
        existing: RuleKind,
        requested: RuleKind,
    },
    #[error("'{prefix}' has been already appended in {kind}")]
    Duplicate { prefix: String, kind: RuleKind },
    #[error("{0} has been already full")]
    ListFull(RuleKind),
    #[error("cuckoo filter for {0} does not have enough space")]
    FilterFull(RuleKind),
    #[error("'{prefix}' does not exist in {kind}")]
    NotFound { prefix: String, kind: RuleKind },
    #[error("unknown rule set '{0}'")]
    UnknownKind(String),
}

/// One rule set: the exact prefixes, their membership filter and the
/// per-length reference counts used to skip lengths with no rule.
#[derive(Debug, Clone)]
pub struct RuleSet {
    kind: RuleKind,
    entries: BTreeSet<String>,
    filter: CuckooFilter,
    /// `(component_count, rules_of_that_length)`, sorted by length, no zeros.
    buckets: Vec<(usize, usize)>,
    max_entries: usize,
}

impl RuleSet {
    pub fn new(kind: RuleKind, max_entries: usize) -> Self {
        Self {
            kind,
            entries: BTreeSet::new(),
            filter: CuckooFilter::new(max_entries),
            buckets: Vec::new(),
            max_entries,
        }
    }

    #[cfg(test)]
    fn with_filter_capacity(kind: RuleKind, max_entries: usize, filter_capacity: usize) -> Self {
        Self {
            filter: CuckooFilter::new(filter_capacity),
            ..Self::new(kind, max_entries)
        }
    }

    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_entries
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.entries.contains(prefix)
    }

    /// Registered prefixes in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn buckets(&self) -> &[(usize, usize)] {
        &self.buckets
    }

    /// Component count of the longest rule, 0 when empty.
    pub fn max_len(&self) -> usize {
        self.buckets.last().map_or(0, |&(length, _)| length)
    }

    pub fn has_length(&self, length: usize) -> bool {
        self.buckets
            .binary_search_by_key(&length, |&(len, _)| len)
            .is_ok()
    }

    /// Probabilistic test of the length-`length` prefix hash.
    pub fn may_contain(&self, prefix_hash: u64) -> bool {
        self.filter.contains(prefix_hash)
    }

    /// Insert a parsed prefix stored under `key`.
    ///
    /// Checks for duplicates and capacity; the caller handles cross-set
    /// conflicts. Nothing changes unless `Ok` is returned.
    pub(crate) fn insert(&mut self, key: String, prefix: &Name) -> Result<(), RuleError> {
        if self.entries.contains(&key) {
            return Err(RuleError::Duplicate {
                prefix: key,
                kind: self.kind,
            });
        }
        if self.is_full() {
            return Err(RuleError::ListFull(self.kind));
        }
        if !self.filter.insert(prefix.prefix_hash(prefix.len())) {
            return Err(RuleError::FilterFull(self.kind));
        }

        self.entries.insert(key);
        self.bump(prefix.len());
        Ok(())
    }

    pub(crate) fn remove(&mut self, key: &str, prefix: &Name) -> Result<(), RuleError> {
        if !self.entries.remove(key) {
            return Err(RuleError::NotFound {
                prefix: key.to_string(),
                kind: self.kind,
            });
        }
        self.release(prefix.len());
        self.filter.delete(prefix.prefix_hash(prefix.len()));
        Ok(())
    }

    fn bump(&mut self, length: usize) {
        match self.buckets.binary_search_by_key(&length, |&(len, _)| len) {
            Ok(index) => self.buckets[index].1 += 1,
            Err(index) => self.buckets.insert(index, (length, 1)),
        }
    }

    fn release(&mut self, length: usize) {
        if let Ok(index) = self.buckets.binary_search_by_key(&length, |&(len, _)| len) {
            self.buckets[index].1 -= 1;
            if self.buckets[index].1 == 0 {
                self.buckets.remove(index);
            }
        }
    }
}
