//! Prefix classifier and rule administration.
//!
//! Classification walks prefix lengths from the longest registered rule
//! down to one and stops at the first filter hit. At each length the allow
//! set is consulted before the deny set, and a set is only consulted at
//! lengths where it actually holds a rule.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::name::Name;
use crate::rules::{RuleError, RuleKind, RuleSet};

/// Default policy for names no rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Accept,
    Drop,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Accept => write!(f, "accept"),
            Mode::Drop => write!(f, "drop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mode has to be 'accept' or 'drop', got '{0}'")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Mode::Accept),
            "drop" => Ok(Mode::Drop),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Drop,
}

impl From<Mode> for Verdict {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Accept => Verdict::Accept,
            Mode::Drop => Verdict::Drop,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Firewall {
    mode: Mode,
    whitelist: RuleSet,
    blacklist: RuleSet,
}

impl Firewall {
    pub fn new(mode: Mode, whitelist_size: usize, blacklist_size: usize) -> Self {
        Self {
            mode,
            whitelist: RuleSet::new(RuleKind::Whitelist, whitelist_size),
            blacklist: RuleSet::new(RuleKind::Blacklist, blacklist_size),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn rules(&self, kind: RuleKind) -> &RuleSet {
        match kind {
            RuleKind::Whitelist => &self.whitelist,
            RuleKind::Blacklist => &self.blacklist,
        }
    }

    fn rules_mut(&mut self, kind: RuleKind) -> &mut RuleSet {
        match kind {
            RuleKind::Whitelist => &mut self.whitelist,
            RuleKind::Blacklist => &mut self.blacklist,
        }
    }

    /// Registered prefixes of one set, in order.
    pub fn list(&self, kind: RuleKind) -> impl Iterator<Item = &str> {
        self.rules(kind).iter()
    }

    /// Register `prefix` in the `kind` set.
    ///
    /// Prefixes are stored in canonical URI form, so `/a/` and `/a` are the
    /// same rule. A prefix can live in at most one of the two sets.
    pub fn append(&mut self, kind: RuleKind, prefix: &str) -> Result<(), RuleError> {
        let name = parse_prefix(prefix)?;
        let key = name.to_uri();

        if self.rules(kind.other()).contains(&key) {
            return Err(RuleError::Conflict {
                prefix: key,
                existing: kind.other(),
                requested: kind,
            });
        }
        self.rules_mut(kind).insert(key, &name)
    }

    pub fn delete(&mut self, kind: RuleKind, prefix: &str) -> Result<(), RuleError> {
        let not_found = || RuleError::NotFound {
            prefix: prefix.to_string(),
            kind,
        };
        let name = Name::from_uri(prefix).map_err(|_| not_found())?;
        let key = name.to_uri();
        if !self.rules(kind).contains(&key) {
            return Err(not_found());
        }
        self.rules_mut(kind).remove(&key, &name)
    }

    pub fn classify(&self, name: &Name) -> Verdict {
        let longest = self.whitelist.max_len().max(self.blacklist.max_len());
        if longest == 0 {
            return self.mode.into();
        }

        for length in (1..=longest.min(name.len())).rev() {
            let test_allow = self.whitelist.has_length(length);
            let test_deny = self.blacklist.has_length(length);
            if !test_allow && !test_deny {
                continue;
            }

            let hash = name.prefix_hash(length);
            if test_allow && self.whitelist.may_contain(hash) {
                debug!("{} matched whitelist at length {}", name, length);
                return Verdict::Accept;
            }
            if test_deny && self.blacklist.may_contain(hash) {
                debug!("{} matched blacklist at length {}", name, length);
                return Verdict::Drop;
            }
        }
        self.mode.into()
    }
}

fn parse_prefix(prefix: &str) -> Result<Name, RuleError> {
    match Name::from_uri(prefix) {
        Ok(name) if !name.is_empty() => Ok(name),
        _ => Err(RuleError::InvalidPrefix(prefix.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    fn firewall(mode: Mode) -> Firewall {
        Firewall::new(mode, 1000, 1000)
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut fw = firewall(Mode::Accept);
        fw.append(RuleKind::Whitelist, "/a/b").unwrap();
        fw.append(RuleKind::Blacklist, "/a").unwrap();

        assert_eq!(fw.classify(&name("/a/b/c")), Verdict::Accept);
        assert_eq!(fw.classify(&name("/a/x")), Verdict::Drop);
        assert_eq!(fw.classify(&name("/z")), Verdict::Accept);

        fw.set_mode(Mode::Drop);
        assert_eq!(fw.classify(&name("/z")), Verdict::Drop);
        assert_eq!(fw.classify(&name("/a/b/c")), Verdict::Accept);
    }

    #[test]
    fn test_empty_rules_use_mode() {
        let fw = firewall(Mode::Drop);
        assert_eq!(fw.classify(&name("/anything/at/all")), Verdict::Drop);
        assert_eq!(fw.classify(&Name::new()), Verdict::Drop);
    }

    #[test]
    fn test_name_shorter_than_rules() {
        let mut fw = firewall(Mode::Accept);
        fw.append(RuleKind::Blacklist, "/a/b/c").unwrap();
        assert_eq!(fw.classify(&name("/a/b")), Verdict::Accept);
        assert_eq!(fw.classify(&name("/a/b/c")), Verdict::Drop);
        assert_eq!(fw.classify(&name("/a/b/c/d/e")), Verdict::Drop);
    }

    #[test]
    fn test_mutual_exclusion() {
        let mut fw = firewall(Mode::Accept);
        fw.append(RuleKind::Whitelist, "/a").unwrap();

        let err = fw.append(RuleKind::Blacklist, "/a").unwrap_err();
        assert!(matches!(err, RuleError::Conflict { .. }));
        assert!(fw.rules(RuleKind::Blacklist).is_empty());
        assert!(fw.rules(RuleKind::Blacklist).buckets().is_empty());
    }

    #[test]
    fn test_duplicate_is_reported() {
        let mut fw = firewall(Mode::Accept);
        fw.append(RuleKind::Whitelist, "/a/b").unwrap();
        assert!(matches!(
            fw.append(RuleKind::Whitelist, "/a/b/"),
            Err(RuleError::Duplicate { .. })
        ));
        assert_eq!(fw.rules(RuleKind::Whitelist).buckets(), &[(2, 1)]);
    }

    #[test]
    fn test_invalid_prefixes() {
        let mut fw = firewall(Mode::Accept);
        assert!(matches!(fw.append(RuleKind::Whitelist, "/"), Err(RuleError::InvalidPrefix(_))));
        assert!(matches!(fw.append(RuleKind::Whitelist, "a/b"), Err(RuleError::InvalidPrefix(_))));
        assert!(fw.rules(RuleKind::Whitelist).is_empty());
    }

    #[test]
    fn test_list_full() {
        let mut fw = Firewall::new(Mode::Accept, 1, 1);
        fw.append(RuleKind::Whitelist, "/a").unwrap();
        assert_eq!(
            fw.append(RuleKind::Whitelist, "/b"),
            Err(RuleError::ListFull(RuleKind::Whitelist))
        );
    }

    #[test]
    fn test_delete_missing_leaves_buckets() {
        let mut fw = firewall(Mode::Accept);
        fw.append(RuleKind::Whitelist, "/a/b").unwrap();
        let before = fw.rules(RuleKind::Whitelist).buckets().to_vec();

        assert!(matches!(
            fw.delete(RuleKind::Whitelist, "/not-present"),
            Err(RuleError::NotFound { .. })
        ));
        assert!(matches!(
            fw.delete(RuleKind::Blacklist, "/a/b"),
            Err(RuleError::NotFound { .. })
        ));
        assert_eq!(fw.rules(RuleKind::Whitelist).buckets(), before.as_slice());
    }

    #[test]
    fn test_append_then_delete_restores_buckets() {
        let mut fw = firewall(Mode::Accept);
        fw.append(RuleKind::Blacklist, "/a").unwrap();
        fw.append(RuleKind::Blacklist, "/x/y").unwrap();
        let before = fw.rules(RuleKind::Blacklist).buckets().to_vec();

        fw.append(RuleKind::Blacklist, "/a/b/c").unwrap();
        fw.append(RuleKind::Blacklist, "/q").unwrap();
        fw.delete(RuleKind::Blacklist, "/a/b/c").unwrap();
        fw.delete(RuleKind::Blacklist, "/q").unwrap();

        assert_eq!(fw.rules(RuleKind::Blacklist).buckets(), before.as_slice());
        assert_eq!(fw.classify(&name("/a/b/c")), Verdict::Drop);
        assert_eq!(fw.classify(&name("/q")), Verdict::Accept);
    }

    #[test]
    fn test_list_is_ordered() {
        let mut fw = firewall(Mode::Accept);
        for prefix in ["/c", "/a/b", "/b"] {
            fw.append(RuleKind::Whitelist, prefix).unwrap();
        }
        let listed: Vec<&str> = fw.list(RuleKind::Whitelist).collect();
        assert_eq!(listed, vec!["/a/b", "/b", "/c"]);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("drop".parse::<Mode>().unwrap(), Mode::Drop);
        assert!("allow".parse::<Mode>().is_err());
        assert_eq!(Mode::default().to_string(), "accept");
    }
}
