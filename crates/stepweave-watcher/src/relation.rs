//! Relations and their members

use crate::embedding::embed_tags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use stepweave_core::{sha256_hex, Result, StateVector};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(pub u64);

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A registration member: a plain tag or a nested list that collapses into
/// one alias tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Member {
    Tag(String),
    Nested(Vec<Member>),
}

impl From<&str> for Member {
    fn from(tag: &str) -> Self {
        Self::Tag(tag.to_string())
    }
}

impl From<String> for Member {
    fn from(tag: String) -> Self {
        Self::Tag(tag)
    }
}

impl<T: Into<Member>> From<Vec<T>> for Member {
    fn from(list: Vec<T>) -> Self {
        Self::Nested(list.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterFlags {
    /// Accept relations with fewer than two unique members.
    pub allow_singleton: bool,
    /// Skip minimal-relation damping and the transient mark.
    pub exempt: bool,
    /// Do not spawn a companion ghost.
    pub no_ghost: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    /// Unique tags, sorted.
    pub members: Vec<String>,
    pub strength: f64,
    pub priority_weight: f64,
    /// Alias tag -> the nested tags it stands for.
    #[serde(default)]
    pub substructures: BTreeMap<String, Vec<String>>,
    pub transient: bool,
    #[serde(default)]
    pub exempt: bool,
    pub created_cycle: u64,
    pub last_seen_cycle: u64,
    /// Tag of the companion ghost, if one was spawned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion: Option<String>,
}

impl Relation {
    pub fn arity(&self) -> usize {
        self.members.len()
    }

    pub fn is_minimal(&self) -> bool {
        self.members.len() == 2
    }

    pub fn is_higher_order(&self) -> bool {
        self.members.len() >= 3
    }

    /// Stable identity of the member set.
    pub fn signature(&self) -> String {
        member_signature(&self.members)
    }

    pub fn embed(&self, dim: usize) -> Result<StateVector> {
        embed_tags(&self.members, dim)
    }

    /// Cycles since the relation was last observed or used.
    pub fn age(&self, cycle: u64) -> u64 {
        cycle.saturating_sub(self.last_seen_cycle)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.members.binary_search_by(|m| m.as_str().cmp(tag)).is_ok()
    }

    /// Insert `tag` keeping members sorted. Returns false if already present.
    pub(crate) fn add_member(&mut self, tag: &str) -> bool {
        match self.members.binary_search_by(|m| m.as_str().cmp(tag)) {
            Ok(_) => false,
            Err(pos) => {
                self.members.insert(pos, tag.to_string());
                true
            }
        }
    }
}

/// Signature of a member set; order-independent.
pub fn member_signature<S: AsRef<str>>(members: &[S]) -> String {
    let sorted: BTreeSet<&str> = members.iter().map(AsRef::as_ref).collect();
    let joined = sorted.into_iter().collect::<Vec<_>>().join("\u{1f}");
    sha256_hex(joined.as_bytes())[..16].to_string()
}

/// Flatten registration members into unique sorted tags. Each nested list
/// becomes one alias tag `[a+b]`, recorded with its tags in the returned map.
pub(crate) fn flatten(members: Vec<Member>) -> (Vec<String>, BTreeMap<String, Vec<String>>) {
    let mut tags = BTreeSet::new();
    let mut substructures = BTreeMap::new();
    for member in members {
        match member {
            Member::Tag(tag) => {
                let tag = tag.trim().to_string();
                if !tag.is_empty() {
                    tags.insert(tag);
                }
            }
            Member::Nested(list) => {
                let mut inner = BTreeSet::new();
                collect_tags(list, &mut inner);
                if inner.is_empty() {
                    continue;
                }
                let inner: Vec<String> = inner.into_iter().collect();
                let alias = format!("[{}]", inner.join("+"));
                tags.insert(alias.clone());
                substructures.insert(alias, inner);
            }
        }
    }
    (tags.into_iter().collect(), substructures)
}

fn collect_tags(list: Vec<Member>, out: &mut BTreeSet<String>) {
    for member in list {
        match member {
            Member::Tag(tag) => {
                let tag = tag.trim().to_string();
                if !tag.is_empty() {
                    out.insert(tag);
                }
            }
            Member::Nested(inner) => collect_tags(inner, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_dedups_and_sorts() {
        let (tags, subs) = flatten(vec!["b".into(), "a".into(), "b".into(), " ".into()]);
        assert_eq!(tags, vec!["a", "b"]);
        assert!(subs.is_empty());
    }

    #[test]
    fn nested_lists_become_aliases() {
        let nested = Member::Nested(vec!["y".into(), "x".into(), Member::from(vec!["z"])]);
        let (tags, subs) = flatten(vec!["a".into(), nested]);
        assert_eq!(tags, vec!["[x+y+z]", "a"]);
        assert_eq!(subs["[x+y+z]"], vec!["x", "y", "z"]);
    }

    #[test]
    fn signature_ignores_order() {
        assert_eq!(member_signature(&["a", "b"]), member_signature(&["b", "a"]));
        assert_ne!(member_signature(&["a", "b"]), member_signature(&["a", "c"]));
        assert_eq!(member_signature(&["a", "b"]).len(), 16);
    }
}
