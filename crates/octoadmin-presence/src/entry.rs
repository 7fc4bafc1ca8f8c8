use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One identity present in a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    /// Membership key. Two entries with the same identity are the same member.
    pub identity: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl PresenceEntry {
    pub fn new(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            avatar_url: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Immutable set of presence entries keyed by identity.
///
/// Never mutated in place: `with_entry` and `without` return a new set, or
/// `None` when the operation would not change anything. Equality is by value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSet {
    members: BTreeMap<String, PresenceEntry>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.members.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&PresenceEntry> {
        self.members.get(identity)
    }

    /// A copy of this set with `entry` added, or `None` if its identity is
    /// already present.
    pub fn with_entry(&self, entry: PresenceEntry) -> Option<Self> {
        if self.members.contains_key(&entry.identity) {
            return None;
        }
        let mut members = self.members.clone();
        members.insert(entry.identity.clone(), entry);
        Some(Self { members })
    }

    /// A copy of this set without `identity`, or `None` if it is absent.
    pub fn without(&self, identity: &str) -> Option<Self> {
        if !self.members.contains_key(identity) {
            return None;
        }
        let mut members = self.members.clone();
        members.remove(identity);
        Some(Self { members })
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresenceEntry> {
        self.members.values()
    }

    /// List view ordered by identity.
    pub fn to_vec(&self) -> Vec<PresenceEntry> {
        self.members.values().cloned().collect()
    }
}

impl FromIterator<PresenceEntry> for PresenceSet {
    fn from_iter<I: IntoIterator<Item = PresenceEntry>>(iter: I) -> Self {
        Self {
            members: iter
                .into_iter()
                .map(|entry| (entry.identity.clone(), entry))
                .collect(),
        }
    }
}
