//! Artifact identity and the mutable artifact set.
//!
//! The set is a persistent ordered map: cloning it is O(1) and the clone
//! never observes later mutations of the original, so a clone is a valid
//! deep snapshot.

use std::borrow::Borrow;
use std::fmt;

use im::OrdMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identifier of one artifact, e.g. `"src/app.js"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ArtifactId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ArtifactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content digest (SHA-256 hex string) of an artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The mutable artifact set an engine run operates on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    entries: OrdMap<ArtifactId, String>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of `id`, if present.
    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    /// Whether `id` is part of the set.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert or replace an artifact, returning the previous content.
    pub fn insert(&mut self, id: impl Into<ArtifactId>, content: impl Into<String>) -> Option<String> {
        self.entries.insert(id.into(), content.into())
    }

    /// Remove `id`, returning its content.
    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.entries.remove(id)
    }

    /// Number of artifacts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the set holds no artifact.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate artifacts in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactId, &str)> {
        self.entries.iter().map(|(id, content)| (id, content.as_str()))
    }

    /// SHA-256 over every `(id, content)` pair in id order, length-prefixed.
    pub fn digest(&self) -> ContentDigest {
        let mut hasher = Sha256::new();
        for (id, content) in self.entries.iter() {
            hasher.update((id.as_str().len() as u64).to_le_bytes());
            hasher.update(id.as_str().as_bytes());
            hasher.update((content.len() as u64).to_le_bytes());
            hasher.update(content.as_bytes());
        }
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Ids whose content differs from `base`, including additions and removals.
    pub fn changed_since(&self, base: &ArtifactSet) -> Vec<ArtifactId> {
        let mut changed: Vec<ArtifactId> = self
            .entries
            .iter()
            .filter(|(id, content)| base.entries.get(*id) != Some(*content))
            .map(|(id, _)| id.clone())
            .collect();
        changed.extend(
            base.entries
                .keys()
                .filter(|id| !self.entries.contains_key(*id))
                .cloned(),
        );
        changed.sort();
        changed
    }

    /// Copy the state of `ids` from `source` into this set; ids absent from
    /// `source` are removed here.
    pub fn adopt(&mut self, source: &ArtifactSet, ids: &[ArtifactId]) {
        for id in ids {
            match source.entries.get(id) {
                Some(content) => {
                    self.entries.insert(id.clone(), content.clone());
                }
                None => {
                    self.entries.remove(id);
                }
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ArtifactSet
where
    K: Into<ArtifactId>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = ArtifactSet::new();
        for (id, content) in iter {
            set.insert(id, content);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_independent_of_later_mutation() {
        let mut live: ArtifactSet = [("a.js", "a=1;")].into_iter().collect();
        let snapshot = live.clone();

        live.insert("a.js", "a=1; bad syntax");
        live.insert("b.js", "b=2;");

        assert_eq!(snapshot.get("a.js"), Some("a=1;"));
        assert!(!snapshot.contains("b.js"));
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let a: ArtifactSet = [("x", "1"), ("y", "2")].into_iter().collect();
        let b: ArtifactSet = [("y", "2"), ("x", "1")].into_iter().collect();
        assert_eq!(a.digest(), b.digest());

        let c: ArtifactSet = [("x", "12"), ("y", "")].into_iter().collect();
        assert_ne!(a.digest(), c.digest(), "length prefix must separate fields");
        assert_eq!(a.digest().as_str().len(), 64);
        assert_eq!(a.digest().short().len(), 12);
    }

    #[test]
    fn changed_since_reports_updates_additions_and_removals() {
        let base: ArtifactSet = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        let mut next = base.clone();
        next.insert("a", "1!");
        next.remove("b");
        next.insert("d", "4");

        let changed = next.changed_since(&base);
        let ids: Vec<&str> = changed.iter().map(ArtifactId::as_str).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
    }

    #[test]
    fn adopt_copies_and_removes() {
        let base: ArtifactSet = [("a", "1"), ("b", "2")].into_iter().collect();
        let mut source = base.clone();
        source.insert("a", "changed");
        source.remove("b");

        let mut target = base.clone();
        target.adopt(&source, &source.changed_since(&base));
        assert_eq!(target, source);
    }
}
