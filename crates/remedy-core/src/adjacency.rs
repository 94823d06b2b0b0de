//! Pre-fetched artifact adjacency.
//!
//! Graph building, impact analysis and grouping are pure functions over an
//! [`AdjacencyIndex`]. The index is filled once per issue set by querying the
//! [`ArtifactAdjacency`] collaborator, so every blocking lookup happens in
//! one place and under one deadline policy.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use futures::future::join_all;
use remedy_state::{ArtifactAdjacency, ArtifactId};
use tracing::warn;

use crate::deadline::with_deadline;

#[derive(Debug, Clone, Default)]
pub struct AdjacencyIndex {
    /// `artifact → artifacts importing it`
    dependents: HashMap<ArtifactId, Vec<ArtifactId>>,
    /// `artifact → artifacts it imports`
    depends_on: HashMap<ArtifactId, Vec<ArtifactId>>,
    unavailable: BTreeSet<ArtifactId>,
}

impl AdjacencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query `adjacency` for every distinct artifact in `artifacts`.
    ///
    /// Lookups run concurrently. An artifact whose lookup fails or exceeds
    /// `timeout` is recorded as unavailable instead of failing the caller.
    pub async fn collect<'a, I>(adjacency: &dyn ArtifactAdjacency, artifacts: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = &'a ArtifactId>,
    {
        let distinct: BTreeSet<&ArtifactId> = artifacts.into_iter().collect();

        let lookups = distinct.into_iter().map(|artifact| async move {
            let dependents =
                with_deadline("adjacency.dependents", timeout, adjacency.dependents(artifact)).await;
            let depends_on =
                with_deadline("adjacency.depends_on", timeout, adjacency.depends_on(artifact)).await;
            (artifact, dependents, depends_on)
        });

        let mut index = Self::new();
        for (artifact, dependents, depends_on) in join_all(lookups).await {
            match (dependents, depends_on) {
                (Ok(dependents), Ok(depends_on)) => {
                    index.record(artifact.clone(), dependents, depends_on);
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(artifact = %artifact, error = %e, "artifact adjacency unavailable");
                    index.unavailable.insert(artifact.clone());
                }
            }
        }
        index
    }

    /// Record both directions for `artifact`.
    ///
    /// Self references and repeats are dropped; first-seen order is kept.
    pub fn record(
        &mut self,
        artifact: ArtifactId,
        mut dependents: Vec<ArtifactId>,
        mut depends_on: Vec<ArtifactId>,
    ) {
        retain_distinct(&mut dependents, &artifact);
        retain_distinct(&mut depends_on, &artifact);
        self.dependents.insert(artifact.clone(), dependents);
        self.depends_on.insert(artifact, depends_on);
    }

    /// Artifacts importing `artifact`, as reported by the collaborator.
    pub fn dependents_of(&self, artifact: &ArtifactId) -> &[ArtifactId] {
        self.dependents
            .get(artifact)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `importer` statically depends on `imported`, from either side's record.
    pub fn imports(&self, importer: &ArtifactId, imported: &ArtifactId) -> bool {
        if importer == imported {
            return false;
        }
        self.depends_on
            .get(importer)
            .is_some_and(|deps| deps.contains(imported))
            || self
                .dependents
                .get(imported)
                .is_some_and(|deps| deps.contains(importer))
    }

    /// Import relation in either direction.
    pub fn adjacent(&self, a: &ArtifactId, b: &ArtifactId) -> bool {
        self.imports(a, b) || self.imports(b, a)
    }

    /// Whether the lookup for `artifact` failed.
    pub fn is_unavailable(&self, artifact: &ArtifactId) -> bool {
        self.unavailable.contains(artifact)
    }

    /// Every artifact whose lookup failed, sorted.
    pub fn unavailable(&self) -> impl Iterator<Item = &ArtifactId> {
        self.unavailable.iter()
    }
}

fn retain_distinct(ids: &mut Vec<ArtifactId>, owner: &ArtifactId) {
    let mut seen = HashSet::new();
    ids.retain(|id| id != owner && seen.insert(id.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_state::fakes::StaticAdjacency;

    fn id(s: &str) -> ArtifactId {
        ArtifactId::from(s)
    }

    #[tokio::test]
    async fn collect_indexes_each_artifact_once() {
        let adjacency = StaticAdjacency::new()
            .with_import("file2.js", "file1.js")
            .with_import("file3.js", "file2.js");
        let artifacts = vec![id("file1.js"), id("file2.js"), id("file1.js")];

        let index = AdjacencyIndex::collect(&adjacency, &artifacts, Duration::from_secs(1)).await;

        assert_eq!(index.dependents_of(&id("file1.js")), &[id("file2.js")]);
        assert!(index.imports(&id("file2.js"), &id("file1.js")));
        assert!(!index.imports(&id("file1.js"), &id("file2.js")));
        assert!(index.adjacent(&id("file1.js"), &id("file2.js")));
        // file3 was never queried, but file2's dependents list names it.
        assert!(index.imports(&id("file3.js"), &id("file2.js")));
    }

    #[tokio::test]
    async fn failed_lookup_marks_artifact_unavailable() {
        let adjacency = StaticAdjacency::new().with_unavailable("broken.js");
        let artifacts = vec![id("broken.js"), id("fine.js")];

        let index = AdjacencyIndex::collect(&adjacency, &artifacts, Duration::from_secs(1)).await;

        assert!(index.is_unavailable(&id("broken.js")));
        assert!(!index.is_unavailable(&id("fine.js")));
        assert!(index.dependents_of(&id("broken.js")).is_empty());
        assert_eq!(index.unavailable().count(), 1);
    }

    #[test]
    fn self_import_is_ignored() {
        let mut index = AdjacencyIndex::new();
        index.record(id("a"), vec![id("a"), id("b")], vec![id("a")]);
        assert_eq!(index.dependents_of(&id("a")), &[id("b")]);
        assert!(!index.imports(&id("a"), &id("a")));
    }

    #[test]
    fn record_drops_non_adjacent_repeats() {
        let mut index = AdjacencyIndex::new();
        index.record(
            id("a.js"),
            vec![id("b.js"), id("c.js"), id("b.js"), id("a.js")],
            vec![id("d.js"), id("e.js"), id("d.js")],
        );
        assert_eq!(index.dependents_of(&id("a.js")), &[id("b.js"), id("c.js")]);
        assert!(index.imports(&id("a.js"), &id("e.js")));
        assert_eq!(index.depends_on[&id("a.js")], vec![id("d.js"), id("e.js")]);
    }
}
