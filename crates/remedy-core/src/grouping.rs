//! Single-pass clustering of related issues.

use std::collections::BTreeSet;

use remedy_state::{ArtifactId, Category, Issue, IssueId};
use serde::{Deserialize, Serialize};

use crate::adjacency::AdjacencyIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    SameCategory,
    SameArtifact,
    ArtifactAdjacency,
}

/// Why `member` was absorbed into the group seeded by `seed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRelation {
    pub seed: IssueId,
    pub member: IssueId,
    pub kinds: Vec<RelationKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueGroup {
    pub id: String,
    /// Seed first, then absorbed members in input order.
    pub issues: Vec<Issue>,
    /// Set when every member has the same category.
    pub shared_category: Option<Category>,
    pub relations: Vec<GroupRelation>,
}

impl IssueGroup {
    /// Member ids, seed first.
    pub fn issue_ids(&self) -> Vec<IssueId> {
        self.issues.iter().map(|i| i.id.clone()).collect()
    }

    /// Distinct artifacts touched by the group's issues.
    pub fn artifacts(&self) -> BTreeSet<ArtifactId> {
        self.issues.iter().map(|i| i.artifact().clone()).collect()
    }

    /// Number of member issues.
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// True for a group without members.
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

pub struct IssueGrouper<'a> {
    adjacency: &'a AdjacencyIndex,
}

impl<'a> IssueGrouper<'a> {
    pub fn new(adjacency: &'a AdjacencyIndex) -> Self {
        Self { adjacency }
    }

    /// Relation kinds linking `a` and `b`. Symmetric; empty when unrelated.
    pub fn relation(&self, a: &Issue, b: &Issue) -> Vec<RelationKind> {
        let mut kinds = Vec::new();
        if a.category() == b.category() && a.category().is_known() {
            kinds.push(RelationKind::SameCategory);
        }
        if a.artifact() == b.artifact() {
            kinds.push(RelationKind::SameArtifact);
        } else if self.adjacency.adjacent(a.artifact(), b.artifact()) {
            kinds.push(RelationKind::ArtifactAdjacency);
        }
        kinds
    }

    /// Partition `issues` into groups.
    ///
    /// Each ungrouped issue, in input order, seeds a group and absorbs every
    /// later ungrouped issue related to the seed. Relations are checked
    /// against the seed only, so the result is reproducible rather than a
    /// transitive closure.
    pub fn group(&self, issues: &[Issue]) -> Vec<IssueGroup> {
        let mut grouped = vec![false; issues.len()];
        let mut groups = Vec::new();

        for (i, seed) in issues.iter().enumerate() {
            if grouped[i] {
                continue;
            }
            grouped[i] = true;
            let mut members = vec![seed.clone()];
            let mut relations = Vec::new();

            for (j, candidate) in issues.iter().enumerate().skip(i + 1) {
                if grouped[j] {
                    continue;
                }
                let kinds = self.relation(seed, candidate);
                if kinds.is_empty() {
                    continue;
                }
                grouped[j] = true;
                relations.push(GroupRelation {
                    seed: seed.id.clone(),
                    member: candidate.id.clone(),
                    kinds,
                });
                members.push(candidate.clone());
            }

            let shared_category = members
                .iter()
                .all(|m| m.category() == seed.category())
                .then(|| seed.category());

            groups.push(IssueGroup {
                id: format!("group-{}", groups.len() + 1),
                issues: members,
                shared_category,
                relations,
            });
        }

        groups
    }
}
