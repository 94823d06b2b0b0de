//! Cascading impact estimation for a candidate fix.

use std::collections::BTreeSet;
use std::fmt;

use remedy_state::{ArtifactId, FixId, Issue, IssueId};
use serde::{Deserialize, Serialize};

use crate::adjacency::AdjacencyIndex;
use crate::apply::ApplyRecord;

/// Ordered so that `max()` yields the worst severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for ImpactSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => f.write_str("low"),
            Self::Medium => f.write_str("medium"),
            Self::High => f.write_str("high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImpactKind {
    /// An artifact importing the issue's artifact may be affected.
    DependentArtifact { artifact: ArtifactId },
    /// A fix already applied in this group touched the same artifact.
    ConflictWithAppliedFix { fix_id: FixId, issue_id: IssueId },
    /// The issue was ordered by breaking a dependency cycle.
    CycleMember,
    /// Adjacency for the issue's artifact could not be determined.
    AdjacencyUnavailable { artifact: ArtifactId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impact {
    #[serde(flatten)]
    pub kind: ImpactKind,
    pub severity: ImpactSeverity,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub issue_id: IssueId,
    pub impacts: Vec<Impact>,
}

impl ImpactReport {
    /// Any impact at high severity.
    pub fn has_high_impact(&self) -> bool {
        self.impacts
            .iter()
            .any(|i| i.severity == ImpactSeverity::High)
    }

    /// Any impact at medium severity or above.
    pub fn has_medium_impact(&self) -> bool {
        self.impacts
            .iter()
            .any(|i| i.severity == ImpactSeverity::Medium)
    }

    /// Highest severity reported, `None` when there is no impact.
    pub fn max_severity(&self) -> Option<ImpactSeverity> {
        self.impacts.iter().map(|i| i.severity).max()
    }

    /// Impacts at `High` severity.
    pub fn high_impacts(&self) -> Vec<Impact> {
        self.impacts
            .iter()
            .filter(|i| i.severity == ImpactSeverity::High)
            .cloned()
            .collect()
    }
}

/// Pure impact analysis over pre-fetched adjacency.
pub struct ImpactAnalyzer<'a> {
    adjacency: &'a AdjacencyIndex,
    cycle_members: Option<&'a BTreeSet<IssueId>>,
    cycle_severity: ImpactSeverity,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(adjacency: &'a AdjacencyIndex) -> Self {
        Self {
            adjacency,
            cycle_members: None,
            cycle_severity: ImpactSeverity::Medium,
        }
    }

    /// Report an extra impact of `severity` for every issue in `members`.
    pub fn with_cycle_members(
        mut self,
        members: &'a BTreeSet<IssueId>,
        severity: ImpactSeverity,
    ) -> Self {
        self.cycle_members = Some(members);
        self.cycle_severity = severity;
        self
    }

    /// Estimate the impact of fixing `issue` given the fixes already applied.
    ///
    /// Only records still in the `applied` state are considered; rolled-back
    /// fixes no longer touch anything.
    pub fn analyze(&self, issue: &Issue, applied: &[ApplyRecord]) -> ImpactReport {
        let artifact = issue.artifact();
        let mut impacts = Vec::new();

        if self.adjacency.is_unavailable(artifact) {
            impacts.push(Impact {
                kind: ImpactKind::AdjacencyUnavailable {
                    artifact: artifact.clone(),
                },
                severity: ImpactSeverity::High,
                description: format!("dependents of {artifact} could not be determined"),
            });
        }

        for dependent in self.adjacency.dependents_of(artifact) {
            impacts.push(Impact {
                kind: ImpactKind::DependentArtifact {
                    artifact: dependent.clone(),
                },
                severity: ImpactSeverity::Medium,
                description: format!("{dependent} imports {artifact} and may be affected"),
            });
        }

        for record in applied
            .iter()
            .filter(|r| r.is_applied() && r.artifact == *artifact)
        {
            impacts.push(Impact {
                kind: ImpactKind::ConflictWithAppliedFix {
                    fix_id: record.fix_id.clone(),
                    issue_id: record.issue_id.clone(),
                },
                severity: ImpactSeverity::High,
                description: format!(
                    "fix {} for {} already modified {artifact}",
                    record.fix_id, record.issue_id
                ),
            });
        }

        if self
            .cycle_members
            .is_some_and(|members| members.contains(&issue.id))
        {
            impacts.push(Impact {
                kind: ImpactKind::CycleMember,
                severity: self.cycle_severity,
                description: "ordered by breaking a dependency cycle".to_string(),
            });
        }

        ImpactReport {
            issue_id: issue.id.clone(),
            impacts,
        }
    }
}
