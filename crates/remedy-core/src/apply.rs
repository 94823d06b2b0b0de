//! Transactional fix application.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use remedy_state::{
    ArtifactId, ArtifactSet, CollaboratorResult, FixId, FixProvenance, Issue, IssueId, Mutator,
    ProposedFix, SnapshotHandle,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::deadline::with_deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    RolledBack,
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("applied"),
            Self::RolledBack => f.write_str("rolled_back"),
        }
    }
}

/// One applied fix and the snapshot that undoes it.
///
/// `outcome` moves from `Applied` to `RolledBack` at most once, and only
/// through [`crate::RollbackManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRecord {
    pub record_id: String,
    pub fix_id: FixId,
    pub issue_id: IssueId,
    /// Artifact the fixed issue is located in.
    pub artifact: ArtifactId,
    pub provenance: FixProvenance,
    pub applied_at: DateTime<Utc>,
    pub snapshot: SnapshotHandle,
    pub(crate) outcome: ApplyOutcome,
}

impl ApplyRecord {
    /// Current state of the record.
    pub fn outcome(&self) -> ApplyOutcome {
        self.outcome
    }

    /// True until the record is rolled back.
    pub fn is_applied(&self) -> bool {
        self.outcome == ApplyOutcome::Applied
    }
}

/// Snapshots the artifact set, then delegates the patch to the [`Mutator`].
pub struct TransactionalApplier {
    mutator: Arc<dyn Mutator>,
    timeout: Duration,
}

impl TransactionalApplier {
    /// Applier bounding each mutator call by `timeout`.
    pub fn new(mutator: Arc<dyn Mutator>, timeout: Duration) -> Self {
        Self { mutator, timeout }
    }

    /// Apply `fix` to `artifacts`.
    ///
    /// The snapshot is captured before the mutator runs. On mutator failure
    /// no record is produced, the snapshot is released and the caller's set
    /// is untouched.
    pub async fn apply(
        &self,
        issue: &Issue,
        fix: &ProposedFix,
        artifacts: &ArtifactSet,
    ) -> CollaboratorResult<(ApplyRecord, ArtifactSet)> {
        let snapshot = self.mutator.snapshot(artifacts);
        debug!(
            issue_id = %issue.id,
            fix_id = %fix.id,
            snapshot_id = %snapshot.id,
            "applying fix"
        );

        let updated = match with_deadline(
            "mutator.apply",
            self.timeout,
            self.mutator.apply(&fix.patch, artifacts.clone()),
        )
        .await
        {
            Ok(updated) => updated,
            Err(e) => {
                self.mutator.release(&snapshot);
                return Err(e);
            }
        };

        let record = ApplyRecord {
            record_id: format!("apply-{}", Uuid::new_v4()),
            fix_id: fix.id.clone(),
            issue_id: issue.id.clone(),
            artifact: issue.artifact().clone(),
            provenance: fix.provenance,
            applied_at: Utc::now(),
            snapshot,
            outcome: ApplyOutcome::Applied,
        };
        Ok((record, updated))
    }
}
