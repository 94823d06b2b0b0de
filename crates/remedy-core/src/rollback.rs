//! Snapshot restoration with a one-shot guard per apply record.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use remedy_state::{ArtifactSet, FixId, IssueId, Mutator, StateError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::apply::{ApplyOutcome, ApplyRecord};
use crate::error::{RemedyError, Result};

/// Diagnostic log entry. Never replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEntry {
    pub record_id: String,
    pub issue_id: IssueId,
    pub fix_id: FixId,
    pub rolled_back_at: DateTime<Utc>,
}

pub struct RollbackManager {
    mutator: Arc<dyn Mutator>,
    history: Mutex<Vec<RollbackEntry>>,
}

impl RollbackManager {
    pub fn new(mutator: Arc<dyn Mutator>) -> Self {
        Self {
            mutator,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Restore the artifact set captured before `record` was applied.
    ///
    /// Fails with [`RemedyError::DoubleRollback`] unless `record` is still
    /// applied, and with [`RemedyError::Restore`] if the snapshot is gone or
    /// does not reproduce its digest. On either error `record` is unchanged.
    pub fn rollback(&self, record: &mut ApplyRecord) -> Result<ArtifactSet> {
        if record.outcome != ApplyOutcome::Applied {
            return Err(RemedyError::DoubleRollback {
                record_id: record.record_id.clone(),
                fix_id: record.fix_id.to_string(),
                outcome: record.outcome.to_string(),
            });
        }

        let restored = self
            .mutator
            .restore(&record.snapshot)
            .map_err(|source| RemedyError::Restore {
                record_id: record.record_id.clone(),
                source,
            })?;

        let actual = restored.digest();
        if actual != record.snapshot.digest {
            return Err(RemedyError::Restore {
                record_id: record.record_id.clone(),
                source: StateError::DigestMismatch {
                    snapshot_id: record.snapshot.id.to_string(),
                    expected: record.snapshot.digest.to_string(),
                    actual: actual.to_string(),
                },
            });
        }

        record.outcome = ApplyOutcome::RolledBack;
        self.mutator.release(&record.snapshot);
        let entry = RollbackEntry {
            record_id: record.record_id.clone(),
            issue_id: record.issue_id.clone(),
            fix_id: record.fix_id.clone(),
            rolled_back_at: Utc::now(),
        };
        info!(
            record_id = %entry.record_id,
            issue_id = %entry.issue_id,
            fix_id = %entry.fix_id,
            "apply record rolled back"
        );
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);

        Ok(restored)
    }

    /// Rollbacks performed so far, oldest first.
    pub fn history(&self) -> Vec<RollbackEntry> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Consume the manager, keeping its log.
    pub fn into_history(self) -> Vec<RollbackEntry> {
        self.history
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
