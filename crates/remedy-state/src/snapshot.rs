//! Restorable captures of an artifact set.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::artifact::{ArtifactSet, ContentDigest};
use crate::error::StateError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    pub fn new() -> Self {
        Self(format!("snap-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle to a captured artifact set.
///
/// The digest is computed at capture time so a restore can prove it is exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHandle {
    pub id: SnapshotId,
    pub digest: ContentDigest,
    pub artifact_count: usize,
}

/// In-process snapshot storage usable by any `Mutator` implementation.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: Mutex<HashMap<SnapshotId, ArtifactSet>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `artifacts`. The stored copy shares structure with the input
    /// but is unaffected by any later mutation of it.
    pub fn capture(&self, artifacts: &ArtifactSet) -> SnapshotHandle {
        let handle = SnapshotHandle {
            id: SnapshotId::new(),
            digest: artifacts.digest(),
            artifact_count: artifacts.len(),
        };
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id.clone(), artifacts.clone());
        debug!(
            snapshot_id = %handle.id,
            digest = %handle.digest.short(),
            artifacts = handle.artifact_count,
            "snapshot captured"
        );
        handle
    }

    /// Return the captured set, verifying it still hashes to the handle's digest.
    pub fn restore(&self, handle: &SnapshotHandle) -> Result<ArtifactSet> {
        let snapshots = self.snapshots.lock().unwrap_or_else(PoisonError::into_inner);
        let restored = snapshots
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| StateError::SnapshotNotFound {
                snapshot_id: handle.id.to_string(),
            })?;
        let actual = restored.digest();
        if actual != handle.digest {
            warn!(snapshot_id = %handle.id, "restored snapshot does not match its digest");
            return Err(StateError::DigestMismatch {
                snapshot_id: handle.id.to_string(),
                expected: handle.digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(restored)
    }

    /// Drop the stored copy behind `handle`. Returns whether one was held.
    pub fn release(&self, handle: &SnapshotHandle) -> bool {
        let released = self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id)
            .is_some();
        if released {
            debug!(snapshot_id = %handle.id, "snapshot released");
        }
        released
    }

    /// Number of snapshots currently held.
    pub fn len(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when no snapshot is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
