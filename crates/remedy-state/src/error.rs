//! Error types for remedy-state

use thiserror::Error;

/// Errors raised while capturing or restoring artifact state
#[derive(Error, Debug)]
pub enum StateError {
    /// Snapshot handle does not refer to a stored snapshot
    #[error("snapshot not found: {snapshot_id}")]
    SnapshotNotFound { snapshot_id: String },

    /// Restored state does not hash to the digest recorded at capture time
    #[error("snapshot {snapshot_id} digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        snapshot_id: String,
        expected: String,
        actual: String,
    },

    /// Artifact is not part of the set
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Patch payload could not be interpreted
    #[error("invalid patch payload: {0}")]
    InvalidPatch(String),
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::InvalidPatch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_mismatch_displays_both_digests() {
        let err = StateError::DigestMismatch {
            snapshot_id: "snap-1".to_string(),
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("snap-1"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn json_error_maps_to_invalid_patch() {
        let err: StateError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, StateError::InvalidPatch(_)));
    }
}
