//! Collaborator contracts consumed by the remediation engine.
//!
//! These traits define everything the engine delegates:
//! - `ArtifactAdjacency`: which artifacts import which
//! - `FixProvider`: known-pattern or generated fix proposals
//! - `Mutator`: applies patches and captures/restores snapshots
//! - `Validator`: compile/test verdict over the current artifact set
//!
//! The async methods are the engine's only suspension points; callers wrap
//! them in a deadline. In-memory implementations live in `crate::fakes`.

use async_trait::async_trait;
use thiserror::Error;

use crate::artifact::{ArtifactId, ArtifactSet};
use crate::error::StateError;
use crate::model::{FixPatch, Issue, ProposedFix, ValidationReport};
use crate::snapshot::SnapshotHandle;

/// Result type for collaborator calls
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Failure of an external collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The collaborator failed or could not be reached.
    #[error("collaborator unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),

    /// The call did not complete within the caller's deadline.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// The collaborator refused the request (e.g. malformed patch).
    #[error("collaborator rejected request: {0}")]
    Rejected(String),
}

impl CollaboratorError {
    /// Wrap any error as an unavailable collaborator.
    pub fn unavailable(err: impl Into<anyhow::Error>) -> Self {
        Self::Unavailable(err.into())
    }

    /// Whether the call hit its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<StateError> for CollaboratorError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::InvalidPatch(detail) => Self::Rejected(detail),
            other => Self::Unavailable(other.into()),
        }
    }
}

/// Static import relationships between artifacts.
#[async_trait]
pub trait ArtifactAdjacency: Send + Sync {
    /// Artifacts that import `artifact`.
    async fn dependents(&self, artifact: &ArtifactId) -> CollaboratorResult<Vec<ArtifactId>>;

    /// Artifacts that `artifact` imports.
    async fn depends_on(&self, artifact: &ArtifactId) -> CollaboratorResult<Vec<ArtifactId>>;
}

/// Source of fix proposals.
///
/// Returning `Ok(None)` is the legitimate "no fix known" answer; errors are
/// reserved for provider failures.
#[async_trait]
pub trait FixProvider: Send + Sync {
    async fn propose(&self, issue: &Issue) -> CollaboratorResult<Option<ProposedFix>>;
}

/// Performs and reverses mutations of the artifact set.
#[async_trait]
pub trait Mutator: Send + Sync {
    /// Materialise `patch` over `artifacts`, returning the new set.
    async fn apply(&self, patch: &FixPatch, artifacts: ArtifactSet)
        -> CollaboratorResult<ArtifactSet>;

    /// Capture a restorable, independent copy of `artifacts`.
    fn snapshot(&self, artifacts: &ArtifactSet) -> SnapshotHandle;

    /// Return exactly the set captured by `handle`.
    fn restore(&self, handle: &SnapshotHandle) -> crate::Result<ArtifactSet>;

    /// Forget the snapshot behind `handle`; it will not be restored again.
    fn release(&self, _handle: &SnapshotHandle) {}
}

/// Compile/test verdict over the current artifact state.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn check(&self, artifacts: &ArtifactSet) -> CollaboratorResult<ValidationReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_displays_operation() {
        let err = CollaboratorError::Timeout {
            operation: "validator.check".to_string(),
            after_ms: 250,
        };
        assert!(err.is_timeout());
        let msg = err.to_string();
        assert!(msg.contains("validator.check"));
        assert!(msg.contains("250ms"));
    }

    #[test]
    fn invalid_patch_maps_to_rejected() {
        let err: CollaboratorError = StateError::InvalidPatch("bad op".to_string()).into();
        assert!(matches!(err, CollaboratorError::Rejected(ref d) if d == "bad op"));

        let err: CollaboratorError = StateError::ArtifactNotFound("x".to_string()).into();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }
}
