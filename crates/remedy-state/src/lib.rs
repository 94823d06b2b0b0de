//! Remedy-State: artifact state and collaborator contracts
//!
//! This crate holds everything the remediation engine shares with the
//! outside world:
//!
//! - `ArtifactSet`: the mutable artifact set, backed by a persistent map so
//!   that snapshots are cheap and never alias later mutations
//! - `SnapshotStore` / `SnapshotHandle`: restorable, digest-checked captures
//! - Collaborator traits (`ArtifactAdjacency`, `FixProvider`, `Mutator`,
//!   `Validator`) implemented outside the engine
//! - Issue and fix value types passed across those traits
//!
//! In-memory fakes for every collaborator live in the `fakes` module.

mod artifact;
pub mod collaborators;
mod error;
pub mod fakes;
mod model;
mod snapshot;

pub use artifact::{ArtifactId, ArtifactSet, ContentDigest};
pub use collaborators::{
    ArtifactAdjacency, CollaboratorError, CollaboratorResult, FixProvider, Mutator, Validator,
};
pub use error::StateError;
pub use model::{
    Category, Classification, FixId, FixPatch, FixProvenance, Issue, IssueId, IssueSeverity,
    Location, ProposedFix, ValidationReport,
};
pub use snapshot::{SnapshotHandle, SnapshotId, SnapshotStore};

/// Result type for remedy-state operations
pub type Result<T> = std::result::Result<T, StateError>;
