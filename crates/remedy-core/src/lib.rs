//! Remedy core library
//!
//! Dependency-ordered, transactional remediation of detected issues. A run
//! groups related issues, orders each group by its inferred dependencies,
//! and drives every issue through impact analysis, simulation, application,
//! validation and, when validation fails, rollback.

pub mod adjacency;
pub mod apply;
pub mod batch;
pub mod cancel;
pub mod config;
mod deadline;
pub mod engine;
pub mod error;
pub mod graph;
pub mod grouping;
pub mod history;
pub mod impact;
pub mod metrics;
pub mod obs;
pub mod rollback;
pub mod scheduler;
pub mod simulator;
pub mod telemetry;
pub mod validate;

pub use adjacency::AdjacencyIndex;
pub use apply::{ApplyOutcome, ApplyRecord, TransactionalApplier};
pub use batch::{
    BatchResolver, Collaborators, GroupReport, GroupRisk, ResolutionRequest, RunOutput, RunResult,
};
pub use cancel::RunCancellation;
pub use config::ResolverConfig;
pub use engine::{
    GroupResolution, GroupResolver, IssueState, ResolutionEngine, ResolutionOutcome,
    ResolutionStatus,
};
pub use error::{RemedyError, Result};
pub use graph::{DependencyEdge, EdgeReason, GraphBuilder, IssueGraph};
pub use grouping::{GroupRelation, IssueGroup, IssueGrouper, RelationKind};
pub use history::{GroupTrace, HistoryStats, RunHistory, RunRecord, RunReservation};
pub use impact::{Impact, ImpactAnalyzer, ImpactKind, ImpactReport, ImpactSeverity};
pub use rollback::{RollbackEntry, RollbackManager};
pub use scheduler::{Schedule, Scheduler};
pub use simulator::{FixSimulator, Risk, Simulation};
pub use validate::PostApplyValidator;

pub use remedy_state::{
    ArtifactAdjacency, ArtifactId, ArtifactSet, Category, Classification, CollaboratorError,
    CollaboratorResult, FixId, FixPatch, FixProvenance, FixProvider, Issue, IssueId,
    IssueSeverity, Location, Mutator, ProposedFix, SnapshotHandle, ValidationReport, Validator,
};
