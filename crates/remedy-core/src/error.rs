//! Error taxonomy for the remediation engine.
//!
//! Only invariant violations surface as `RemedyError` from a run. Failures
//! local to one issue (unsafe fix, failed validation, collaborator outage)
//! are recorded in that issue's outcome and never abort the run.

use remedy_state::{IssueId, StateError};

#[derive(Debug, thiserror::Error)]
pub enum RemedyError {
    #[error("double rollback of apply record {record_id} (fix {fix_id}): outcome is already {outcome}")]
    DoubleRollback {
        record_id: String,
        fix_id: String,
        outcome: String,
    },

    #[error("issue graph references unknown issue: {0}")]
    UnknownIssue(IssueId),

    #[error("rollback of apply record {record_id} could not restore its snapshot: {source}")]
    Restore {
        record_id: String,
        #[source]
        source: StateError,
    },

    #[error("invalid resolution request: {0}")]
    InvalidRequest(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("group worker failed: {0}")]
    Worker(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for remediation engine operations.
pub type Result<T> = std::result::Result<T, RemedyError>;
