//! Resolver configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RemedyError, Result};
use crate::impact::ImpactSeverity;

/// Knobs for one resolver instance. Every field has a default, so a TOML
/// file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Number of issue groups resolved concurrently. `1` is fully sequential.
    pub workers: usize,

    /// Deadline applied to every collaborator call.
    pub collaborator_timeout_ms: u64,

    /// Accept fixes whose provenance is `generated` when nothing else is risky.
    pub allow_generated_fixes: bool,

    /// Proposals scoring below this are skipped.
    pub min_safety_score: f32,

    /// Impact severity attached to issues ordered by cycle breaking.
    pub cycle_member_severity: ImpactSeverity,

    /// Groups touching more artifacts than this carry a medium risk note.
    pub group_artifact_fanout_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            collaborator_timeout_ms: 30_000,
            allow_generated_fixes: false,
            min_safety_score: 0.0,
            cycle_member_severity: ImpactSeverity::Medium,
            group_artifact_fanout_limit: 5,
        }
    }
}

impl ResolverConfig {
    /// Deadline applied to every collaborator call.
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    /// Reject zero workers, a zero timeout and out-of-range scores.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(RemedyError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.collaborator_timeout_ms == 0 {
            return Err(RemedyError::InvalidConfig(
                "collaborator_timeout_ms must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_safety_score) {
            return Err(RemedyError::InvalidConfig(format!(
                "min_safety_score must be within [0, 1], got {}",
                self.min_safety_score
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML config file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
