//! Pre-apply safety decision.

use std::time::Duration;

use remedy_state::{
    CollaboratorError, CollaboratorResult, FixId, FixProvenance, FixProvider, Issue, ProposedFix,
};
use serde::{Deserialize, Serialize};

use crate::config::ResolverConfig;
use crate::deadline::with_deadline;
use crate::impact::{Impact, ImpactReport};

/// Reason a fix is not attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "risk", rename_all = "snake_case")]
pub enum Risk {
    HighImpact { impacts: Vec<Impact> },
    NoFixAvailable,
    /// Only a generated fix exists and generated fixes are not accepted.
    UnknownFix { fix_id: FixId },
    LowSafetyScore { fix_id: FixId, score: f32, minimum: f32 },
}

impl Risk {
    /// Human-readable risk summary.
    pub fn description(&self) -> String {
        match self {
            Risk::HighImpact { impacts } => {
                let details: Vec<&str> = impacts.iter().map(|i| i.description.as_str()).collect();
                format!("high impact: {}", details.join("; "))
            }
            Risk::NoFixAvailable => "no fix available for this issue".to_string(),
            Risk::UnknownFix { fix_id } => {
                format!("fix {fix_id} is generated, not a known pattern")
            }
            Risk::LowSafetyScore {
                fix_id,
                score,
                minimum,
            } => format!("fix {fix_id} safety score {score:.2} is below {minimum:.2}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub is_safe: bool,
    pub risks: Vec<Risk>,
    pub proposed_fix: Option<ProposedFix>,
}

impl Simulation {
    fn unsafe_with(risks: Vec<Risk>, proposed_fix: Option<ProposedFix>) -> Self {
        Self {
            is_safe: false,
            risks,
            proposed_fix,
        }
    }

    /// Risks joined for an outcome reason.
    pub fn reason(&self) -> String {
        let parts: Vec<String> = self.risks.iter().map(Risk::description).collect();
        parts.join("; ")
    }
}

/// Decides whether a proposed fix is safe to attempt.
#[derive(Debug, Clone)]
pub struct FixSimulator {
    allow_generated: bool,
    min_safety_score: f32,
    timeout: Duration,
}

impl FixSimulator {
    /// Simulator honouring the config's fix acceptance policy.
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            allow_generated: config.allow_generated_fixes,
            min_safety_score: config.min_safety_score,
            timeout: config.collaborator_timeout(),
        }
    }

    /// Simulate fixing `issue`.
    ///
    /// High impact short-circuits before the provider is consulted. Provider
    /// failures and timeouts are returned as errors, not as risks.
    pub async fn simulate(
        &self,
        issue: &Issue,
        report: &ImpactReport,
        provider: &dyn FixProvider,
    ) -> CollaboratorResult<Simulation> {
        if report.has_high_impact() {
            return Ok(Simulation::unsafe_with(
                vec![Risk::HighImpact {
                    impacts: report.high_impacts(),
                }],
                None,
            ));
        }

        let proposal = with_deadline("fix_provider.propose", self.timeout, provider.propose(issue))
            .await?;
        let Some(fix) = proposal else {
            return Ok(Simulation::unsafe_with(vec![Risk::NoFixAvailable], None));
        };
        if fix.issue_id != issue.id {
            return Err(CollaboratorError::Rejected(format!(
                "fix {} targets {} instead of {}",
                fix.id, fix.issue_id, issue.id
            )));
        }

        let mut risks = Vec::new();
        if fix.provenance == FixProvenance::Generated && !self.allow_generated {
            risks.push(Risk::UnknownFix {
                fix_id: fix.id.clone(),
            });
        }
        if fix.safety_score < self.min_safety_score {
            risks.push(Risk::LowSafetyScore {
                fix_id: fix.id.clone(),
                score: fix.safety_score,
                minimum: self.min_safety_score,
            });
        }

        Ok(Simulation {
            is_safe: risks.is_empty(),
            risks,
            proposed_fix: Some(fix),
        })
    }
}
