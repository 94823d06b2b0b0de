//! Interprets the validation collaborator's verdict.

use std::sync::Arc;
use std::time::Duration;

use remedy_state::{ArtifactSet, ValidationReport, Validator};
use tracing::warn;

use crate::apply::ApplyRecord;
use crate::deadline::with_deadline;

pub struct PostApplyValidator {
    validator: Arc<dyn Validator>,
    timeout: Duration,
}

impl PostApplyValidator {
    /// Validator wrapper bounding each check by `timeout`.
    pub fn new(validator: Arc<dyn Validator>, timeout: Duration) -> Self {
        Self { validator, timeout }
    }

    /// Check the artifact state produced by `record`.
    ///
    /// Never fails: an unreachable or timed-out validator yields a failed
    /// report, and any reported error forces `success = false`.
    pub async fn validate(&self, record: &ApplyRecord, artifacts: &ArtifactSet) -> ValidationReport {
        match with_deadline("validator.check", self.timeout, self.validator.check(artifacts)).await {
            Ok(mut report) => {
                if !report.errors.is_empty() {
                    report.success = false;
                }
                report
            }
            Err(e) => {
                warn!(
                    record_id = %record.record_id,
                    issue_id = %record.issue_id,
                    error = %e,
                    "validation did not complete"
                );
                ValidationReport::failed(vec![e.to_string()])
            }
        }
    }
}
