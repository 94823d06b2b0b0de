//! Per-group resolution state machine.
//!
//! For each group: build the issue graph, schedule it, then drive every issue
//! through `pending → impact-analyzed → simulated → applied → validated →
//! resolved`, branching to `skipped` when the simulator refuses the fix and
//! to `validation-failed → rolled-back → failed` when validation rejects it.
//! Issues of one group are strictly sequential: each impact analysis sees the
//! fixes committed by the issues before it.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use remedy_state::{
    ArtifactSet, FixProvider, Issue, IssueId, Mutator, ValidationReport, Validator,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::adjacency::AdjacencyIndex;
use crate::apply::{ApplyRecord, TransactionalApplier};
use crate::cancel::RunCancellation;
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::graph::{DependencyEdge, GraphBuilder};
use crate::grouping::IssueGroup;
use crate::impact::{ImpactAnalyzer, ImpactReport};
use crate::metrics::METRICS;
use crate::obs;
use crate::rollback::{RollbackEntry, RollbackManager};
use crate::scheduler::Scheduler;
use crate::simulator::{FixSimulator, Risk};
use crate::validate::PostApplyValidator;

/// States an issue passes through. The last entry of a trail is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Pending,
    ImpactAnalyzed,
    Simulated,
    Applied,
    Validated,
    ValidationFailed,
    RolledBack,
    Resolved,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    Failed,
    Skipped,
}

/// Definite status of one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub issue_id: IssueId,
    pub status: ResolutionStatus,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<Risk>,
    /// Present once a fix was applied; rolled back when `status` is `Failed`.
    pub apply_record: Option<ApplyRecord>,
    pub validation: Option<ValidationReport>,
    /// Collaborator error, when one caused the failure.
    pub error: Option<String>,
    pub cycle_broken: bool,
    pub trail: Vec<IssueState>,
}

impl ResolutionOutcome {
    fn new(issue: &Issue, status: ResolutionStatus, reason: String, trail: Vec<IssueState>) -> Self {
        Self {
            issue_id: issue.id.clone(),
            status,
            reason,
            risks: Vec::new(),
            apply_record: None,
            validation: None,
            error: None,
            cycle_broken: false,
            trail,
        }
    }

    /// True for the resolved status.
    pub fn is_resolved(&self) -> bool {
        self.status == ResolutionStatus::Resolved
    }
}

/// Everything one group's resolution produced.
#[derive(Debug, Clone)]
pub struct GroupResolution {
    pub group_id: String,
    /// In schedule order.
    pub outcomes: Vec<ResolutionOutcome>,
    /// Records of resolved issues, still applied.
    pub applied_fixes: Vec<ApplyRecord>,
    pub rollbacks: Vec<RollbackEntry>,
    /// Artifact state after the last issue.
    pub artifacts: ArtifactSet,
    pub edges: Vec<DependencyEdge>,
    pub cycle_broken: BTreeSet<IssueId>,
    pub impact_reports: Vec<ImpactReport>,
}

/// Resolves one issue group over an exclusively owned artifact set.
///
/// The batch layer is handed an implementation at construction time, so it
/// never needs to know which engine it drives.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn resolve_group(
        &self,
        run_id: &str,
        group: &IssueGroup,
        adjacency: &AdjacencyIndex,
        artifacts: ArtifactSet,
        cancel: &RunCancellation,
    ) -> Result<GroupResolution>;
}

pub struct ResolutionEngine {
    fix_provider: Arc<dyn FixProvider>,
    mutator: Arc<dyn Mutator>,
    simulator: FixSimulator,
    applier: TransactionalApplier,
    validator: PostApplyValidator,
    config: ResolverConfig,
}

impl ResolutionEngine {
    pub fn new(
        config: ResolverConfig,
        fix_provider: Arc<dyn FixProvider>,
        mutator: Arc<dyn Mutator>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        let timeout = config.collaborator_timeout();
        Self {
            fix_provider,
            simulator: FixSimulator::from_config(&config),
            applier: TransactionalApplier::new(Arc::clone(&mutator), timeout),
            validator: PostApplyValidator::new(validator, timeout),
            mutator,
            config,
        }
    }

    /// Configuration the engine was built with.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve `group` sequentially in schedule order.
    ///
    /// Returns `Err` only for invariant violations (unknown graph node,
    /// double rollback, inexact restore). Cancellation marks every issue not
    /// yet started as skipped.
    #[instrument(skip_all, fields(run_id = %run_id, group_id = %group.id))]
    pub async fn resolve(
        &self,
        run_id: &str,
        group: &IssueGroup,
        adjacency: &AdjacencyIndex,
        artifacts: ArtifactSet,
        cancel: &RunCancellation,
    ) -> Result<GroupResolution> {
        let graph = GraphBuilder::new(adjacency).build(&group.issues)?;
        let schedule = Scheduler::order(&graph);
        obs::emit_group_scheduled(run_id, &group.id, schedule.order.len(), schedule.cycle_broken.len());

        let analyzer = ImpactAnalyzer::new(adjacency)
            .with_cycle_members(&schedule.cycle_broken, self.config.cycle_member_severity);
        let rollbacks = RollbackManager::new(Arc::clone(&self.mutator));

        let mut artifacts = artifacts;
        let mut applied: Vec<ApplyRecord> = Vec::new();
        let mut outcomes = Vec::with_capacity(schedule.order.len());
        let mut impact_reports = Vec::with_capacity(schedule.order.len());

        for issue in &schedule.order {
            let mut outcome = if cancel.is_cancelled() {
                ResolutionOutcome::new(
                    issue,
                    ResolutionStatus::Skipped,
                    "run cancelled before this issue was scheduled".to_string(),
                    vec![IssueState::Pending, IssueState::Skipped],
                )
            } else {
                let report = analyzer.analyze(issue, &applied);
                debug!(issue_id = %issue.id, impacts = report.impacts.len(), "impact analyzed");
                let step = self
                    .resolve_issue(issue, &report, &mut artifacts, &rollbacks)
                    .await?;
                impact_reports.push(report);
                if let Some(record) = step.apply_record.as_ref().filter(|r| r.is_applied()) {
                    applied.push(record.clone());
                }
                step
            };
            outcome.cycle_broken = schedule.is_cycle_broken(&issue.id);
            record_outcome(run_id, &outcome);
            outcomes.push(outcome);
        }

        // the group is closed; no record of it can be rolled back any more
        for record in &applied {
            self.mutator.release(&record.snapshot);
        }

        Ok(GroupResolution {
            group_id: group.id.clone(),
            outcomes,
            applied_fixes: applied,
            rollbacks: rollbacks.into_history(),
            artifacts,
            edges: graph.edges().to_vec(),
            cycle_broken: schedule.cycle_broken,
            impact_reports,
        })
    }

    /// Simulate, apply, validate and, on failure, roll back one issue.
    ///
    /// `artifacts` only advances when validation succeeds.
    async fn resolve_issue(
        &self,
        issue: &Issue,
        report: &ImpactReport,
        artifacts: &mut ArtifactSet,
        rollbacks: &RollbackManager,
    ) -> Result<ResolutionOutcome> {
        let mut trail = vec![IssueState::Pending, IssueState::ImpactAnalyzed];

        let simulation = match self
            .simulator
            .simulate(issue, report, self.fix_provider.as_ref())
            .await
        {
            Ok(simulation) => simulation,
            Err(e) => {
                trail.push(IssueState::Failed);
                let mut outcome = ResolutionOutcome::new(
                    issue,
                    ResolutionStatus::Failed,
                    format!("fix provider failed: {e}"),
                    trail,
                );
                outcome.error = Some(e.to_string());
                return Ok(outcome);
            }
        };
        trail.push(IssueState::Simulated);

        let fix = match simulation.proposed_fix {
            Some(ref fix) if simulation.is_safe => fix.clone(),
            _ => {
                trail.push(IssueState::Skipped);
                let mut outcome = ResolutionOutcome::new(
                    issue,
                    ResolutionStatus::Skipped,
                    simulation.reason(),
                    trail,
                );
                outcome.risks = simulation.risks;
                return Ok(outcome);
            }
        };

        let (mut record, updated) = match self.applier.apply(issue, &fix, artifacts).await {
            Ok(applied) => applied,
            Err(e) => {
                trail.push(IssueState::Failed);
                let mut outcome = ResolutionOutcome::new(
                    issue,
                    ResolutionStatus::Failed,
                    format!("fix {} could not be applied: {e}", fix.id),
                    trail,
                );
                outcome.error = Some(e.to_string());
                return Ok(outcome);
            }
        };
        trail.push(IssueState::Applied);

        let validation = self.validator.validate(&record, &updated).await;
        if validation.success {
            *artifacts = updated;
            trail.extend([IssueState::Validated, IssueState::Resolved]);
            let mut outcome = ResolutionOutcome::new(
                issue,
                ResolutionStatus::Resolved,
                format!("fix {} applied and validated", fix.id),
                trail,
            );
            outcome.apply_record = Some(record);
            outcome.validation = Some(validation);
            return Ok(outcome);
        }

        trail.push(IssueState::ValidationFailed);
        *artifacts = rollbacks.rollback(&mut record)?;
        METRICS.inc_rollbacks();
        trail.extend([IssueState::RolledBack, IssueState::Failed]);

        let mut outcome = ResolutionOutcome::new(
            issue,
            ResolutionStatus::Failed,
            format!(
                "validation failed for fix {}: {}",
                fix.id,
                validation.errors.join("; ")
            ),
            trail,
        );
        outcome.apply_record = Some(record);
        outcome.validation = Some(validation);
        Ok(outcome)
    }
}

#[async_trait]
impl GroupResolver for ResolutionEngine {
    async fn resolve_group(
        &self,
        run_id: &str,
        group: &IssueGroup,
        adjacency: &AdjacencyIndex,
        artifacts: ArtifactSet,
        cancel: &RunCancellation,
    ) -> Result<GroupResolution> {
        self.resolve(run_id, group, adjacency, artifacts, cancel).await
    }
}

fn record_outcome(run_id: &str, outcome: &ResolutionOutcome) {
    let issue_id = outcome.issue_id.as_str();
    match outcome.status {
        ResolutionStatus::Resolved => {
            METRICS.inc_resolved();
            let fix_id = outcome
                .apply_record
                .as_ref()
                .map(|r| r.fix_id.as_str())
                .unwrap_or_default();
            obs::emit_issue_resolved(run_id, issue_id, fix_id);
        }
        ResolutionStatus::Skipped => {
            METRICS.inc_skipped();
            obs::emit_issue_skipped(run_id, issue_id, &outcome.reason);
        }
        ResolutionStatus::Failed => {
            METRICS.inc_failed();
            if let Some(record) = outcome.apply_record.as_ref().filter(|r| !r.is_applied()) {
                obs::emit_rollback(run_id, issue_id, &record.record_id);
            }
            obs::emit_issue_failed(run_id, issue_id, &outcome.reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::ApplyOutcome;
    use crate::grouping::IssueGrouper;
    use remedy_state::fakes::{EditTemplate, MemoryMutator, PatternFixProvider, ScriptedValidator};
    use remedy_state::{ArtifactId, Category};

    fn engine(provider: PatternFixProvider, validator: ScriptedValidator) -> ResolutionEngine {
        ResolutionEngine::new(
            ResolverConfig::default(),
            Arc::new(provider),
            Arc::new(MemoryMutator::new()),
            Arc::new(validator),
        )
    }

    fn single_group(issues: Vec<Issue>) -> IssueGroup {
        IssueGroup {
            id: "group-1".to_string(),
            issues,
            shared_category: None,
            relations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn resolved_issue_walks_full_trail() {
        let engine = engine(
            PatternFixProvider::new().known(Category::Syntax, EditTemplate::Append("\n".into())),
            ScriptedValidator::always_pass(),
        );
        let artifacts: ArtifactSet = [("a.js", "a=1;")].into_iter().collect();
        let group = single_group(vec![Issue::new("e1", "m", Category::Syntax, "a.js")]);

        let resolution = engine
            .resolve("run-t", &group, &AdjacencyIndex::new(), artifacts, &RunCancellation::new())
            .await
            .unwrap();

        let outcome = &resolution.outcomes[0];
        assert!(outcome.is_resolved());
        assert_eq!(
            outcome.trail,
            vec![
                IssueState::Pending,
                IssueState::ImpactAnalyzed,
                IssueState::Simulated,
                IssueState::Applied,
                IssueState::Validated,
                IssueState::Resolved,
            ]
        );
        assert_eq!(resolution.applied_fixes.len(), 1);
        assert_eq!(resolution.artifacts.get("a.js"), Some("a=1;\n"));
    }

    #[tokio::test]
    async fn closed_group_holds_no_snapshots() {
        let mutator = Arc::new(MemoryMutator::new());
        let engine = ResolutionEngine::new(
            ResolverConfig::default(),
            Arc::new(
                PatternFixProvider::new()
                    .known(Category::Syntax, EditTemplate::Append(";".into()))
                    .known(Category::Type, EditTemplate::Append(" bad".into())),
            ),
            mutator.clone(),
            Arc::new(ScriptedValidator::reject_containing(" bad")),
        );
        let artifacts: ArtifactSet = [("a.js", "a=1"), ("b.ts", "b")].into_iter().collect();
        let group = single_group(vec![
            Issue::new("e1", "m", Category::Syntax, "a.js"),
            Issue::new("e2", "m", Category::Type, "b.ts"),
        ]);

        let resolution = engine
            .resolve("run-t", &group, &AdjacencyIndex::new(), artifacts, &RunCancellation::new())
            .await
            .unwrap();

        assert_eq!(resolution.applied_fixes.len(), 1);
        assert_eq!(resolution.rollbacks.len(), 1);
        assert_eq!(mutator.applied(), 2);
        assert_eq!(mutator.snapshot_count(), 0);
    }

    #[tokio::test]
    async fn failed_validation_rolls_back() {
        let engine = engine(
            PatternFixProvider::new()
                .known(Category::Syntax, EditTemplate::Append(" bad syntax".into())),
            ScriptedValidator::reject_containing("bad syntax"),
        );
        let artifacts: ArtifactSet = [("a.js", "a=1;")].into_iter().collect();
        let group = single_group(vec![Issue::new("e1", "m", Category::Syntax, "a.js")]);

        let resolution = engine
            .resolve("run-t", &group, &AdjacencyIndex::new(), artifacts, &RunCancellation::new())
            .await
            .unwrap();

        let outcome = &resolution.outcomes[0];
        assert_eq!(outcome.status, ResolutionStatus::Failed);
        assert_eq!(
            outcome.trail[3..],
            [
                IssueState::Applied,
                IssueState::ValidationFailed,
                IssueState::RolledBack,
                IssueState::Failed,
            ]
        );
        assert_eq!(
            outcome.apply_record.as_ref().map(ApplyRecord::outcome),
            Some(ApplyOutcome::RolledBack)
        );
        assert_eq!(resolution.artifacts.get("a.js"), Some("a=1;"));
        assert_eq!(resolution.rollbacks.len(), 1);
        assert!(resolution.applied_fixes.is_empty());
    }

    #[tokio::test]
    async fn second_fix_on_same_artifact_is_skipped_as_conflict() {
        let engine = engine(
            PatternFixProvider::new()
                .known(Category::Syntax, EditTemplate::Append(";".into()))
                .known(Category::Type, EditTemplate::Append(";".into())),
            ScriptedValidator::always_pass(),
        );
        let artifacts: ArtifactSet = [("a.js", "a=1")].into_iter().collect();
        let group = single_group(vec![
            Issue::new("e1", "m", Category::Syntax, "a.js"),
            Issue::new("e2", "m", Category::Type, "a.js"),
        ]);

        let resolution = engine
            .resolve("run-t", &group, &AdjacencyIndex::new(), artifacts, &RunCancellation::new())
            .await
            .unwrap();

        assert!(resolution.outcomes[0].is_resolved());
        let second = &resolution.outcomes[1];
        assert_eq!(second.status, ResolutionStatus::Skipped);
        assert!(matches!(second.risks[0], Risk::HighImpact { .. }));
        assert_eq!(resolution.impact_reports.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_run_skips_everything_not_started() {
        let engine = engine(
            PatternFixProvider::new().known(Category::Syntax, EditTemplate::Append(";".into())),
            ScriptedValidator::always_pass(),
        );
        let cancel = RunCancellation::new();
        cancel.cancel();
        let group = single_group(vec![
            Issue::new("e1", "m", Category::Syntax, "a.js"),
            Issue::new("e2", "m", Category::Syntax, "b.js"),
        ]);

        let resolution = engine
            .resolve("run-t", &group, &AdjacencyIndex::new(), ArtifactSet::new(), &cancel)
            .await
            .unwrap();
        assert!(resolution
            .outcomes
            .iter()
            .all(|o| o.status == ResolutionStatus::Skipped));
        assert!(resolution.impact_reports.is_empty());
    }

    #[tokio::test]
    async fn schedule_follows_import_direction() {
        let engine = engine(
            PatternFixProvider::new()
                .known(Category::Syntax, EditTemplate::Append("\n".into()))
                .known(Category::Type, EditTemplate::Append("\n".into())),
            ScriptedValidator::always_pass(),
        );
        let mut index = AdjacencyIndex::new();
        index.record(
            ArtifactId::from("file2.js"),
            Vec::new(),
            vec![ArtifactId::from("file1.js")],
        );
        let issues = vec![
            Issue::new("Y", "m", Category::Type, "file2.js"),
            Issue::new("X", "m", Category::Syntax, "file1.js"),
        ];
        let group = IssueGrouper::new(&index).group(&issues).remove(0);
        let artifacts: ArtifactSet = [("file1.js", "x"), ("file2.js", "y")].into_iter().collect();

        let resolution = engine
            .resolve("run-t", &group, &index, artifacts, &RunCancellation::new())
            .await
            .unwrap();
        let order: Vec<&str> = resolution
            .outcomes
            .iter()
            .map(|o| o.issue_id.as_str())
            .collect();
        assert_eq!(order, vec!["X", "Y"]);
        assert_eq!(resolution.edges.len(), 1);
    }
}
