//! Run-level entry point: validate, group, resolve groups, aggregate.
//!
//! Groups never share dependency edges, so with `workers > 1` they are
//! resolved concurrently on a bounded pool. Each concurrent group starts from
//! the request's artifact set and its changes are merged back in group order.
//! Concurrent groups must touch disjoint artifacts; the resolver does not lock
//! artifacts and only reports overlaps it sees during the merge.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use remedy_state::{
    ArtifactAdjacency, ArtifactId, ArtifactSet, Category, FixProvider, Issue, IssueId, Mutator,
    Validator,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, Instrument};
use uuid::Uuid;

use crate::adjacency::AdjacencyIndex;
use crate::apply::ApplyRecord;
use crate::cancel::RunCancellation;
use crate::config::ResolverConfig;
use crate::engine::{GroupResolution, GroupResolver, ResolutionEngine, ResolutionOutcome, ResolutionStatus};
use crate::error::{RemedyError, Result};
use crate::grouping::{GroupRelation, IssueGroup, IssueGrouper};
use crate::history::{GroupTrace, RunHistory, RunRecord};
use crate::metrics::METRICS;
use crate::obs;
use crate::rollback::RollbackEntry;

/// One incoming resolution request.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    /// Generated when absent.
    pub run_id: Option<String>,
    pub issues: Vec<Issue>,
    pub artifacts: ArtifactSet,
}

impl ResolutionRequest {
    pub fn new(issues: Vec<Issue>, artifacts: ArtifactSet) -> Self {
        Self {
            run_id: None,
            issues,
            artifacts,
        }
    }

    /// Use a caller-chosen run id instead of a generated one.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Reject empty requests, blank ids and duplicate issue ids.
    pub fn validate(&self) -> Result<()> {
        if self.issues.is_empty() {
            return Err(RemedyError::InvalidRequest("no issues to resolve".to_string()));
        }
        if self.run_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(RemedyError::InvalidRequest("run id is blank".to_string()));
        }
        let mut seen = HashSet::with_capacity(self.issues.len());
        for issue in &self.issues {
            if issue.id.as_str().trim().is_empty() {
                return Err(RemedyError::InvalidRequest("issue id is blank".to_string()));
            }
            if !seen.insert(&issue.id) {
                return Err(RemedyError::InvalidRequest(format!(
                    "duplicate issue id: {}",
                    issue.id
                )));
            }
        }
        Ok(())
    }
}

/// Group-level risk notes. Informational; they do not change outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "risk", rename_all = "snake_case")]
pub enum GroupRisk {
    /// The group spans more artifacts than the configured fan-out limit.
    ManyArtifacts { count: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    pub group_id: String,
    pub issue_ids: Vec<IssueId>,
    pub shared_category: Option<Category>,
    pub relations: Vec<GroupRelation>,
    pub risks: Vec<GroupRisk>,
    pub outcomes: Vec<ResolutionOutcome>,
    pub resolved: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Result of one run. Every input issue appears in exactly one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub total: usize,
    pub resolved: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Percentage of issues resolved.
    pub success_rate: f64,
    pub cancelled: bool,
    pub groups: Vec<GroupReport>,
    pub applied_fixes: Vec<ApplyRecord>,
    pub rollback_history: Vec<RollbackEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// All outcomes, group by group.
    pub fn outcomes(&self) -> impl Iterator<Item = &ResolutionOutcome> {
        self.groups.iter().flat_map(|g| g.outcomes.iter())
    }

    /// Outcome for one issue, if it was part of the run.
    pub fn outcome(&self, issue_id: &str) -> Option<&ResolutionOutcome> {
        self.outcomes().find(|o| o.issue_id.as_str() == issue_id)
    }

    /// Pretty JSON rendering of the whole result.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A finished run together with the artifact state it produced.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub result: RunResult,
    pub artifacts: ArtifactSet,
}

/// Collaborators needed to build a [`BatchResolver`] around the default engine.
#[derive(Clone)]
pub struct Collaborators {
    pub adjacency: Arc<dyn ArtifactAdjacency>,
    pub fix_provider: Arc<dyn FixProvider>,
    pub mutator: Arc<dyn Mutator>,
    pub validator: Arc<dyn Validator>,
}

pub struct BatchResolver {
    config: ResolverConfig,
    adjacency: Arc<dyn ArtifactAdjacency>,
    resolver: Arc<dyn GroupResolver>,
    history: Arc<RunHistory>,
}

impl BatchResolver {
    /// Resolver over an injected group resolver. Fails on an invalid config.
    pub fn new(
        config: ResolverConfig,
        adjacency: Arc<dyn ArtifactAdjacency>,
        resolver: Arc<dyn GroupResolver>,
        history: Arc<RunHistory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            adjacency,
            resolver,
            history,
        })
    }

    /// Batch resolver driving a [`ResolutionEngine`] built from `collaborators`.
    pub fn with_engine(
        config: ResolverConfig,
        collaborators: Collaborators,
        history: Arc<RunHistory>,
    ) -> Result<Self> {
        let engine = ResolutionEngine::new(
            config.clone(),
            collaborators.fix_provider,
            collaborators.mutator,
            collaborators.validator,
        );
        Self::new(config, collaborators.adjacency, Arc::new(engine), history)
    }

    /// History shared by every run of this resolver.
    pub fn history(&self) -> &Arc<RunHistory> {
        &self.history
    }

    /// Resolve every issue of `request`.
    ///
    /// Local failures are recorded per issue; `Err` means the request was
    /// invalid or an invariant was violated and the run was aborted.
    #[instrument(skip_all, fields(issues = request.issues.len()))]
    pub async fn run(&self, request: ResolutionRequest, cancel: &RunCancellation) -> Result<RunOutput> {
        request.validate()?;
        let run_id = request
            .run_id
            .clone()
            .unwrap_or_else(|| format!("run-{}", Uuid::new_v4()));
        let reservation = self.history.try_reserve(&run_id).ok_or_else(|| {
            RemedyError::InvalidRequest(format!("run id already recorded or running: {run_id}"))
        })?;

        let started_at = Utc::now();
        let clock = Instant::now();
        let timeout = self.config.collaborator_timeout();

        let adjacency = Arc::new(
            AdjacencyIndex::collect(
                self.adjacency.as_ref(),
                request.issues.iter().map(Issue::artifact),
                timeout,
            )
            .await,
        );
        let groups = IssueGrouper::new(&adjacency).group(&request.issues);
        obs::emit_run_started(&run_id, request.issues.len(), groups.len(), self.config.workers);

        let span = obs::run_span(&run_id);
        let (resolutions, artifacts) = if self.config.workers <= 1 || groups.len() <= 1 {
            self.resolve_sequential(&run_id, &groups, &adjacency, request.artifacts, cancel)
                .instrument(span)
                .await?
        } else {
            self.resolve_concurrent(&run_id, &groups, &adjacency, request.artifacts, cancel)
                .instrument(span)
                .await?
        };

        let result = self.aggregate(&run_id, &groups, &resolutions, cancel, started_at);
        obs::emit_run_finished(
            &run_id,
            u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            result.resolved,
            result.failed,
            result.skipped,
            result.cancelled,
        );
        METRICS.flush();

        reservation.commit(RunRecord {
            result: result.clone(),
            traces: resolutions
                .into_iter()
                .map(|r| GroupTrace {
                    group_id: r.group_id,
                    edges: r.edges,
                    cycle_broken: r.cycle_broken,
                    impact_reports: r.impact_reports,
                })
                .collect(),
            recorded_at: Utc::now(),
        });

        Ok(RunOutput { result, artifacts })
    }

    /// Thread one artifact set through the groups in order.
    async fn resolve_sequential(
        &self,
        run_id: &str,
        groups: &[IssueGroup],
        adjacency: &AdjacencyIndex,
        mut artifacts: ArtifactSet,
        cancel: &RunCancellation,
    ) -> Result<(Vec<GroupResolution>, ArtifactSet)> {
        let mut resolutions = Vec::with_capacity(groups.len());
        for group in groups {
            let resolution = self
                .resolver
                .resolve_group(run_id, group, adjacency, artifacts, cancel)
                .await?;
            artifacts = resolution.artifacts.clone();
            resolutions.push(resolution);
        }
        Ok((resolutions, artifacts))
    }

    /// Resolve groups on at most `workers` tasks.
    ///
    /// Groups run in waves; groups sharing an artifact never share a wave,
    /// and a later wave starts from the merged result of the earlier ones.
    async fn resolve_concurrent(
        &self,
        run_id: &str,
        groups: &[IssueGroup],
        adjacency: &Arc<AdjacencyIndex>,
        mut artifacts: ArtifactSet,
        cancel: &RunCancellation,
    ) -> Result<(Vec<GroupResolution>, ArtifactSet)> {
        let sem = Arc::new(Semaphore::new(self.config.workers));
        let mut slots: Vec<Option<GroupResolution>> = vec![None; groups.len()];

        for wave in plan_waves(groups) {
            debug!(run_id, groups = wave.len(), "starting group wave");
            let mut tasks: Vec<JoinHandle<Result<GroupResolution>>> = Vec::with_capacity(wave.len());
            for &position in &wave {
                let sem = Arc::clone(&sem);
                let resolver = Arc::clone(&self.resolver);
                let adjacency = Arc::clone(adjacency);
                let group = groups[position].clone();
                let base = artifacts.clone();
                let cancel = cancel.clone();
                let run_id = run_id.to_string();

                let task = tokio::spawn(
                    async move {
                        let _permit = sem
                            .acquire_owned()
                            .await
                            .map_err(|e| RemedyError::Worker(e.to_string()))?;
                        resolver
                            .resolve_group(&run_id, &group, &adjacency, base, &cancel)
                            .await
                    }
                    .in_current_span(),
                );
                tasks.push(task);
            }

            let mut finished = Vec::with_capacity(tasks.len());
            let mut pending = tasks.into_iter();
            while let Some(task) = pending.next() {
                let joined = task
                    .await
                    .map_err(|e| RemedyError::Worker(e.to_string()))
                    .and_then(|result| result);
                match joined {
                    Ok(resolution) => finished.push(resolution),
                    Err(e) => {
                        // fatal for the whole run; stop workers still queued
                        for rest in pending {
                            rest.abort();
                        }
                        return Err(e);
                    }
                }
            }

            let base = artifacts.clone();
            let mut touched: HashSet<ArtifactId> = HashSet::new();
            for (&position, resolution) in wave.iter().zip(finished) {
                let changed = resolution.artifacts.changed_since(&base);
                for artifact in &changed {
                    // only a collaborator writing outside its group's artifacts gets here
                    if !touched.insert(artifact.clone()) {
                        obs::emit_artifact_overlap(run_id, artifact.as_str(), &resolution.group_id);
                    }
                }
                artifacts.adopt(&resolution.artifacts, &changed);
                slots[position] = Some(resolution);
            }
        }

        let resolutions = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| RemedyError::Worker("group left unresolved".to_string()))?;
        Ok((resolutions, artifacts))
    }

    fn aggregate(
        &self,
        run_id: &str,
        groups: &[IssueGroup],
        resolutions: &[GroupResolution],
        cancel: &RunCancellation,
        started_at: DateTime<Utc>,
    ) -> RunResult {
        let mut reports = Vec::with_capacity(groups.len());
        let mut applied_fixes = Vec::new();
        let mut rollback_history = Vec::new();

        for (group, resolution) in groups.iter().zip(resolutions) {
            let count = |status: ResolutionStatus| {
                resolution
                    .outcomes
                    .iter()
                    .filter(|o| o.status == status)
                    .count()
            };
            let artifact_count = group.artifacts().len();
            let mut risks = Vec::new();
            if artifact_count > self.config.group_artifact_fanout_limit {
                risks.push(GroupRisk::ManyArtifacts {
                    count: artifact_count,
                    limit: self.config.group_artifact_fanout_limit,
                });
            }
            reports.push(GroupReport {
                group_id: group.id.clone(),
                issue_ids: group.issue_ids(),
                shared_category: group.shared_category,
                relations: group.relations.clone(),
                risks,
                outcomes: resolution.outcomes.clone(),
                resolved: count(ResolutionStatus::Resolved),
                failed: count(ResolutionStatus::Failed),
                skipped: count(ResolutionStatus::Skipped),
            });
            applied_fixes.extend(resolution.applied_fixes.iter().cloned());
            rollback_history.extend(resolution.rollbacks.iter().cloned());
        }

        let total = reports.iter().map(|g| g.outcomes.len()).sum();
        let resolved = reports.iter().map(|g| g.resolved).sum();
        let failed = reports.iter().map(|g| g.failed).sum();
        let skipped = reports.iter().map(|g| g.skipped).sum();
        let success_rate = if total == 0 {
            0.0
        } else {
            resolved as f64 / total as f64 * 100.0
        };

        RunResult {
            run_id: run_id.to_string(),
            total,
            resolved,
            failed,
            skipped,
            success_rate,
            cancelled: cancel.is_cancelled(),
            groups: reports,
            applied_fixes,
            rollback_history,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Partition group positions into waves of artifact-disjoint groups.
///
/// A group lands one wave after the latest earlier group it shares an
/// artifact with, so overlapping groups keep their relative order.
pub(crate) fn plan_waves(groups: &[IssueGroup]) -> Vec<Vec<usize>> {
    let artifact_sets: Vec<BTreeSet<ArtifactId>> = groups.iter().map(IssueGroup::artifacts).collect();
    let mut wave_of: Vec<usize> = Vec::with_capacity(groups.len());
    let mut waves: Vec<Vec<usize>> = Vec::new();

    for (position, artifacts) in artifact_sets.iter().enumerate() {
        let wave = (0..position)
            .filter(|&earlier| !artifact_sets[earlier].is_disjoint(artifacts))
            .map(|earlier| wave_of[earlier] + 1)
            .max()
            .unwrap_or(0);
        wave_of.push(wave);
        if waves.len() <= wave {
            waves.resize_with(wave + 1, Vec::new);
        }
        waves[wave].push(position);
    }
    waves
}
