//! Structured lifecycle events for resolution runs.
//!
//! Every event carries an `event` field (`run.started`, `issue.resolved`,
//! ...) and the `run_id` it belongs to, so a JSON subscriber can filter a
//! single run out of interleaved group workers.

use tracing::{info, warn, Span};

/// Span tagging everything a run's workers log with its `run_id`.
///
/// Attach it to futures with `tracing::Instrument` rather than entering it,
/// since group workers hop threads across awaits.
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("remedy.run", run_id = %run_id)
}

/// Emitted once per run, after grouping.
pub fn emit_run_started(run_id: &str, issues: usize, groups: usize, workers: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        issues = issues,
        groups = groups,
        workers = workers,
    );
}

/// Emitted when a group has been ordered.
pub fn emit_group_scheduled(run_id: &str, group_id: &str, issues: usize, cycle_broken: usize) {
    info!(
        event = "group.scheduled",
        run_id = %run_id,
        group_id = %group_id,
        issues = issues,
        cycle_broken = cycle_broken,
    );
}

/// Emitted when a fix passed validation and was kept.
pub fn emit_issue_resolved(run_id: &str, issue_id: &str, fix_id: &str) {
    info!(event = "issue.resolved", run_id = %run_id, issue_id = %issue_id, fix_id = %fix_id);
}

/// Deliberate non-action; logged with the risks that caused it.
pub fn emit_issue_skipped(run_id: &str, issue_id: &str, reason: &str) {
    info!(event = "issue.skipped", run_id = %run_id, issue_id = %issue_id, reason = %reason);
}

/// Emitted for a failed issue.
pub fn emit_issue_failed(run_id: &str, issue_id: &str, reason: &str) {
    warn!(event = "issue.failed", run_id = %run_id, issue_id = %issue_id, reason = %reason);
}

/// Emitted after an apply record was rolled back.
pub fn emit_rollback(run_id: &str, issue_id: &str, record_id: &str) {
    warn!(
        event = "issue.rolled_back",
        run_id = %run_id,
        issue_id = %issue_id,
        record_id = %record_id,
    );
}

/// Groups of one wave changed the same artifact outside their own issues;
/// the later group's content wins.
pub fn emit_artifact_overlap(run_id: &str, artifact: &str, group_id: &str) {
    warn!(
        event = "run.artifact_overlap",
        run_id = %run_id,
        artifact = %artifact,
        group_id = %group_id,
    );
}

/// Emitted once per completed run with the aggregate counts.
pub fn emit_run_finished(
    run_id: &str,
    duration_ms: u64,
    resolved: usize,
    failed: usize,
    skipped: usize,
    cancelled: bool,
) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        resolved = resolved,
        failed = failed,
        skipped = skipped,
        cancelled = cancelled,
    );
}
