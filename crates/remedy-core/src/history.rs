//! Run-keyed store of finished runs.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use remedy_state::IssueId;
use serde::{Deserialize, Serialize};

use crate::batch::RunResult;
use crate::graph::DependencyEdge;
use crate::impact::ImpactReport;

/// Per-group artifacts kept for inspection after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTrace {
    pub group_id: String,
    pub edges: Vec<DependencyEdge>,
    pub cycle_broken: BTreeSet<IssueId>,
    pub impact_reports: Vec<ImpactReport>,
}

/// A finished run and its per-group traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub result: RunResult,
    pub traces: Vec<GroupTrace>,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate counters across recorded runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_runs: usize,
    pub total_resolved: usize,
    pub total_failed: usize,
    pub total_skipped: usize,
    pub rollbacks: usize,
}

/// In-memory history shared by every run of a resolver.
#[derive(Debug, Default)]
pub struct RunHistory {
    ledger: Mutex<Ledger>,
}

#[derive(Debug, Default)]
struct Ledger {
    runs: HashMap<String, RunRecord>,
    /// Ids of runs in flight; they count as taken.
    reserved: HashSet<String>,
}

/// Claim on a run id, held while the run executes.
///
/// Dropping it without [`RunReservation::commit`] frees the id again.
#[derive(Debug)]
pub struct RunReservation<'a> {
    history: &'a RunHistory,
    run_id: String,
    committed: bool,
}

impl RunReservation<'_> {
    /// The reserved id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Store the finished run under the reserved id.
    pub fn commit(mut self, record: RunRecord) {
        let mut ledger = self.history.lock();
        ledger.reserved.remove(&self.run_id);
        ledger.runs.insert(self.run_id.clone(), record);
        self.committed = true;
    }
}

impl Drop for RunReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.history.lock().reserved.remove(&self.run_id);
        }
    }
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically claim `run_id`; `None` if it is recorded or in flight.
    pub fn try_reserve(&self, run_id: &str) -> Option<RunReservation<'_>> {
        let mut ledger = self.lock();
        if ledger.runs.contains_key(run_id) || !ledger.reserved.insert(run_id.to_string()) {
            return None;
        }
        Some(RunReservation {
            history: self,
            run_id: run_id.to_string(),
            committed: false,
        })
    }

    /// Store `record`, replacing any previous run with the same id.
    pub fn record(&self, record: RunRecord) {
        self.lock().runs.insert(record.result.run_id.clone(), record);
    }

    /// Finished run with this id, if any.
    pub fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.lock().runs.get(run_id).cloned()
    }

    /// Whether a finished run with this id was recorded.
    pub fn contains(&self, run_id: &str) -> bool {
        self.lock().runs.contains_key(run_id)
    }

    /// All records, oldest first.
    pub fn list(&self) -> Vec<RunRecord> {
        let mut records: Vec<RunRecord> = self
            .lock()
            .runs
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then_with(|| a.result.run_id.cmp(&b.result.run_id))
        });
        records
    }

    /// Number of recorded runs.
    pub fn len(&self) -> usize {
        self.lock().runs.len()
    }

    /// True when no run was recorded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Totals over every recorded run.
    pub fn stats(&self) -> HistoryStats {
        let ledger = self.lock();
        let runs = &ledger.runs;
        runs.values().fold(
            HistoryStats {
                total_runs: runs.len(),
                ..HistoryStats::default()
            },
            |mut stats, record| {
                stats.total_resolved += record.result.resolved;
                stats.total_failed += record.result.failed;
                stats.total_skipped += record.result.skipped;
                stats.rollbacks += record.result.rollback_history.len();
                stats
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(run_id: &str, resolved: usize, failed: usize) -> RunRecord {
        let now = Utc::now();
        RunRecord {
            result: RunResult {
                run_id: run_id.to_string(),
                total: resolved + failed,
                resolved,
                failed,
                skipped: 0,
                success_rate: 0.0,
                cancelled: false,
                groups: Vec::new(),
                applied_fixes: Vec::new(),
                rollback_history: Vec::new(),
                started_at: now,
                finished_at: now,
            },
            traces: Vec::new(),
            recorded_at: now,
        }
    }

    #[test]
    fn stats_sum_over_runs() {
        let history = RunHistory::new();
        assert!(history.is_empty());
        history.record(record("run-a", 2, 1));
        history.record(record("run-b", 3, 0));

        let stats = history.stats();
        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.total_resolved, 5);
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.rollbacks, 0);
    }

    #[test]
    fn get_and_list() {
        let history = RunHistory::new();
        history.record(record("run-a", 1, 0));
        assert!(history.contains("run-a"));
        assert_eq!(history.get("run-a").unwrap().result.resolved, 1);
        assert!(history.get("run-z").is_none());
        assert_eq!(history.list().len(), 1);
    }

    #[test]
    fn reservation_blocks_the_id_until_dropped() {
        let history = RunHistory::new();
        let first = history.try_reserve("run-a").expect("free id");
        assert!(history.try_reserve("run-a").is_none());
        assert!(!history.contains("run-a"));
        drop(first);

        let again = history.try_reserve("run-a").expect("released on drop");
        assert_eq!(again.run_id(), "run-a");
        again.commit(record("run-a", 1, 0));
        assert!(history.try_reserve("run-a").is_none());
        assert_eq!(history.len(), 1);
    }
}
