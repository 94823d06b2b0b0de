//! Process-wide counters for resolution outcomes.
//!
//! Counters are bumped by the engine as issues reach a terminal state.
//! [`Metrics::flush`] emits the current values as one `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, one per terminal outcome plus rollbacks.
pub struct Metrics {
    issues_resolved: AtomicU64,
    issues_failed: AtomicU64,
    issues_skipped: AtomicU64,
    rollbacks: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            issues_resolved: AtomicU64::new(0),
            issues_failed: AtomicU64::new(0),
            issues_skipped: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
        }
    }

    /// Count one resolved issue.
    pub fn inc_resolved(&self) {
        self.issues_resolved.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "issues_resolved", "counter incremented");
    }

    /// Count one failed issue.
    pub fn inc_failed(&self) {
        self.issues_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "issues_failed", "counter incremented");
    }

    /// Count one skipped issue.
    pub fn inc_skipped(&self) {
        self.issues_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "issues_skipped", "counter incremented");
    }

    /// Count one performed rollback.
    pub fn inc_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks", "counter incremented");
    }

    /// Emit all counters as a single `info!` event, typically at the end of a run.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            issues_resolved = self.issues_resolved(),
            issues_failed = self.issues_failed(),
            issues_skipped = self.issues_skipped(),
            rollbacks = self.rollbacks(),
        );
    }

    /// Current resolved count.
    pub fn issues_resolved(&self) -> u64 {
        self.issues_resolved.load(Ordering::Relaxed)
    }

    /// Current failed count.
    pub fn issues_failed(&self) -> u64 {
        self.issues_failed.load(Ordering::Relaxed)
    }

    /// Current skipped count.
    pub fn issues_skipped(&self) -> u64 {
        self.issues_skipped.load(Ordering::Relaxed)
    }

    /// Current rollback count.
    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Zero every counter. Intended for tests.
    pub fn reset(&self) {
        self.issues_resolved.store(0, Ordering::Relaxed);
        self.issues_failed.store(0, Ordering::Relaxed);
        self.issues_skipped.store(0, Ordering::Relaxed);
        self.rollbacks.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independent() {
        let m = Metrics::new();
        m.inc_resolved();
        m.inc_resolved();
        m.inc_failed();
        m.inc_rollbacks();
        assert_eq!(m.issues_resolved(), 2);
        assert_eq!(m.issues_failed(), 1);
        assert_eq!(m.issues_skipped(), 0);
        assert_eq!(m.rollbacks(), 1);

        m.reset();
        assert_eq!(m.issues_resolved(), 0);
        assert_eq!(m.rollbacks(), 0);
    }
}
