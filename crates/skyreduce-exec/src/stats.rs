//! Atomic task statistics for lock-free accounting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Task counters of one backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    /// Tasks handed to the backend.
    pub submitted: u64,
    /// Tasks whose body ran and succeeded.
    pub completed: u64,
    /// Tasks that failed, including those failed by an upstream input.
    pub failed: u64,
}

impl TaskStats {
    /// Tasks that have not settled yet.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.submitted.saturating_sub(self.completed + self.failed)
    }
}

/// Atomic task statistics for lock-free updates.
#[derive(Debug, Default)]
pub struct AtomicTaskStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl AtomicTaskStats {
    /// Create new zeroed stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of current stats.
    pub fn snapshot(&self) -> TaskStats {
        TaskStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = AtomicTaskStats::new();
        stats.record_submitted();
        stats.record_submitted();
        stats.record_submitted();
        stats.record_completed();
        stats.record_failed();
        let snap = stats.snapshot();
        assert_eq!(snap.submitted, 3);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.outstanding(), 1);
    }

    #[test]
    fn concurrent_updates() {
        let stats = std::sync::Arc::new(AtomicTaskStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = std::sync::Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        stats.record_completed();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.snapshot().completed, 1000);
    }
}
