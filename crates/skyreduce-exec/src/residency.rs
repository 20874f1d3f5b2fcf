//! Registry of persisted task results held by a backend.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::deferred::{Pinned, TaskId};

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResidencySummary {
    pub pinned: usize,
    pub resident_bytes: usize,
    pub ceiling_bytes: Option<usize>,
}

impl ResidencySummary {
    /// Whether resident results exceed the configured ceiling.
    #[must_use]
    pub fn over_ceiling(&self) -> bool {
        self.ceiling_bytes
            .is_some_and(|ceiling| self.resident_bytes > ceiling)
    }
}

/// Pinned results keyed by task. Pinning keeps a result alive on the backend
/// until it is released or the backend shuts down.
pub struct ResidencyRegistry {
    pins: Mutex<HashMap<TaskId, Box<dyn Pinned>>>,
    ceiling: Option<usize>,
}

impl ResidencyRegistry {
    /// Create a registry with an optional memory ceiling in bytes.
    #[must_use]
    pub fn new(ceiling: Option<usize>) -> Self {
        Self {
            pins: Mutex::new(HashMap::new()),
            ceiling,
        }
    }

    /// Pin a task. Pinning the same task twice keeps a single entry.
    pub fn pin(&self, id: TaskId, task: Box<dyn Pinned>) {
        self.pins.lock().entry(id).or_insert(task);
    }

    /// Release a task. Returns whether it was pinned.
    pub fn unpin(&self, id: TaskId) -> bool {
        self.pins.lock().remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.lock().is_empty()
    }

    /// Current summary. Pending results count as zero bytes.
    #[must_use]
    pub fn summary(&self) -> ResidencySummary {
        let pins = self.pins.lock();
        ResidencySummary {
            pinned: pins.len(),
            resident_bytes: pins.values().map(|p| p.resident_bytes()).sum(),
            ceiling_bytes: self.ceiling,
        }
    }

    /// Log a warning when resident results exceed the ceiling.
    ///
    /// The ceiling is advisory: nothing is evicted.
    pub fn check_ceiling(&self) -> ResidencySummary {
        let summary = self.summary();
        if summary.over_ceiling() {
            warn!(
                resident_bytes = summary.resident_bytes,
                ceiling_bytes = summary.ceiling_bytes,
                pinned = summary.pinned,
                "persisted results exceed the worker memory ceiling"
            );
        } else {
            debug!(
                resident_bytes = summary.resident_bytes,
                pinned = summary.pinned,
                "residency"
            );
        }
        summary
    }

    /// Drop every pin.
    pub fn clear(&self) {
        let mut pins = self.pins.lock();
        if !pins.is_empty() {
            debug!(released = pins.len(), "releasing persisted results");
        }
        pins.clear();
    }
}
