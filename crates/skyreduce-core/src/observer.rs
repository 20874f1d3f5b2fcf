//! Observer pattern for stage transitions.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::stage::Stage;

/// A stage transition reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct StageUpdate {
    /// Stage the update refers to.
    pub stage: Stage,
    /// Human-readable detail.
    pub detail: String,
    /// Time spent in the stage; set once the stage has finished.
    pub elapsed: Option<Duration>,
}

impl StageUpdate {
    /// The driver entered `stage`.
    #[must_use]
    pub fn entered(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
            elapsed: None,
        }
    }

    /// The driver finished `stage`.
    #[must_use]
    pub fn finished(stage: Stage, detail: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            stage,
            detail: detail.into(),
            elapsed: Some(elapsed),
        }
    }

    /// Whether this update closes its stage.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.elapsed.is_some()
    }
}

/// Observer trait for receiving stage updates.
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, update: &StageUpdate);
}

/// Subject that fans updates out to a collection of observers.
pub struct StageSubject {
    observers: RwLock<Vec<Arc<dyn StageObserver>>>,
}

impl StageSubject {
    /// Create a new subject with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer.
    pub fn register(&self, observer: Arc<dyn StageObserver>) {
        self.observers.write().push(observer);
    }

    /// Get the number of registered observers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.observers.read().len()
    }
}

impl Default for StageSubject {
    fn default() -> Self {
        Self::new()
    }
}

impl StageObserver for StageSubject {
    fn on_stage(&self, update: &StageUpdate) {
        for observer in self.observers.read().iter() {
            observer.on_stage(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl StageObserver for Counting {
        fn on_stage(&self, _update: &StageUpdate) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn subject_fans_out() {
        let subject = StageSubject::new();
        let a = Arc::new(Counting(AtomicUsize::new(0)));
        let b = Arc::new(Counting(AtomicUsize::new(0)));
        subject.register(a.clone());
        subject.register(b.clone());
        assert_eq!(subject.count(), 2);

        subject.on_stage(&StageUpdate::entered(Stage::Init, "start"));
        assert_eq!(a.0.load(Ordering::Relaxed), 1);
        assert_eq!(b.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn update_constructors() {
        let entered = StageUpdate::entered(Stage::Advising, "4 partitions");
        assert!(!entered.is_finished());
        let done = StageUpdate::finished(Stage::Advising, "", Duration::from_millis(3));
        assert!(done.is_finished());
    }
}
