//! Concrete observer implementations.

use crossbeam_channel::Sender;
use tracing::{debug, info};

use crate::observer::{StageObserver, StageUpdate};

/// Observer that sends updates through a channel (non-blocking).
pub struct ChannelObserver {
    sender: Sender<StageUpdate>,
}

impl ChannelObserver {
    /// Create a new channel observer.
    #[must_use]
    pub fn new(sender: Sender<StageUpdate>) -> Self {
        Self { sender }
    }
}

impl StageObserver for ChannelObserver {
    fn on_stage(&self, update: &StageUpdate) {
        // Dropped updates are acceptable when the receiver has gone away.
        let _ = self.sender.try_send(update.clone());
    }
}

/// Observer that logs stage transitions.
pub struct LoggingObserver;

impl StageObserver for LoggingObserver {
    fn on_stage(&self, update: &StageUpdate) {
        match update.elapsed {
            Some(elapsed) => info!(
                stage = %update.stage,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "{}",
                update.detail
            ),
            None => debug!(stage = %update.stage, "{}", update.detail),
        }
    }
}

/// Observer that discards every update.
pub struct NoOpObserver;

impl NoOpObserver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoOpObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl StageObserver for NoOpObserver {
    fn on_stage(&self, _update: &StageUpdate) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;
    use std::time::Duration;

    #[test]
    fn channel_observer_forwards() {
        let (tx, rx) = crossbeam_channel::bounded(10);
        let observer = ChannelObserver::new(tx);
        observer.on_stage(&StageUpdate::entered(Stage::Ingesting, "2 partitions"));
        let got = rx.try_recv().unwrap();
        assert_eq!(got.stage, Stage::Ingesting);
        assert_eq!(got.detail, "2 partitions");
    }

    #[test]
    fn channel_observer_full_channel_does_not_block() {
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let observer = ChannelObserver::new(tx);
        observer.on_stage(&StageUpdate::entered(Stage::Init, ""));
        observer.on_stage(&StageUpdate::entered(Stage::Ingesting, ""));
    }

    #[test]
    fn logging_and_noop_do_not_panic() {
        let update = StageUpdate::finished(Stage::Done, "ok", Duration::from_secs(1));
        LoggingObserver.on_stage(&update);
        NoOpObserver::new().on_stage(&update);
    }
}
