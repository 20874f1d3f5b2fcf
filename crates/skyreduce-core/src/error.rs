//! Error taxonomy for the reduction pipeline.
//!
//! Every failure a run can surface is a `PipelineError`. The enum is `Clone`
//! because a single failed deferred task is reported to every waiter that
//! depends on it.

use crate::stage::Stage;

/// Error type for pipeline orchestration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// The requested index range or group size cannot be partitioned.
    #[error("invalid partition range [{lo}, {hi}] with group size {group_size}")]
    InvalidRange { lo: u64, hi: u64, group_size: u64 },

    /// Strict validation rejected an imaging context name.
    #[error("unknown imaging context: {0}")]
    UnknownContext(String),

    /// Any other configuration problem detected before backend work starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The worker pool could not be started.
    #[error("worker pool failed to start: {0}")]
    BackendStartup(String),

    /// Work was submitted to a backend that has already been shut down.
    #[error("execution backend has been shut down")]
    BackendShutdown,

    /// A submitted unit of work failed.
    #[error("task '{task}'{} failed: {message}", partition_suffix(.partition))]
    TaskExecution {
        task: String,
        partition: Option<usize>,
        message: String,
    },

    /// The collective weighting step could not produce a result.
    #[error("collective barrier failed: {0}")]
    CollectiveBarrier(String),

    /// The dataset reader rejected a source.
    #[error("failed to read '{source_name}': {message}")]
    Read { source_name: String, message: String },

    /// An external collaborator reported a failure.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// Writing an artifact failed.
    #[error("failed to export '{path}': {message}")]
    Export { path: String, message: String },

    /// A run aborted while in the given stage.
    #[error("run failed during {stage}: {source}")]
    Stage {
        stage: Stage,
        source: Box<PipelineError>,
    },
}

#[allow(clippy::ref_option)]
fn partition_suffix(partition: &Option<usize>) -> String {
    partition.map_or_else(String::new, |p| format!(" (partition {p})"))
}

impl PipelineError {
    /// Wrap an arbitrary failure raised by a unit of work.
    ///
    /// Errors that already describe a task or barrier failure pass through
    /// unchanged so the originating partition is preserved.
    #[must_use]
    pub fn task(task: impl Into<String>, partition: Option<usize>, cause: PipelineError) -> Self {
        match cause {
            e @ (Self::TaskExecution { .. } | Self::CollectiveBarrier(_)) => e,
            other => Self::TaskExecution {
                task: task.into(),
                partition,
                message: other.to_string(),
            },
        }
    }

    /// Attach the stage a run was in when it failed.
    #[must_use]
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            e @ Self::Stage { .. } => e,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with stage wrappers removed.
    #[must_use]
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The stage a run failed in, if recorded.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The partition that produced the failure, if any.
    #[must_use]
    pub fn partition(&self) -> Option<usize> {
        match self.root() {
            Self::TaskExecution { partition, .. } => *partition,
            _ => None,
        }
    }

    /// Whether this error was detected while validating configuration.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.root(),
            Self::InvalidRange { .. } | Self::UnknownContext(_) | Self::Config(_)
        )
    }
}
