//! Pipeline driver states.

use std::fmt;

use serde::Serialize;

/// A state of the pipeline driver.
///
/// Runs move forward through `Init -> Ingesting -> Advising -> WeightingBarrier
/// -> KernelBuild -> MajorCycleImaging -> Finalizing -> Done`. The barrier and
/// kernel stages are skipped when the configuration does not need them.
/// `Failed` is reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Init,
    Ingesting,
    Advising,
    WeightingBarrier,
    KernelBuild,
    MajorCycleImaging,
    Finalizing,
    Done,
    Failed,
}

impl Stage {
    /// Stable lowercase name used in logs and reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Ingesting => "ingesting",
            Self::Advising => "advising",
            Self::WeightingBarrier => "weighting-barrier",
            Self::KernelBuild => "kernel-build",
            Self::MajorCycleImaging => "major-cycle-imaging",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether the driver can leave this state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_advance_to(self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        next.ordinal() > self.ordinal()
    }

    fn ordinal(self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Ingesting => 1,
            Self::Advising => 2,
            Self::WeightingBarrier => 3,
            Self::KernelBuild => 4,
            Self::MajorCycleImaging => 5,
            Self::Finalizing => 6,
            Self::Done => 7,
            Self::Failed => 8,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
