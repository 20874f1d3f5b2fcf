//! Orchestration interfaces.

use skyreduce_core::error::PipelineError;

use crate::report::RunReport;

/// Trait for presenting run outcomes to the user.
pub trait ResultPresenter: Send + Sync {
    /// Present a finished run.
    fn present_report(&self, report: &RunReport);

    /// Present a failed run.
    fn present_error(&self, error: &PipelineError);
}

/// Presenter that discards everything.
pub struct NullPresenter;

impl ResultPresenter for NullPresenter {
    fn present_report(&self, _report: &RunReport) {}
    fn present_error(&self, _error: &PipelineError) {}
}
