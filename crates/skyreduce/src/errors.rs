//! Error handling and exit codes.

use skyreduce_core::constants::exit_codes;
use skyreduce_core::error::PipelineError;

/// Exit code for a pipeline error, decided by its innermost cause.
pub fn handle_error(err: &PipelineError) -> i32 {
    match err.root() {
        PipelineError::InvalidRange { .. }
        | PipelineError::UnknownContext(_)
        | PipelineError::Config(_) => exit_codes::ERROR_CONFIG,
        PipelineError::BackendStartup(_) => exit_codes::ERROR_BACKEND,
        PipelineError::TaskExecution { .. } => exit_codes::ERROR_TASK,
        PipelineError::CollectiveBarrier(_) => exit_codes::ERROR_BARRIER,
        PipelineError::BackendShutdown
        | PipelineError::Read { .. }
        | PipelineError::Collaborator(_)
        | PipelineError::Export { .. }
        | PipelineError::Stage { .. } => exit_codes::ERROR_GENERIC,
    }
}

/// Exit code for any application error.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<PipelineError>()
        .map_or(exit_codes::ERROR_GENERIC, handle_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyreduce_core::stage::Stage;

    #[test]
    fn error_codes() {
        assert_eq!(handle_error(&PipelineError::Config("bad".into())), 2);
        assert_eq!(
            handle_error(&PipelineError::UnknownContext("facets".into()).in_stage(Stage::Init)),
            2
        );
        assert_eq!(handle_error(&PipelineError::BackendStartup("io".into())), 3);
        let task = PipelineError::task("ingest", Some(1), PipelineError::Collaborator("x".into()));
        assert_eq!(handle_error(&task.in_stage(Stage::Advising)), 4);
        assert_eq!(
            handle_error(&PipelineError::CollectiveBarrier("weighting".into())),
            5
        );
        assert_eq!(handle_error(&PipelineError::BackendShutdown), 1);
    }

    #[test]
    fn non_pipeline_errors_are_generic() {
        assert_eq!(exit_code(&anyhow::anyhow!("io")), exit_codes::ERROR_GENERIC);
        let wrapped = anyhow::Error::from(PipelineError::Config("x".into()));
        assert_eq!(exit_code(&wrapped), exit_codes::ERROR_CONFIG);
    }
}
