//! Application entry point and dispatch.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use skyreduce_cli::{CLIProgressReporter, CLIResultPresenter};
use skyreduce_core::error::PipelineError;
use skyreduce_core::observer::StageSubject;
use skyreduce_core::observers::LoggingObserver;
use skyreduce_orchestration::report::RunReport;
use skyreduce_orchestration::{PipelineDriver, ResultPresenter};

use crate::config::AppConfig;

/// Run the application.
pub fn run(config: &AppConfig) -> Result<()> {
    if let Some(shell) = config.completion {
        let mut cmd = <AppConfig as clap::CommandFactory>::command();
        skyreduce_cli::completion::generate_completion(&mut cmd, shell, &mut std::io::stdout());
        return Ok(());
    }

    let presenter = CLIResultPresenter::new(config.verbose, config.quiet, config.json);
    match run_pipeline(config) {
        Ok(report) => {
            presenter.present_report(&report);
            Ok(())
        }
        Err(err) => {
            presenter.present_error(&err);
            Err(err.into())
        }
    }
}

/// Build the driver from `config`, run it, and return its report.
pub fn run_pipeline(config: &AppConfig) -> Result<RunReport, PipelineError> {
    let pipeline = config.pipeline()?;
    let backend = config.backend();
    info!(
        source = %pipeline.source,
        context = pipeline.context.name(),
        mode = %pipeline.mode,
        serial = backend.serial,
        "starting run"
    );

    let observers = StageSubject::new();
    observers.register(Arc::new(LoggingObserver));
    if !(config.quiet || config.json) {
        observers.register(Arc::new(CLIProgressReporter::new()));
    }

    PipelineDriver::connect(pipeline, &backend, skyreduce_sim::collaborators())?
        .with_observer(Arc::new(observers))
        .run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use skyreduce_core::stage::Stage;

    fn config(args: &[&str]) -> AppConfig {
        AppConfig::try_parse_from(std::iter::once("skyreduce").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn serial_run_produces_a_report() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().to_string_lossy().into_owned();
        let cfg = config(&[
            "--serial",
            "--quiet",
            "--msname",
            "app.MS",
            "--channels",
            "0",
            "7",
            "--npixel",
            "32",
            "--output-dir",
            &out,
        ]);
        let report = run_pipeline(&cfg).unwrap();
        assert_eq!(report.partitions.len(), 2);
        assert!(report.artifact.exists());
        assert!(run(&cfg).is_ok());
    }

    #[test]
    fn configuration_errors_fail_in_init() {
        let cfg = config(&["--quiet", "--channels", "9", "3"]);
        let err = run_pipeline(&cfg).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Init));
        assert!(err.is_configuration());
    }
}
