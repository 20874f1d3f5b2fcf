//! SkyReduce: partitioned continuum imaging driver.

use std::process::ExitCode;

use skyreduce_lib::{app, config, errors, version};
use tracing::Level;

fn main() -> ExitCode {
    let config = config::AppConfig::parse();

    let level = if config.verbose { Level::INFO } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    tracing::debug!(version = %version::full_version(), "starting");

    match app::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(u8::try_from(errors::exit_code(&err)).unwrap_or(1)),
    }
}
