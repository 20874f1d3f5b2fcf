//! # skyreduce-orchestration
//!
//! Task graph construction, the weighting barrier, and the pipeline driver
//! state machine.

pub mod barrier;
pub mod config;
pub mod driver;
pub mod interfaces;
pub mod report;
pub mod task_graph;

pub use barrier::apply_weighting;
pub use config::PipelineConfig;
pub use driver::PipelineDriver;
pub use interfaces::{NullPresenter, ResultPresenter};
pub use report::{RunReport, StageTiming};
pub use task_graph::TaskGraph;
