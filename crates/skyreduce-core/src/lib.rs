//! # skyreduce-core
//!
//! Core types for the SkyReduce orchestration layer: partition planning,
//! advisory resolution, imaging strategy selection, the data model exchanged
//! between stages, collaborator contracts, and the error taxonomy.

pub mod advisory;
pub mod collaborators;
pub mod constants;
pub mod error;
pub mod model;
pub mod observer;
pub mod observers;
pub mod options;
pub mod partition;
pub mod stage;
pub mod strategy;

// Re-exports
pub use advisory::{Advisory, AdvisoryPolicy, AdvisorySource};
pub use collaborators::{Collaborators, ImagingInputs};
pub use constants::exit_codes;
pub use error::PipelineError;
pub use model::{
    ConvolutionKernel, Footprint, Image, ImagingOutcome, PartitionedDataset, QualityReport,
    RawDataset,
};
pub use observer::{StageObserver, StageSubject, StageUpdate};
pub use options::{CoalescePolicy, DeconvolutionControls, IngestOptions, KernelParams, Mode, Weighting};
pub use partition::{Partition, Partitioner};
pub use stage::Stage;
pub use strategy::{Context, ImageGeometry, ImagingContext, Overrides, StrategyConfig, StrategySelector};
