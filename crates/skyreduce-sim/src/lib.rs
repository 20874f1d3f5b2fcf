//! Deterministic in-process collaborators.
//!
//! A synthetic interferometer observes a small point-source sky. The
//! implementations are deliberately simple and exist so the orchestrator can
//! run end to end: nearest-cell gridding, density weighting, a Hogbom loop and
//! JSON export.

pub mod advise;
pub mod convert;
pub mod export;
mod grid;
pub mod imaging;
pub mod model;
pub mod observation;
pub mod weighting;

use std::sync::Arc;

use skyreduce_core::collaborators::Collaborators;

pub use advise::SimAdvisor;
pub use convert::SimConverter;
pub use export::JsonExporter;
pub use imaging::SimImaging;
pub use model::{SimKernelConstructor, SimModelBuilder};
pub use observation::{PointSource, SimObservation, SimReader};
pub use weighting::SimWeighter;

/// Collaborators over the default synthetic observation.
#[must_use]
pub fn collaborators() -> Collaborators {
    collaborators_for(SimObservation::default())
}

/// Collaborators over `observation`.
#[must_use]
pub fn collaborators_for(observation: SimObservation) -> Collaborators {
    Collaborators {
        reader: Arc::new(SimReader::new(observation)),
        converter: Arc::new(SimConverter),
        advisor: Arc::new(SimAdvisor::default()),
        models: Arc::new(SimModelBuilder),
        kernels: Arc::new(SimKernelConstructor),
        weighter: Arc::new(SimWeighter),
        imaging: Arc::new(SimImaging),
        exporter: Arc::new(JsonExporter),
    }
}
