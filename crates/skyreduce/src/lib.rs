//! SkyReduce library: application logic for the reduction driver.

pub mod app;
pub mod config;
pub mod errors;
pub mod version;
