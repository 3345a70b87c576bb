//! ferry operator: CRD installation, configuration and controller wiring

#![deny(missing_docs)]

pub mod config;
pub mod controller_runner;
pub mod crds;

pub use config::OperatorConfig;
