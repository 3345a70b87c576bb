//! Load balancer convergence for ferry
//!
//! This crate provides the Kubernetes controller for FerryApplication CRDs.
//! The controller walks an application through an ordered table of
//! provisioning stages, persisting every phase and every provider ID as it
//! goes, then keeps the running object in line with its spec.
//!
//! Related crates:
//! - `ferry-cloud`: Provider capability traits and the HTTP client
//! - `ferry-common`: CRDs, errors, events and Kubernetes utilities

#![deny(missing_docs)]

mod actions;
pub mod controller;
mod drift;
pub mod engine;
pub mod stages;
mod teardown;
pub mod validation;

#[cfg(test)]
mod testing;

// Re-export controller types
pub use controller::{
    error_policy, reconcile, ApplicationStore, Context, ContextBuilder, KubeApplicationStore,
    CONTROLLER_NAME,
};
pub use engine::{EngineSettings, Progress, DEFAULT_RECONCILE_TIMEOUT};
pub use stages::{Stage, StageOrder};

// Re-export common error types
pub use ferry_common::{Error, Result};
