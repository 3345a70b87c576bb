//! Hosted DNS convergence for ferry
//!
//! This crate provides the Kubernetes controller for FerryDomain CRDs: a
//! zone is created or adopted, its records are created one by one with every
//! ID persisted, and deletion removes the records before the zone.

#![deny(missing_docs)]

pub mod controller;
mod sync;
pub mod validation;

#[cfg(test)]
mod testing;

pub use controller::{
    error_policy, reconcile, Context, ContextBuilder, DomainStore, KubeDomainStore,
    CONTROLLER_NAME,
};
pub use validation::{is_valid_domain, validate_domain};

pub use ferry_common::{Error, Result};
