//! Common types for ferry: CRDs, errors, events and Kubernetes utilities

#![deny(missing_docs)]

pub mod backoff;
pub mod crd;
pub mod error;
pub mod events;
pub mod invocation;
pub mod kube_utils;
pub mod telemetry;

pub use error::{CloudError, CloudErrorKind, Error};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Finalizer guarding FerryApplication teardown
pub const APPLICATION_FINALIZER: &str = "ferry.dev/application";

/// Finalizer guarding FerryDomain teardown
pub const DOMAIN_FINALIZER: &str = "ferry.dev/dns";
