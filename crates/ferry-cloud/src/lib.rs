//! Cloud networking capabilities for ferry
//!
//! The reconcilers depend only on the traits in [`api`]. [`HttpCloudClient`]
//! implements them against the provider's REST API, and [`classify`] maps the
//! provider's failure messages to [`ferry_common::CloudErrorKind`].

#![deny(missing_docs)]

pub mod api;
pub mod classify;
pub mod http;
pub mod types;
mod wire;

pub use api::{CloudResult, DnsApi, LoadBalancerApi};
pub use http::{HttpCloudClient, DEFAULT_API_URL};
