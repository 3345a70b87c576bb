//! Custom Resource Definitions for ferry
//!
//! All CRDs live in the `ferry.dev` group at `v1alpha1`.

mod application;
mod dns;

pub use application::{
    AclRuleSpec, ApplicationPhase, FerryApplication, FerryApplicationSpec, FerryApplicationStatus,
    FrontendSpec, HealthCheckSpec, LoadBalancerSpec, LoadBalancerType, RoutingRuleSpec,
    TargetGroupSpec,
};
pub use dns::{DnsPhase, DnsRecordSpec, FerryDomain, FerryDomainSpec, FerryDomainStatus};

pub(crate) fn default_true() -> bool {
    true
}
