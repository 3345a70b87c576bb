//! Request parameters and records exchanged with the networking API

use ferry_common::crd::{
    AclRuleSpec, DnsRecordSpec, FrontendSpec, LoadBalancerSpec, TargetGroupSpec,
};

/// Parameters for creating a load balancer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancerParams {
    /// Datacenter slug
    pub region: String,
    /// "application" or "network"
    pub lb_type: String,
    /// Display name
    pub name: String,
}

impl From<&LoadBalancerSpec> for LoadBalancerParams {
    fn from(spec: &LoadBalancerSpec) -> Self {
        Self {
            region: spec.region.clone(),
            lb_type: spec.lb_type.as_str().to_string(),
            name: spec.name.clone(),
        }
    }
}

/// A created load balancer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreatedLoadBalancer {
    /// Provider ID
    pub id: String,
    /// Public IP, if the provider returned one at creation
    pub ip: String,
}

/// A load balancer as read back from the provider
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadBalancerRecord {
    /// Provider ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Public IP
    pub ip: String,
    /// Frontends configured on the load balancer
    pub frontends: Vec<FrontendRecord>,
}

/// Parameters for creating or updating a frontend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrontendParams {
    /// Frontend name
    pub name: String,
    /// Lowercased listener protocol
    pub protocol: String,
    /// Listener port
    pub port: u16,
    /// Lowercased balancing algorithm
    pub algorithm: String,
    /// Redirect HTTP to HTTPS
    pub redirect_https: bool,
    /// Sticky sessions
    pub cookie: bool,
    /// Resolved certificate ID, if any
    pub certificate_id: Option<String>,
}

impl FrontendParams {
    /// Build parameters from the spec and a resolved certificate ID
    pub fn from_spec(spec: &FrontendSpec, certificate_id: Option<String>) -> Self {
        Self {
            name: spec.name.clone(),
            protocol: spec.protocol.to_lowercase(),
            port: spec.port,
            algorithm: spec.algorithm.to_lowercase(),
            redirect_https: spec.redirect_https,
            cookie: spec.cookie,
            certificate_id,
        }
    }
}

/// A frontend as read back from the provider
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrontendRecord {
    /// Provider ID
    pub id: String,
    /// Frontend name
    pub name: String,
    /// Listener protocol
    pub protocol: String,
    /// Listener port
    pub port: u16,
    /// Balancing algorithm
    pub algorithm: String,
    /// Redirect HTTP to HTTPS
    pub redirect_https: bool,
    /// Sticky sessions
    pub cookie: bool,
    /// Attached certificate ID, if any
    pub certificate_id: Option<String>,
}

/// Parameters for creating or updating a target group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetGroupParams {
    /// Target group name
    pub name: String,
    /// Uppercased backend protocol
    pub protocol: String,
    /// Backend port
    pub port: u16,
    /// Health check path
    pub health_check_path: String,
    /// Health check protocol
    pub health_check_protocol: String,
    /// Seconds between health checks
    pub health_check_interval: u32,
    /// Health check timeout in seconds
    pub health_check_timeout: u32,
    /// Successes before healthy
    pub healthy_threshold: u32,
    /// Failures before unhealthy
    pub unhealthy_threshold: u32,
}

impl From<&TargetGroupSpec> for TargetGroupParams {
    fn from(spec: &TargetGroupSpec) -> Self {
        Self {
            name: spec.name.clone(),
            protocol: spec.protocol.to_uppercase(),
            port: spec.port,
            health_check_path: spec.health_check.path.clone(),
            health_check_protocol: spec.health_check.protocol.to_uppercase(),
            health_check_interval: spec.health_check.interval,
            health_check_timeout: spec.health_check.timeout,
            healthy_threshold: spec.health_check.healthy_threshold,
            unhealthy_threshold: spec.health_check.unhealthy_threshold,
        }
    }
}

/// A target group as listed by the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetGroupRecord {
    /// Provider ID
    pub id: String,
    /// Current configuration
    pub config: TargetGroupParams,
}

/// Parameters for creating an ACL rule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AclRuleParams {
    /// Rule name
    pub name: String,
    /// Match condition
    pub condition_type: String,
    /// Values matched by the condition
    pub value: Vec<String>,
}

impl From<&AclRuleSpec> for AclRuleParams {
    fn from(spec: &AclRuleSpec) -> Self {
        Self {
            name: spec.name.clone(),
            condition_type: spec.condition_type.clone(),
            value: spec.value.clone(),
        }
    }
}

/// Parameters for routing ACL matches to a target group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRuleParams {
    /// ACL rule ID
    pub acl_id: String,
    /// Target group ID
    pub target_group_id: String,
    /// Route when the ACL matches
    pub route_condition: bool,
}

/// Parameters for a network load balancer backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendParams {
    /// Frontend the backend serves
    pub frontend_id: String,
    /// Compute cluster receiving traffic
    pub cluster_id: String,
    /// Cluster port traffic is forwarded to
    pub backend_port: u16,
}

/// Parameters for creating a DNS record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DnsRecordParams {
    /// Lowercased host label
    pub hostname: String,
    /// Uppercased record type
    pub record_type: String,
    /// Time to live in seconds
    pub ttl: u32,
    /// Record data
    pub value: String,
    /// Priority (MX, SRV)
    pub priority: u32,
    /// Port (SRV)
    pub port: u16,
    /// Port type (SRV)
    pub port_type: String,
    /// Weight (SRV)
    pub weight: u32,
}

impl From<&DnsRecordSpec> for DnsRecordParams {
    fn from(spec: &DnsRecordSpec) -> Self {
        Self {
            hostname: spec.hostname.to_lowercase(),
            record_type: spec.record_type.to_uppercase(),
            ttl: spec.ttl,
            value: spec.value.clone(),
            priority: spec.priority.unwrap_or(0),
            port: spec.port.unwrap_or(0),
            port_type: spec.port_type.clone().unwrap_or_default(),
            weight: spec.weight.unwrap_or(0),
        }
    }
}
