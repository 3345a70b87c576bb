//! FerryApplication CRD: an application or network load balancer with its
//! frontend, target groups and ACL routing.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::default_true;

/// FerryApplication declares a load balancer and everything routed behind it.
///
/// Example:
/// ```yaml
/// apiVersion: ferry.dev/v1alpha1
/// kind: FerryApplication
/// metadata:
///   name: web
/// spec:
///   loadBalancer:
///     type: application
///     region: inmumbaizone2
///     name: web-lb
///     frontend:
///       name: web-fe
///       protocol: http
///       port: 80
///       algorithm: roundrobin
///     aclRules:
///       - name: api
///         conditionType: http_path_beg
///         value: ["/api"]
///   targetGroups:
///     - name: web-tg
///       protocol: http
///       port: 8080
///       healthCheck:
///         path: /healthz
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ferry.dev",
    version = "v1alpha1",
    kind = "FerryApplication",
    namespaced,
    status = "FerryApplicationStatus",
    shortname = "fapp",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.loadBalancer.type"}"#,
    printcolumn = r#"{"name":"IP","type":"string","jsonPath":".status.loadBalancerIP"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FerryApplicationSpec {
    /// The load balancer and its frontend routing
    pub load_balancer: LoadBalancerSpec,

    /// Backend target groups (application load balancers only)
    #[serde(default)]
    pub target_groups: Vec<TargetGroupSpec>,
}

/// Load balancer flavor
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerType {
    /// Layer 7 load balancer with target groups and ACL rules
    #[default]
    Application,
    /// Layer 4 load balancer forwarding to a cluster backend port
    Network,
}

impl LoadBalancerType {
    /// Wire name used by the provider API
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancerType::Application => "application",
            LoadBalancerType::Network => "network",
        }
    }

    /// Whether target groups and ACL rules apply
    pub fn uses_target_groups(&self) -> bool {
        matches!(self, LoadBalancerType::Application)
    }
}

/// Desired load balancer configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    /// Load balancer flavor
    #[serde(rename = "type", default)]
    pub lb_type: LoadBalancerType,

    /// Provider datacenter slug
    #[serde(alias = "dcslug")]
    pub region: String,

    /// Load balancer name
    pub name: String,

    /// Frontend listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend: Option<FrontendSpec>,

    /// ACL rules attached to the frontend
    #[serde(default)]
    pub acl_rules: Vec<AclRuleSpec>,

    /// Rules routing ACL matches to target groups
    #[serde(default)]
    pub advanced_routing_rules: Vec<RoutingRuleSpec>,

    /// Cluster port a network load balancer forwards to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_port: Option<u16>,
}

/// Desired frontend listener configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrontendSpec {
    /// Frontend name
    pub name: String,

    /// Listener protocol (http, https, tcp)
    pub protocol: String,

    /// Listener port
    pub port: u16,

    /// Balancing algorithm (roundrobin, leastconn)
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Redirect plain HTTP to HTTPS
    #[serde(default)]
    pub redirect_https: bool,

    /// Sticky sessions via cookie
    #[serde(default)]
    pub cookie: bool,

    /// Name of an uploaded SSL certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_name: Option<String>,
}

fn default_algorithm() -> String {
    "roundrobin".to_string()
}

/// Desired ACL rule
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AclRuleSpec {
    /// Rule name, unique within the load balancer
    pub name: String,

    /// Match condition (e.g. http_path_beg, hdr_dom)
    pub condition_type: String,

    /// Values matched by the condition
    #[serde(default)]
    pub value: Vec<String>,
}

/// Desired routing rule from an ACL match to a target group
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRuleSpec {
    /// Name of the ACL rule to match
    pub acl_name: String,

    /// Name of the target group receiving matched traffic
    pub target_group_name: String,

    /// Route when the ACL matches (false routes when it does not)
    #[serde(default = "default_true")]
    pub route_condition: bool,
}

/// Desired backend target group
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupSpec {
    /// Target group name, the identity used for drift reconciliation
    pub name: String,

    /// Backend protocol
    pub protocol: String,

    /// Backend port
    pub port: u16,

    /// Health check settings
    #[serde(default)]
    pub health_check: HealthCheckSpec,
}

/// Target group health check
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSpec {
    /// HTTP path requested by the health check
    #[serde(default = "default_health_path")]
    pub path: String,

    /// Health check protocol
    #[serde(default = "default_health_protocol")]
    pub protocol: String,

    /// Seconds between health checks
    #[serde(default = "default_interval")]
    pub interval: u32,

    /// Probe timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u32,

    /// Successes before a target is healthy
    #[serde(default = "default_threshold")]
    pub healthy_threshold: u32,

    /// Failures before a target is unhealthy
    #[serde(default = "default_threshold")]
    pub unhealthy_threshold: u32,
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        Self {
            path: default_health_path(),
            protocol: default_health_protocol(),
            interval: default_interval(),
            timeout: default_timeout(),
            healthy_threshold: default_threshold(),
            unhealthy_threshold: default_threshold(),
        }
    }
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_health_protocol() -> String {
    "http".to_string()
}

fn default_interval() -> u32 {
    30
}

fn default_timeout() -> u32 {
    5
}

fn default_threshold() -> u32 {
    3
}

/// FerryApplication lifecycle phase
///
/// Creation moves through `*Pending` to `*Created` per stage; a failed stage
/// parks in its `*Error` phase and is retried from there. Deletion phases
/// track teardown progress.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ApplicationPhase {
    /// Nothing has been created yet
    #[default]
    #[serde(rename = "")]
    New,
    /// Load balancer creation in flight
    #[serde(rename = "LB_PENDING")]
    LbPending,
    /// Load balancer exists
    #[serde(rename = "LB_CREATED")]
    LbCreated,
    /// Load balancer creation failed
    #[serde(rename = "LB_ERROR")]
    LbError,
    /// Target group creation in flight
    #[serde(rename = "TG_PENDING")]
    TgPending,
    /// All target groups exist
    #[serde(rename = "TG_CREATED")]
    TgCreated,
    /// Target group creation failed
    #[serde(rename = "TG_ERROR")]
    TgError,
    /// Attaching the load balancer to the cluster
    #[serde(rename = "LB_ATTACHMENT_PENDING")]
    LbAttachPending,
    /// Load balancer attached
    #[serde(rename = "LB_ATTACHMENT_CREATED")]
    LbAttachCreated,
    /// Load balancer attach failed
    #[serde(rename = "LB_ATTACHMENT_ERROR")]
    LbAttachError,
    /// Attaching target groups to the cluster
    #[serde(rename = "TG_ATTACHMENT_PENDING")]
    TgAttachPending,
    /// Target groups attached
    #[serde(rename = "TG_ATTACHMENT_CREATED")]
    TgAttachCreated,
    /// Target group attach failed
    #[serde(rename = "TG_ATTACHMENT_ERROR")]
    TgAttachError,
    /// Frontend creation in flight
    #[serde(rename = "FRONTEND_PENDING")]
    FrontendPending,
    /// Frontend exists
    #[serde(rename = "FRONTEND_CREATED")]
    FrontendCreated,
    /// Frontend creation failed
    #[serde(rename = "FRONTEND_ERROR")]
    FrontendError,
    /// ACL rules (or the network backend) being created
    #[serde(rename = "ACL_PENDING")]
    AclPending,
    /// ACL rules (or the network backend) exist
    #[serde(rename = "ACL_CREATED")]
    AclCreated,
    /// ACL rule creation failed
    #[serde(rename = "ACL_ERROR")]
    AclError,
    /// Fully converged; drift is reconciled on spec changes
    #[serde(rename = "RUNNING")]
    Running,
    /// Load balancer deletion in flight
    #[serde(rename = "LB_DELETION_PENDING")]
    LbDeletionPending,
    /// Load balancer deleted
    #[serde(rename = "LB_DELETED")]
    LbDeleted,
    /// Load balancer deletion failed
    #[serde(rename = "LB_DELETION_ERROR")]
    LbDeletionError,
    /// Target group deletion in flight
    #[serde(rename = "TG_DELETION_PENDING")]
    TgDeletionPending,
    /// Target groups deleted
    #[serde(rename = "TG_DELETED")]
    TgDeleted,
    /// Target group deletion failed
    #[serde(rename = "TG_DELETION_ERROR")]
    TgDeletionError,
}

impl ApplicationPhase {
    /// Whether this phase records a failed step
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ApplicationPhase::LbError
                | ApplicationPhase::TgError
                | ApplicationPhase::LbAttachError
                | ApplicationPhase::TgAttachError
                | ApplicationPhase::FrontendError
                | ApplicationPhase::AclError
                | ApplicationPhase::LbDeletionError
                | ApplicationPhase::TgDeletionError
        )
    }

    /// Whether this phase belongs to teardown
    pub fn is_deletion(&self) -> bool {
        matches!(
            self,
            ApplicationPhase::LbDeletionPending
                | ApplicationPhase::LbDeleted
                | ApplicationPhase::LbDeletionError
                | ApplicationPhase::TgDeletionPending
                | ApplicationPhase::TgDeleted
                | ApplicationPhase::TgDeletionError
        )
    }
}

impl std::fmt::Display for ApplicationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(s)) if !s.is_empty() => f.write_str(&s),
            _ => f.write_str("NEW"),
        }
    }
}

/// Observed state of a FerryApplication
///
/// Remote IDs are present only while the remote resource is believed to
/// exist. String fields serialize even when empty so a merge patch clears
/// them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FerryApplicationStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: ApplicationPhase,

    /// Provider ID of the load balancer
    #[serde(default, rename = "loadBalancerID")]
    pub load_balancer_id: String,

    /// Public address of the load balancer
    #[serde(default, rename = "loadBalancerIP")]
    pub load_balancer_ip: String,

    /// Provider ID of the frontend
    #[serde(default, rename = "frontendID")]
    pub frontend_id: String,

    /// Target group IDs, aligned with spec order at creation time
    #[serde(default, rename = "targetGroupIDs")]
    pub target_group_ids: Vec<String>,

    /// ACL rule IDs
    #[serde(default, rename = "aclRuleIDs")]
    pub acl_rule_ids: Vec<String>,

    /// Routing rule IDs
    #[serde(default, rename = "advancedRoutingRuleIDs")]
    pub advanced_routing_rule_ids: Vec<String>,

    /// Spec generation covered by the last completed pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Human-readable detail about the last failure
    #[serde(default)]
    pub message: String,

    /// RFC 3339 time of the last phase change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_serialize_to_wire_names() {
        let cases = [
            (ApplicationPhase::New, ""),
            (ApplicationPhase::LbAttachCreated, "LB_ATTACHMENT_CREATED"),
            (ApplicationPhase::TgAttachError, "TG_ATTACHMENT_ERROR"),
            (ApplicationPhase::Running, "RUNNING"),
            (ApplicationPhase::TgDeletionError, "TG_DELETION_ERROR"),
        ];
        for (phase, wire) in cases {
            assert_eq!(serde_json::to_value(phase).unwrap(), serde_json::json!(wire));
        }
    }

    #[test]
    fn phase_display_names_new_explicitly() {
        assert_eq!(ApplicationPhase::New.to_string(), "NEW");
        assert_eq!(ApplicationPhase::AclPending.to_string(), "ACL_PENDING");
    }

    #[test]
    fn spec_defaults_fill_optional_fields() {
        let spec: FerryApplicationSpec = serde_json::from_value(serde_json::json!({
            "loadBalancer": {"dcslug": "inmumbaizone2", "name": "lb1"},
            "targetGroups": [{"name": "tg1", "protocol": "http", "port": 80}]
        }))
        .unwrap();

        assert_eq!(spec.load_balancer.lb_type, LoadBalancerType::Application);
        assert_eq!(spec.load_balancer.region, "inmumbaizone2");
        assert!(spec.load_balancer.acl_rules.is_empty());
        assert_eq!(spec.target_groups[0].health_check, HealthCheckSpec::default());
    }

    #[test]
    fn empty_status_ids_still_serialize() {
        let value = serde_json::to_value(FerryApplicationStatus::default()).unwrap();
        assert_eq!(value["loadBalancerID"], serde_json::json!(""));
        assert_eq!(value["targetGroupIDs"], serde_json::json!([]));
        assert!(value.get("observedGeneration").is_none());
    }

    #[test]
    fn network_type_skips_target_groups() {
        assert!(LoadBalancerType::Application.uses_target_groups());
        assert!(!LoadBalancerType::Network.uses_target_groups());
    }

    #[test]
    fn error_and_deletion_phases_are_classified() {
        assert!(ApplicationPhase::FrontendError.is_error());
        assert!(!ApplicationPhase::FrontendPending.is_error());
        assert!(ApplicationPhase::LbDeleted.is_deletion());
        assert!(!ApplicationPhase::Running.is_deletion());
    }
}
