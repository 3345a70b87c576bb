//! Capability traits consumed by the reconcilers
//!
//! Each method returns a [`CloudError`] whose kind tells the caller whether
//! the failure is an idempotent success (already exists, already attached,
//! already deleted, duplicate entry), a missing resource, or a real failure.
//! Implementations never decide that on the caller's behalf.

use async_trait::async_trait;
use ferry_common::CloudError;

use crate::types::{
    AclRuleParams, BackendParams, CreatedLoadBalancer, DnsRecordParams, FrontendParams,
    FrontendRecord, LoadBalancerParams, LoadBalancerRecord, RoutingRuleParams, TargetGroupParams,
    TargetGroupRecord,
};

/// Result alias for capability calls
pub type CloudResult<T> = Result<T, CloudError>;

/// Load balancer, frontend, target group and ACL operations
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// Create a load balancer
    async fn create_load_balancer(
        &self,
        params: &LoadBalancerParams,
    ) -> CloudResult<CreatedLoadBalancer>;

    /// Read a load balancer and its frontends
    async fn read_load_balancer(&self, id: &str) -> CloudResult<LoadBalancerRecord>;

    /// Delete a load balancer along with its frontends, ACLs and routes
    async fn delete_load_balancer(&self, id: &str) -> CloudResult<()>;

    /// Create a frontend on a load balancer
    async fn create_frontend(&self, lb_id: &str, params: &FrontendParams) -> CloudResult<String>;

    /// Read one frontend
    async fn read_frontend(&self, lb_id: &str, frontend_id: &str) -> CloudResult<FrontendRecord>;

    /// Replace a frontend's configuration
    async fn update_frontend(
        &self,
        lb_id: &str,
        frontend_id: &str,
        params: &FrontendParams,
    ) -> CloudResult<()>;

    /// Create a target group
    async fn create_target_group(&self, params: &TargetGroupParams) -> CloudResult<String>;

    /// List every target group visible to the account
    async fn list_target_groups(&self) -> CloudResult<Vec<TargetGroupRecord>>;

    /// Replace a target group's configuration
    async fn update_target_group(&self, id: &str, params: &TargetGroupParams) -> CloudResult<()>;

    /// Delete a target group
    async fn delete_target_group(&self, id: &str, name: &str) -> CloudResult<()>;

    /// Create an ACL rule on a frontend
    async fn create_acl_rule(
        &self,
        lb_id: &str,
        frontend_id: &str,
        params: &AclRuleParams,
    ) -> CloudResult<String>;

    /// Delete an ACL rule
    async fn delete_acl_rule(&self, lb_id: &str, acl_id: &str) -> CloudResult<()>;

    /// Create a routing rule
    async fn create_routing_rule(
        &self,
        lb_id: &str,
        params: &RoutingRuleParams,
    ) -> CloudResult<String>;

    /// Delete a routing rule
    async fn delete_routing_rule(&self, lb_id: &str, rule_id: &str) -> CloudResult<()>;

    /// Create the cluster backend of a network load balancer
    async fn create_backend(&self, lb_id: &str, params: &BackendParams) -> CloudResult<String>;

    /// Attach a load balancer to a compute cluster
    async fn attach_load_balancer(&self, lb_id: &str, cluster_id: &str) -> CloudResult<()>;

    /// Attach a target group to a compute cluster
    async fn attach_target_group(&self, tg_id: &str, cluster_id: &str) -> CloudResult<()>;

    /// Resolve an uploaded certificate's ID by name
    async fn lookup_certificate_id(&self, name: &str) -> CloudResult<String>;
}

/// Hosted DNS zone operations
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Create a zone
    async fn create_domain(&self, domain: &str) -> CloudResult<()>;

    /// Delete a zone
    async fn delete_domain(&self, domain: &str) -> CloudResult<()>;

    /// Create a record in a zone
    async fn create_record(&self, domain: &str, params: &DnsRecordParams) -> CloudResult<String>;

    /// Delete a record from a zone
    async fn delete_record(&self, domain: &str, record_id: &str) -> CloudResult<()>;
}
