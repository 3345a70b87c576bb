//! Mapping of provider error messages to [`CloudErrorKind`]
//!
//! The provider reports idempotent conditions only through human-readable
//! messages. This is the one place those strings are known; everything
//! downstream switches on the kind.

use ferry_common::CloudErrorKind;
use reqwest::{Method, StatusCode};

const TARGET_GROUP_EXISTS: &str =
    "Target Group with same name already in your account, Please provide different name.";
const TARGET_GROUP_ATTACHED: &str = "Requested Target group already part of this Cluster.";
const LOAD_BALANCER_ATTACHED: &str = "Requested Load balancer already part of this Cluster.";
const DUPLICATE_ENTRY: &str = "Duplicate Entry";
const LOAD_BALANCER_MISSING: &str =
    "Sorry we unable to find this load balancer or you dont have access!";
const TARGET_GROUP_MISSING: &str = "Permission Denied, Possible reason not resource not exists.";
const ACL_MISSING: &str = "ACL ID Not Found";
const ROUTING_RULE_EXISTS: &str =
    "A routing rule with the same lbid, acl_id, and backend_id already exists.";
const CAPACITY_UNAVAILABLE: &str = "Sorry but due to some network resources unvaiable on this location we unable to deploy your cloud, Please come back after sometime";
const DOMAIN_EXISTS_FRAGMENT: &str = "already exits in dns zones";

/// Classify a failed call from its method, HTTP status and provider message
pub fn classify(method: &Method, status: StatusCode, message: &str) -> CloudErrorKind {
    let message = message.trim();
    let deleting = method == Method::DELETE;

    match message {
        TARGET_GROUP_EXISTS | ROUTING_RULE_EXISTS => return CloudErrorKind::AlreadyExists,
        TARGET_GROUP_ATTACHED | LOAD_BALANCER_ATTACHED => return CloudErrorKind::AlreadyAttached,
        DUPLICATE_ENTRY => return CloudErrorKind::DuplicateEntry,
        LOAD_BALANCER_MISSING | TARGET_GROUP_MISSING if deleting => {
            return CloudErrorKind::AlreadyDeleted
        }
        LOAD_BALANCER_MISSING | TARGET_GROUP_MISSING | ACL_MISSING => {
            return CloudErrorKind::NotFound
        }
        CAPACITY_UNAVAILABLE => return CloudErrorKind::Unavailable,
        _ => {}
    }

    let lower = message.to_lowercase();
    if lower.contains(DOMAIN_EXISTS_FRAGMENT) || lower.contains("already exists") {
        return CloudErrorKind::AlreadyExists;
    }
    if lower.contains("not found") || lower.contains("does not exist") {
        return CloudErrorKind::NotFound;
    }

    match status {
        StatusCode::NOT_FOUND => CloudErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CloudErrorKind::Unauthorized,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            CloudErrorKind::InvalidRequest
        }
        _ => CloudErrorKind::Transient,
    }
}
