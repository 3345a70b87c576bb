//! Error types for the ferry operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Remote API failures carry a typed [`CloudErrorKind`] so that controllers
//! branch on the kind of failure rather than on vendor message text.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Requeue delay used when the provider reports capacity is unavailable
pub const UNAVAILABLE_REQUEUE: Duration = Duration::from_secs(30);

/// Classification of a failed remote API call.
///
/// The first four kinds are idempotent-success sentinels: the desired effect
/// already holds, and callers decide per operation whether to treat them as
/// success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloudErrorKind {
    /// A resource with the same identity already exists
    AlreadyExists,
    /// The resource is already attached to the target cluster
    AlreadyAttached,
    /// The resource was already deleted
    AlreadyDeleted,
    /// An identical rule already exists
    DuplicateEntry,
    /// The referenced resource does not exist (or is not visible)
    NotFound,
    /// The provider cannot currently allocate resources at the location
    Unavailable,
    /// Credentials were rejected
    Unauthorized,
    /// The provider rejected the request parameters
    InvalidRequest,
    /// Network failure, throttling or a server-side error
    Transient,
}

impl CloudErrorKind {
    /// Whether this kind of failure can succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CloudErrorKind::Unauthorized | CloudErrorKind::InvalidRequest)
    }

    /// Whether this kind means the resource is gone, for delete operations
    pub fn is_gone(&self) -> bool {
        matches!(self, CloudErrorKind::AlreadyDeleted | CloudErrorKind::NotFound)
    }
}

impl fmt::Display for CloudErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloudErrorKind::AlreadyExists => "already exists",
            CloudErrorKind::AlreadyAttached => "already attached",
            CloudErrorKind::AlreadyDeleted => "already deleted",
            CloudErrorKind::DuplicateEntry => "duplicate entry",
            CloudErrorKind::NotFound => "not found",
            CloudErrorKind::Unavailable => "unavailable",
            CloudErrorKind::Unauthorized => "unauthorized",
            CloudErrorKind::InvalidRequest => "invalid request",
            CloudErrorKind::Transient => "transient",
        };
        f.write_str(s)
    }
}

/// Error returned by a remote API capability
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct CloudError {
    /// Classified failure kind
    pub kind: CloudErrorKind,
    /// Message reported by the provider (or the transport)
    pub message: String,
}

impl CloudError {
    /// Create an error of the given kind
    pub fn new(kind: CloudErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(CloudErrorKind::Transient, message)
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(CloudErrorKind::NotFound, message)
    }

    /// Check the error kind
    pub fn is(&self, kind: CloudErrorKind) -> bool {
        self.kind == kind
    }
}

/// Main error type for ferry operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Remote networking API error
    #[error("cloud error during {operation} for {resource}: {source}")]
    Cloud {
        /// Name of the resource being reconciled
        resource: String,
        /// Capability operation that failed (e.g. "create_target_group")
        operation: String,
        /// Classified provider error
        #[source]
        source: CloudError,
    },

    /// Validation error for CRD specs
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.loadBalancer.frontend.port")
        field: Option<String>,
    },

    /// An action needs an ID that an earlier phase should have recorded
    #[error("missing dependency for {resource}: no {dependency} in status")]
    MissingDependency {
        /// Name of the resource being reconciled
        resource: String,
        /// The absent status field (e.g. "load balancer id")
        dependency: String,
    },

    /// The invocation was cancelled before the step finished
    #[error("reconcile cancelled during {context}")]
    Cancelled {
        /// Step that was running when cancellation arrived
        context: String,
    },

    /// The invocation deadline elapsed before the step finished
    #[error("reconcile deadline of {after:?} exceeded during {context}")]
    DeadlineExceeded {
        /// Step that was running when the deadline passed
        context: String,
        /// The configured invocation timeout
        after: Duration,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "controller")
        context: String,
    },
}

impl Error {
    /// Create a validation error with resource context and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Wrap a remote API error with the operation that produced it
    pub fn cloud_for(
        resource: impl Into<String>,
        operation: impl Into<String>,
        source: CloudError,
    ) -> Self {
        Self::Cloud {
            resource: resource.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a missing-dependency error
    pub fn missing_dependency(resource: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::MissingDependency {
            resource: resource.into(),
            dependency: dependency.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Create a deadline error
    pub fn deadline_exceeded(context: impl Into<String>, after: Duration) -> Self {
        Self::DeadlineExceeded {
            context: context.into(),
            after,
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and missing-dependency errors need the object to
    /// change before a retry can succeed. Cloud errors depend on their kind.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // Retry on transient K8s errors (connection, timeout)
                // Don't retry on 4xx errors except conflicts
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
                )
            }
            Error::Cloud { source, .. } => source.kind.is_retryable(),
            Error::Validation { .. } => false,
            Error::MissingDependency { .. } => false,
            Error::Cancelled { .. } => true,
            Error::DeadlineExceeded { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Fixed requeue delay requested by the error, overriding backoff
    pub fn requeue_hint(&self) -> Option<Duration> {
        match self {
            Error::Cloud { source, .. } if source.is(CloudErrorKind::Unavailable) => {
                Some(UNAVAILABLE_REQUEUE)
            }
            _ => None,
        }
    }

    /// The classified remote error kind, if this is a cloud error
    pub fn cloud_kind(&self) -> Option<CloudErrorKind> {
        match self {
            Error::Cloud { source, .. } => Some(source.kind),
            _ => None,
        }
    }

    /// Whether the invocation was interrupted rather than failing
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Cancelled { .. } | Error::DeadlineExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Classification During Convergence
    // ==========================================================================

    /// Story: a user applies a load balancer without a region
    ///
    /// Validation catches it before any remote call and the error is never
    /// retried, because nothing changes until the user edits the spec.
    #[test]
    fn story_validation_errors_are_not_retried() {
        let err = Error::validation_for_field("web", "spec.loadBalancer.region", "must be set");
        assert!(err.to_string().contains("validation error for web"));
        assert!(!err.is_retryable());

        match err {
            Error::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("spec.loadBalancer.region"))
            }
            _ => panic!("Expected Validation variant"),
        }
    }

    /// Story: the target group call times out at the provider
    #[test]
    fn story_transient_cloud_errors_are_retried() {
        let err = Error::cloud_for(
            "web",
            "create_target_group",
            CloudError::transient("502 bad gateway"),
        );
        assert!(err.to_string().contains("create_target_group"));
        assert!(err.to_string().contains("transient: 502 bad gateway"));
        assert_eq!(err.cloud_kind(), Some(CloudErrorKind::Transient));
        assert!(err.is_retryable());
        assert_eq!(err.requeue_hint(), None);
    }

    /// Story: the provider cannot allocate a load balancer in the region
    #[test]
    fn story_unavailable_capacity_requests_longer_requeue() {
        let err = Error::cloud_for(
            "web",
            "create_load_balancer",
            CloudError::new(CloudErrorKind::Unavailable, "come back later"),
        );
        assert!(err.is_retryable());
        assert_eq!(err.requeue_hint(), Some(UNAVAILABLE_REQUEUE));
    }

    /// Story: an attach runs before the load balancer ID was recorded
    #[test]
    fn story_missing_dependency_is_a_precondition_failure() {
        let err = Error::missing_dependency("web", "load balancer id");
        assert_eq!(
            err.to_string(),
            "missing dependency for web: no load balancer id in status"
        );
        assert!(!err.is_retryable());
    }

    /// Story: rejected credentials stop retries
    #[test]
    fn story_unauthorized_is_permanent() {
        let err = Error::cloud_for(
            "web",
            "list_target_groups",
            CloudError::new(CloudErrorKind::Unauthorized, "invalid api key"),
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn interruption_errors_carry_context() {
        let err = Error::cancelled("attach_load_balancer");
        assert!(err.is_interrupted());
        assert!(err.to_string().contains("attach_load_balancer"));

        let err = Error::deadline_exceeded("create_frontend", Duration::from_secs(120));
        assert!(err.is_interrupted());
        assert!(err.to_string().contains("120s"));

        assert!(!Error::internal("boom").is_interrupted());
    }

    #[test]
    fn gone_kinds_cover_deleted_and_not_found() {
        assert!(CloudErrorKind::AlreadyDeleted.is_gone());
        assert!(CloudErrorKind::NotFound.is_gone());
        assert!(!CloudErrorKind::AlreadyExists.is_gone());
        assert!(!CloudErrorKind::Transient.is_gone());
    }

    #[test]
    fn kube_conflicts_are_retryable() {
        let conflict = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        });
        assert!(Error::from(conflict).is_retryable());

        let forbidden = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        assert!(!Error::from(forbidden).is_retryable());
    }
}
