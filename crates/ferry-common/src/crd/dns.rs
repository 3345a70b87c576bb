//! FerryDomain CRD: a hosted DNS zone and the records it serves

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// FerryDomain declares a domain and its records.
///
/// Example:
/// ```yaml
/// apiVersion: ferry.dev/v1alpha1
/// kind: FerryDomain
/// metadata:
///   name: example
/// spec:
///   domain: example.com
///   records:
///     - hostname: www
///       type: A
///       ttl: 300
///       value: 203.0.113.10
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ferry.dev",
    version = "v1alpha1",
    kind = "FerryDomain",
    namespaced,
    status = "FerryDomainStatus",
    shortname = "fdns",
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".spec.domain"}"#,
    printcolumn = r#"{"name":"Records","type":"integer","jsonPath":".status.recordCount"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FerryDomainSpec {
    /// Zone apex, e.g. "example.com"
    pub domain: String,

    /// Records served by the zone
    #[serde(default)]
    pub records: Vec<DnsRecordSpec>,
}

/// A single DNS record
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordSpec {
    /// Host label relative to the domain ("@" for the apex)
    pub hostname: String,

    /// Record type (A, AAAA, CNAME, MX, TXT, SRV, CAA, NS)
    #[serde(rename = "type")]
    pub record_type: String,

    /// Time to live in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Record data
    pub value: String,

    /// Priority (MX and SRV)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,

    /// Target port (SRV)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Transport protocol (SRV), e.g. "tcp"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_type: Option<String>,

    /// Relative weight (SRV)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

fn default_ttl() -> u32 {
    3600
}

/// FerryDomain lifecycle phase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum DnsPhase {
    /// Nothing has been created yet
    #[default]
    #[serde(rename = "")]
    New,
    /// Domain creation in flight
    #[serde(rename = "DOMAIN_PENDING")]
    DomainPending,
    /// Domain exists
    #[serde(rename = "DOMAIN_CREATED")]
    DomainCreated,
    /// Domain creation failed
    #[serde(rename = "DOMAIN_ERROR")]
    DomainError,
    /// Record creation in flight
    #[serde(rename = "RECORDS_PENDING")]
    RecordsPending,
    /// All records exist
    #[serde(rename = "RECORDS_CREATED")]
    RecordsCreated,
    /// Record creation failed
    #[serde(rename = "RECORDS_ERROR")]
    RecordsError,
    /// Fully converged
    #[serde(rename = "RUNNING")]
    Running,
    /// Teardown in flight
    #[serde(rename = "DELETION_PENDING")]
    DeletionPending,
    /// Records deleted, domain deletion remains
    #[serde(rename = "RECORDS_DELETED")]
    RecordsDeleted,
    /// Teardown failed
    #[serde(rename = "DELETION_ERROR")]
    DeletionError,
}

/// Observed state of a FerryDomain
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FerryDomainStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: DnsPhase,

    /// Provider IDs of created records
    #[serde(default)]
    pub record_ids: Vec<String>,

    /// Number of records served
    #[serde(default)]
    pub record_count: u32,

    /// Spec generation covered by the last completed pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Human-readable detail about the last failure
    #[serde(default)]
    pub message: String,
}
