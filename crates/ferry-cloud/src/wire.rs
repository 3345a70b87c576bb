//! Typed provider response bodies
//!
//! The provider sends numbers and flags as strings ("80", "1") and sometimes
//! as JSON numbers, so scalar fields go through the lenient deserializers
//! below. Absent or null fields take their default; anything else that does
//! not parse is an error.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{Number, Value};

use ferry_common::CloudError;

use crate::api::CloudResult;
use crate::types::{FrontendRecord, LoadBalancerRecord, TargetGroupParams, TargetGroupRecord};

/// Certificate ID the provider uses for "no certificate"
pub const NO_CERTIFICATE: &str = "0";

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Null => Ok(String::new()),
        Scalar::String(s) => Ok(s),
        Scalar::Number(n) => Ok(n.to_string()),
        Scalar::Bool(b) => Err(de::Error::custom(format!(
            "expected a string or number, got {b}"
        ))),
    }
}

fn number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64> + Default,
{
    let raw = match Scalar::deserialize(deserializer)? {
        Scalar::Null => return Ok(T::default()),
        Scalar::Number(n) => n
            .as_u64()
            .ok_or_else(|| de::Error::custom(format!("{n} is not an unsigned integer")))?,
        Scalar::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(T::default());
            }
            trimmed
                .parse::<u64>()
                .map_err(|_| de::Error::custom(format!("'{s}' is not an unsigned integer")))?
        }
        Scalar::Bool(b) => return Err(de::Error::custom(format!("expected a number, got {b}"))),
    };
    T::try_from(raw).map_err(|_| de::Error::custom(format!("{raw} is out of range")))
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Scalar::deserialize(deserializer)? {
        Scalar::Null => Ok(false),
        Scalar::Bool(b) => Ok(b),
        Scalar::Number(n) => match n.as_u64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(de::Error::custom(format!("{n} is not a flag"))),
        },
        Scalar::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "enable" | "on" => Ok(true),
            "" | "0" | "false" | "disable" | "off" => Ok(false),
            _ => Err(de::Error::custom(format!("'{s}' is not a flag"))),
        },
    }
}

/// Decode a successful response body into `T`
pub(crate) fn decode<T: DeserializeOwned>(operation: &str, value: Value) -> CloudResult<T> {
    serde_json::from_value(value).map_err(|e| {
        CloudError::transient(format!("malformed {operation} response: {e}"))
    })
}

/// Body of a create call; the provider names the new ID differently per resource
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Created {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "loadbalancerid", deserialize_with = "string_or_number")]
    pub load_balancer_id: String,
    #[serde(rename = "frontendid", deserialize_with = "string_or_number")]
    pub frontend_id: String,
    #[serde(rename = "targetgroupid", deserialize_with = "string_or_number")]
    pub target_group_id: String,
    #[serde(rename = "backendid", deserialize_with = "string_or_number")]
    pub backend_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub ip: String,
}

impl Created {
    /// The first non-empty candidate, or an error naming the operation
    pub(crate) fn require(operation: &str, candidates: &[&str]) -> CloudResult<String> {
        candidates
            .iter()
            .find(|id| !id.is_empty())
            .map(|id| id.to_string())
            .ok_or_else(|| CloudError::transient(format!("{operation} response carried no id")))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoadBalancerList {
    #[serde(default)]
    loadbalancers: Vec<LoadBalancerEntry>,
}

#[derive(Debug, Deserialize)]
struct LoadBalancerEntry {
    #[serde(default, deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    frontends: Vec<FrontendEntry>,
}

#[derive(Debug, Deserialize)]
struct FrontendEntry {
    #[serde(default, deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default, alias = "protocol")]
    proto: String,
    #[serde(default, deserialize_with = "number")]
    port: u16,
    #[serde(default)]
    algorithm: String,
    #[serde(default, deserialize_with = "flag")]
    redirecthttps: bool,
    #[serde(default, deserialize_with = "flag")]
    cookie: bool,
    #[serde(default, deserialize_with = "string_or_number")]
    certificate_id: String,
}

impl From<FrontendEntry> for FrontendRecord {
    fn from(fe: FrontendEntry) -> Self {
        let certificate_id =
            Some(fe.certificate_id).filter(|c| !c.is_empty() && c != NO_CERTIFICATE);
        Self {
            id: fe.id,
            name: fe.name,
            protocol: fe.proto,
            port: fe.port,
            algorithm: fe.algorithm,
            redirect_https: fe.redirecthttps,
            cookie: fe.cookie,
            certificate_id,
        }
    }
}

impl LoadBalancerList {
    /// The single load balancer a read returns
    pub(crate) fn into_record(self, id: &str) -> CloudResult<LoadBalancerRecord> {
        let lb = self
            .loadbalancers
            .into_iter()
            .next()
            .ok_or_else(|| CloudError::not_found(format!("load balancer {id} not found")))?;
        Ok(LoadBalancerRecord {
            id: lb.id,
            name: lb.name,
            ip: lb.ip,
            frontends: lb.frontends.into_iter().map(FrontendRecord::from).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TargetGroupList {
    #[serde(default)]
    targetgroups: Vec<TargetGroupEntry>,
}

#[derive(Debug, Deserialize)]
struct TargetGroupEntry {
    #[serde(default, deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    protocol: String,
    #[serde(default, deserialize_with = "number")]
    port: u16,
    #[serde(default)]
    health_check_path: String,
    #[serde(default)]
    health_check_protocol: String,
    #[serde(default, deserialize_with = "number")]
    health_check_interval: u32,
    #[serde(default, deserialize_with = "number")]
    health_check_timeout: u32,
    #[serde(default, deserialize_with = "number")]
    healthy_threshold: u32,
    #[serde(default, deserialize_with = "number")]
    unhealthy_threshold: u32,
}

impl TargetGroupList {
    pub(crate) fn into_records(self) -> Vec<TargetGroupRecord> {
        self.targetgroups
            .into_iter()
            .map(|tg| TargetGroupRecord {
                id: tg.id,
                config: TargetGroupParams {
                    name: tg.name,
                    protocol: tg.protocol,
                    port: tg.port,
                    health_check_path: tg.health_check_path,
                    health_check_protocol: tg.health_check_protocol,
                    health_check_interval: tg.health_check_interval,
                    health_check_timeout: tg.health_check_timeout,
                    healthy_threshold: tg.healthy_threshold,
                    unhealthy_threshold: tg.unhealthy_threshold,
                },
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CertificateList {
    #[serde(default)]
    certificates: Vec<CertificateEntry>,
}

#[derive(Debug, Deserialize)]
struct CertificateEntry {
    #[serde(default, deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    name: String,
}

impl CertificateList {
    pub(crate) fn find(&self, name: &str) -> Option<String> {
        self.certificates
            .iter()
            .find(|cert| cert.name == name)
            .map(|cert| cert.id.clone())
            .filter(|id| !id.is_empty())
    }
}
