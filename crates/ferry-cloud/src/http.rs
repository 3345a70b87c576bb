//! REST client for the provider's v2 networking and DNS API
//!
//! Requests carry a bearer API key. Responses share an envelope of
//! `{"status": "success" | "error", "message": ...}` next to the payload;
//! numeric and boolean fields are sent as strings ("80", "1"/"0") and may
//! come back as either strings or numbers.

use std::time::Duration;

use async_trait::async_trait;
use ferry_common::{CloudError, CloudErrorKind};
use reqwest::{Method, Url};
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::api::{CloudResult, DnsApi, LoadBalancerApi};
use crate::classify::classify;
use crate::types::{
    AclRuleParams, BackendParams, CreatedLoadBalancer, DnsRecordParams, FrontendParams,
    FrontendRecord, LoadBalancerParams, LoadBalancerRecord, RoutingRuleParams, TargetGroupParams,
    TargetGroupRecord,
};
use crate::wire::{decode, CertificateList, Created, LoadBalancerList, TargetGroupList, NO_CERTIFICATE};

/// Default API endpoint
pub const DEFAULT_API_URL: &str = "https://api.utho.com/v2/";

/// HTTP implementation of [`LoadBalancerApi`] and [`DnsApi`]
#[derive(Clone)]
pub struct HttpCloudClient {
    http: reqwest::Client,
    base: Url,
    api_key: String,
}

impl std::fmt::Debug for HttpCloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCloudClient")
            .field("base", &self.base.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpCloudClient {
    /// Create a client for `base_url` authenticating with `api_key`
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> CloudResult<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| {
            CloudError::new(CloudErrorKind::InvalidRequest, format!("invalid api url: {e}"))
        })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ferry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CloudError::transient(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base,
            api_key: api_key.into(),
        })
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> CloudResult<Value> {
        let url = self.base.join(path).map_err(|e| {
            CloudError::new(CloudErrorKind::InvalidRequest, format!("invalid path {path}: {e}"))
        })?;
        trace!(%method, %url, "provider request");

        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.api_key);
        if let Some(ref body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CloudError::transient(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CloudError::transient(format!("failed to read response: {e}")))?;
        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        let envelope_error = value.get("status").and_then(Value::as_str) == Some("error");
        if status.is_success() && !envelope_error {
            return Ok(value);
        }

        let message = match &value {
            Value::String(s) => s.clone(),
            other => other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string()),
        };
        let kind = classify(&method, status, &message);
        debug!(%method, path, %status, ?kind, message = %message, "provider call failed");
        Err(CloudError::new(kind, message))
    }

    async fn get(&self, path: &str) -> CloudResult<Value> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> CloudResult<Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> CloudResult<Value> {
        self.send(Method::PUT, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> CloudResult<Value> {
        self.send(Method::DELETE, path, None).await
    }

    async fn create(&self, operation: &str, path: &str, body: Value) -> CloudResult<Created> {
        decode(operation, self.post(path, body).await?)
    }
}

#[async_trait]
impl LoadBalancerApi for HttpCloudClient {
    async fn create_load_balancer(
        &self,
        params: &LoadBalancerParams,
    ) -> CloudResult<CreatedLoadBalancer> {
        let body = json!({
            "dcslug": params.region,
            "type": params.lb_type,
            "name": params.name,
        });
        let created = self.create("create_load_balancer", "loadbalancer", body).await?;
        Ok(CreatedLoadBalancer {
            id: Created::require(
                "create_load_balancer",
                &[&created.load_balancer_id, &created.id],
            )?,
            ip: created.ip,
        })
    }

    async fn read_load_balancer(&self, id: &str) -> CloudResult<LoadBalancerRecord> {
        let value = self.get(&format!("loadbalancer/{id}")).await?;
        decode::<LoadBalancerList>("read_load_balancer", value)?.into_record(id)
    }

    async fn delete_load_balancer(&self, id: &str) -> CloudResult<()> {
        self.delete(&format!("loadbalancer/{id}")).await.map(drop)
    }

    async fn create_frontend(&self, lb_id: &str, params: &FrontendParams) -> CloudResult<String> {
        let created = self
            .create(
                "create_frontend",
                &format!("loadbalancer/{lb_id}/frontend"),
                frontend_body(params),
            )
            .await?;
        Created::require("create_frontend", &[&created.id, &created.frontend_id])
    }

    async fn read_frontend(&self, lb_id: &str, frontend_id: &str) -> CloudResult<FrontendRecord> {
        let lb = self.read_load_balancer(lb_id).await?;
        lb.frontends
            .into_iter()
            .find(|fe| fe.id == frontend_id)
            .ok_or_else(|| CloudError::not_found(format!("frontend {frontend_id} not found")))
    }

    async fn update_frontend(
        &self,
        lb_id: &str,
        frontend_id: &str,
        params: &FrontendParams,
    ) -> CloudResult<()> {
        self.put(
            &format!("loadbalancer/{lb_id}/frontend/{frontend_id}"),
            frontend_body(params),
        )
        .await
        .map(drop)
    }

    async fn create_target_group(&self, params: &TargetGroupParams) -> CloudResult<String> {
        let created = self
            .create("create_target_group", "targetgroup", target_group_body(params))
            .await?;
        Created::require("create_target_group", &[&created.id, &created.target_group_id])
    }

    async fn list_target_groups(&self) -> CloudResult<Vec<TargetGroupRecord>> {
        let value = self.get("targetgroup").await?;
        Ok(decode::<TargetGroupList>("list_target_groups", value)?.into_records())
    }

    async fn update_target_group(&self, id: &str, params: &TargetGroupParams) -> CloudResult<()> {
        self.put(&format!("targetgroup/{id}"), target_group_body(params))
            .await
            .map(drop)
    }

    async fn delete_target_group(&self, id: &str, name: &str) -> CloudResult<()> {
        self.delete(&format!("targetgroup/{id}?name={name}"))
            .await
            .map(drop)
    }

    async fn create_acl_rule(
        &self,
        lb_id: &str,
        frontend_id: &str,
        params: &AclRuleParams,
    ) -> CloudResult<String> {
        let body = json!({
            "name": params.name,
            "conditions": params.condition_type,
            "frontend_id": frontend_id,
            "value": acl_value(frontend_id, params),
        });
        let created = self
            .create("create_acl_rule", &format!("loadbalancer/{lb_id}/acl"), body)
            .await?;
        Created::require("create_acl_rule", &[&created.id])
    }

    async fn delete_acl_rule(&self, lb_id: &str, acl_id: &str) -> CloudResult<()> {
        self.delete(&format!("loadbalancer/{lb_id}/acl/{acl_id}"))
            .await
            .map(drop)
    }

    async fn create_routing_rule(
        &self,
        lb_id: &str,
        params: &RoutingRuleParams,
    ) -> CloudResult<String> {
        let body = json!({
            "acl_id": params.acl_id,
            "backend_id": params.target_group_id,
            "route_condition": flag(params.route_condition),
        });
        let created = self
            .create("create_routing_rule", &format!("loadbalancer/{lb_id}/route"), body)
            .await?;
        Created::require("create_routing_rule", &[&created.id])
    }

    async fn delete_routing_rule(&self, lb_id: &str, rule_id: &str) -> CloudResult<()> {
        self.delete(&format!("loadbalancer/{lb_id}/route/{rule_id}"))
            .await
            .map(drop)
    }

    async fn create_backend(&self, lb_id: &str, params: &BackendParams) -> CloudResult<String> {
        let body = json!({
            "frontend_id": params.frontend_id,
            "cloudid": params.cluster_id,
            "backend_port": params.backend_port.to_string(),
        });
        let created = self
            .create("create_backend", &format!("loadbalancer/{lb_id}/backend"), body)
            .await?;
        Ok(if created.id.is_empty() {
            created.backend_id
        } else {
            created.id
        })
    }

    async fn attach_load_balancer(&self, lb_id: &str, cluster_id: &str) -> CloudResult<()> {
        self.post(
            &format!("kubernetes/{cluster_id}/loadbalancer"),
            json!({ "loadbalancerid": lb_id }),
        )
        .await
        .map(drop)
    }

    async fn attach_target_group(&self, tg_id: &str, cluster_id: &str) -> CloudResult<()> {
        self.post(
            &format!("kubernetes/{cluster_id}/targetgroup"),
            json!({ "targetgroupid": tg_id }),
        )
        .await
        .map(drop)
    }

    async fn lookup_certificate_id(&self, name: &str) -> CloudResult<String> {
        let value = self.get("certificates").await?;
        decode::<CertificateList>("lookup_certificate_id", value)?
            .find(name)
            .ok_or_else(|| CloudError::not_found(format!("certificate {name} not found")))
    }
}

#[async_trait]
impl DnsApi for HttpCloudClient {
    async fn create_domain(&self, domain: &str) -> CloudResult<()> {
        self.post("dns/adddomain", json!({ "domain": domain }))
            .await
            .map(drop)
    }

    async fn delete_domain(&self, domain: &str) -> CloudResult<()> {
        self.delete(&format!("dns/{domain}/delete")).await.map(drop)
    }

    async fn create_record(&self, domain: &str, params: &DnsRecordParams) -> CloudResult<String> {
        let body = json!({
            "type": params.record_type,
            "hostname": params.hostname,
            "value": params.value,
            "ttl": params.ttl.to_string(),
            "porttype": params.port_type,
            "port": params.port.to_string(),
            "priority": params.priority.to_string(),
            "wight": params.weight.to_string(),
        });
        let created = self
            .create("create_record", &format!("dns/{domain}/record/add"), body)
            .await?;
        Created::require("create_record", &[&created.id])
    }

    async fn delete_record(&self, domain: &str, record_id: &str) -> CloudResult<()> {
        self.delete(&format!("dns/{domain}/record/{record_id}/delete"))
            .await
            .map(drop)
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn frontend_body(params: &FrontendParams) -> Value {
    json!({
        "name": params.name,
        "proto": params.protocol,
        "port": params.port.to_string(),
        "algorithm": params.algorithm,
        "redirecthttps": flag(params.redirect_https),
        "cookie": flag(params.cookie),
        "certificate_id": params.certificate_id.as_deref().unwrap_or(NO_CERTIFICATE),
    })
}

fn target_group_body(params: &TargetGroupParams) -> Value {
    json!({
        "name": params.name,
        "protocol": params.protocol,
        "port": params.port.to_string(),
        "health_check_path": params.health_check_path,
        "health_check_protocol": params.health_check_protocol,
        "health_check_interval": params.health_check_interval.to_string(),
        "health_check_timeout": params.health_check_timeout.to_string(),
        "healthy_threshold": params.healthy_threshold.to_string(),
        "unhealthy_threshold": params.unhealthy_threshold.to_string(),
    })
}

/// ACL values are a JSON document embedded as a string
fn acl_value(frontend_id: &str, params: &AclRuleParams) -> String {
    json!({
        "frontend_id": frontend_id,
        "type": params.condition_type,
        "data": params.value,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_normalizes_base_url() {
        let client =
            HttpCloudClient::new("https://api.example.test/v2", "key", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            client.base.join("loadbalancer").unwrap().as_str(),
            "https://api.example.test/v2/loadbalancer"
        );
        assert!(!format!("{client:?}").contains("key"));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = HttpCloudClient::new("not a url", "key", Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.kind, CloudErrorKind::InvalidRequest);
    }

    #[test]
    fn frontend_body_uses_string_flags_and_certificate_fallback() {
        let params = FrontendParams {
            name: "fe".to_string(),
            protocol: "http".to_string(),
            port: 80,
            algorithm: "roundrobin".to_string(),
            redirect_https: true,
            cookie: false,
            certificate_id: None,
        };
        let body = frontend_body(&params);
        assert_eq!(body["port"], json!("80"));
        assert_eq!(body["redirecthttps"], json!("1"));
        assert_eq!(body["cookie"], json!("0"));
        assert_eq!(body["certificate_id"], json!("0"));
    }

    #[test]
    fn acl_value_embeds_frontend_id() {
        let params = AclRuleParams {
            name: "api".to_string(),
            condition_type: "http_path_beg".to_string(),
            value: vec!["/api".to_string()],
        };
        let value: Value = serde_json::from_str(&acl_value("fe-1", &params)).unwrap();
        assert_eq!(value["frontend_id"], json!("fe-1"));
        assert_eq!(value["data"], json!(["/api"]));
    }
}
