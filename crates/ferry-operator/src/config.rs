//! Operator configuration from flags and environment

use std::time::Duration;

use clap::{ArgAction, Args};
use ferry_application::{EngineSettings, StageOrder};
use ferry_cloud::DEFAULT_API_URL;
use ferry_common::backoff::BackoffConfig;
use ferry_common::kube_utils::DEFAULT_CLUSTER_ID_LABEL;
use ferry_common::telemetry::{LogFormat, TelemetryConfig};

/// Settings shared by both controllers
#[derive(Args, Debug, Clone)]
pub struct OperatorConfig {
    /// Provider API key
    #[arg(long, env = "FERRY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Provider API base URL
    #[arg(long, env = "FERRY_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Concurrent FerryApplication reconciles
    #[arg(long, env = "NUM_WORKERS", default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub num_workers: u16,

    /// Concurrent FerryDomain reconciles
    #[arg(long, env = "DNS_WORKERS", default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..))]
    pub dns_workers: u16,

    /// Deadline for one reconcile invocation, in seconds
    #[arg(long, env = "RECONCILE_TIMEOUT_SECS", default_value_t = 120)]
    pub reconcile_timeout_secs: u64,

    /// Run successive provisioning stages in one invocation
    #[arg(long, env = "CHAIN_PHASES", default_value_t = true, action = ArgAction::Set)]
    pub chain_phases: bool,

    /// Comma-separated provisioning stage order, e.g. "lb,tg,lb-attach,tg-attach,frontend,acl"
    #[arg(long, env = "STAGE_ORDER")]
    pub stage_order: Option<String>,

    /// Node label carrying the provider's cluster ID
    #[arg(long, env = "CLUSTER_ID_LABEL", default_value = DEFAULT_CLUSTER_ID_LABEL)]
    pub cluster_id_label: String,

    /// Fixed cluster ID, used instead of the node label lookup
    #[arg(long, env = "FERRY_CLUSTER_ID")]
    pub cluster_id: Option<String>,

    /// First requeue delay after a failure, in seconds
    #[arg(long, env = "REQUEUE_BASE_SECS", default_value_t = 5)]
    pub requeue_base_secs: u64,

    /// Upper bound on requeue delays, in seconds
    #[arg(long, env = "REQUEUE_MAX_SECS", default_value_t = 300)]
    pub requeue_max_secs: u64,

    /// Per-request timeout for provider calls, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Log output: "text" or "json"
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl OperatorConfig {
    /// The API key, required to run the controllers
    pub fn require_api_key(&self) -> anyhow::Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("FERRY_API_KEY must be set to run the controllers"))
    }

    /// Engine tunables for the application controller
    pub fn engine_settings(&self) -> anyhow::Result<EngineSettings> {
        let stage_order = match self.stage_order.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(order) => StageOrder::parse(order)?,
            None => StageOrder::default(),
        };
        Ok(EngineSettings {
            chain_phases: self.chain_phases,
            stage_order,
            reconcile_timeout: self.reconcile_timeout(),
        })
    }

    /// Deadline for one reconcile invocation
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Per-request provider timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Requeue schedule shared by both controllers
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_secs(self.requeue_base_secs),
            max_delay: Duration::from_secs(self.requeue_max_secs.max(self.requeue_base_secs)),
            ..Default::default()
        }
    }

    /// Logging configuration
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            format: LogFormat::parse(&self.log_format),
            ..Default::default()
        }
    }
}
