//! FerryDomain controller

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferry_cloud::DnsApi;
use ferry_common::backoff::{BackoffConfig, RequeueBackoff};
use ferry_common::crd::{DnsPhase, FerryDomain, FerryDomainStatus};
use ferry_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use ferry_common::kube_utils;
use ferry_common::{Error, DOMAIN_FINALIZER};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::sync::DomainSync;
use crate::validation::validate_domain;

/// Controller name used for events
pub const CONTROLLER_NAME: &str = "ferry-dns-controller";

/// Default per-invocation deadline
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(120);

/// Kubernetes writes the controller makes for a FerryDomain
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Merge-patch the status subresource
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &FerryDomainStatus,
    ) -> Result<(), Error>;

    /// Add the teardown finalizer
    async fn add_finalizer(&self, name: &str, namespace: &str) -> Result<(), Error>;

    /// Remove the teardown finalizer
    async fn remove_finalizer(&self, name: &str, namespace: &str) -> Result<(), Error>;
}

/// [`DomainStore`] backed by the Kubernetes API
pub struct KubeDomainStore {
    client: Client,
}

impl KubeDomainStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DomainStore for KubeDomainStore {
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &FerryDomainStatus,
    ) -> Result<(), Error> {
        kube_utils::patch_resource_status::<FerryDomain>(&self.client, name, namespace, status).await
    }

    async fn add_finalizer(&self, name: &str, namespace: &str) -> Result<(), Error> {
        kube_utils::add_finalizer::<FerryDomain>(&self.client, name, namespace, DOMAIN_FINALIZER)
            .await
    }

    async fn remove_finalizer(&self, name: &str, namespace: &str) -> Result<(), Error> {
        kube_utils::remove_finalizer::<FerryDomain>(&self.client, name, namespace, DOMAIN_FINALIZER)
            .await
    }
}

/// Shared context for the FerryDomain controller
pub struct Context {
    /// Status and finalizer writes
    pub store: Arc<dyn DomainStore>,
    /// Provider DNS API
    pub cloud: Arc<dyn DnsApi>,
    /// Kubernetes event sink
    pub events: Arc<dyn EventPublisher>,
    /// Per-object failure backoff
    pub backoff: RequeueBackoff,
    /// Deadline for one invocation
    pub reconcile_timeout: Duration,
    /// Root token; cancelled on operator shutdown
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, cloud: Arc<dyn DnsApi>) -> ContextBuilder {
        ContextBuilder {
            client,
            cloud,
            store: None,
            events: None,
            backoff: BackoffConfig::default(),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a context for testing with injected collaborators
    #[cfg(test)]
    pub fn for_testing(
        store: Arc<dyn DomainStore>,
        cloud: Arc<dyn DnsApi>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            cloud,
            events,
            backoff: RequeueBackoff::default(),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    cloud: Arc<dyn DnsApi>,
    store: Option<Arc<dyn DomainStore>>,
    events: Option<Arc<dyn EventPublisher>>,
    backoff: BackoffConfig,
    reconcile_timeout: Duration,
    shutdown: CancellationToken,
}

impl ContextBuilder {
    /// Override the status store
    pub fn store(mut self, store: Arc<dyn DomainStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Requeue backoff schedule
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config;
        self
    }

    /// Deadline for one invocation
    pub fn reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.reconcile_timeout = timeout;
        self
    }

    /// Root cancellation token
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(KubeDomainStore::new(self.client.clone()))),
            cloud: self.cloud,
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
            backoff: RequeueBackoff::new(self.backoff),
            reconcile_timeout: self.reconcile_timeout,
            shutdown: self.shutdown,
        }
    }
}

fn object_key(domain: &FerryDomain) -> String {
    format!("{}/{}", domain.namespace().unwrap_or_default(), domain.name_any())
}

fn is_settled(domain: &FerryDomain) -> bool {
    domain.status.as_ref().is_some_and(|status| {
        status.phase == DnsPhase::Running && status.observed_generation == domain.metadata.generation
    })
}

/// Reconcile a FerryDomain
#[instrument(skip(domain, ctx), fields(domain = %domain.spec.domain, name = %domain.name_any()))]
pub async fn reconcile(domain: Arc<FerryDomain>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = domain.name_any();
    let namespace = domain.namespace().ok_or_else(|| {
        Error::internal_with_context("reconcile", format!("{name} has no namespace"))
    })?;
    let key = object_key(&domain);

    if domain.metadata.deletion_timestamp.is_some() {
        if !kube_utils::has_finalizer(domain.as_ref(), DOMAIN_FINALIZER) {
            ctx.backoff.reset(&key);
            return Ok(Action::await_change());
        }
        DomainSync::new(&domain, namespace, &ctx).teardown().await?;
        ctx.backoff.reset(&key);
        return Ok(Action::await_change());
    }

    if let Err(e) = validate_domain(&domain) {
        warn!(error = %e, "domain validation failed");
        ctx.events
            .publish(
                &domain.object_ref(&()),
                EventType::Warning,
                reasons::VALIDATION_FAILED,
                actions::RECONCILE,
                Some(e.to_string()),
            )
            .await;
        return Ok(Action::await_change());
    }

    if is_settled(&domain) {
        debug!("running and generation unchanged");
        return Ok(Action::await_change());
    }

    if !kube_utils::has_finalizer(domain.as_ref(), DOMAIN_FINALIZER) {
        info!("adding finalizer");
        ctx.store.add_finalizer(&name, &namespace).await?;
    }

    DomainSync::new(&domain, namespace, &ctx).converge().await?;
    ctx.backoff.reset(&key);
    Ok(Action::await_change())
}

/// Requeue a failed reconcile with per-object backoff
pub fn error_policy(domain: Arc<FerryDomain>, error: &Error, ctx: Arc<Context>) -> Action {
    let delay = ctx.backoff.next_delay(&object_key(&domain), error);
    warn!(
        domain = %domain.spec.domain,
        error = %error,
        delay_secs = delay.as_secs(),
        "reconciliation failed"
    );
    Action::requeue(delay)
}
