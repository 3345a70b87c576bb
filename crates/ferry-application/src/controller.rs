//! FerryApplication controller
//!
//! Wires the convergence engine into kube-rs: finalizer handling, spec
//! validation, the generation gate for Running objects, and per-object
//! requeue backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferry_cloud::LoadBalancerApi;
use ferry_common::backoff::{BackoffConfig, RequeueBackoff};
use ferry_common::crd::{ApplicationPhase, FerryApplication, FerryApplicationStatus};
use ferry_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use ferry_common::kube_utils::{
    self, ClusterIdentity, NodeLabelClusterIdentity, DEFAULT_CLUSTER_ID_LABEL,
};
use ferry_common::{Error, APPLICATION_FINALIZER};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::engine::{Convergence, EngineSettings, Progress};
use crate::validation::validate_application;

/// Controller name used for events
pub const CONTROLLER_NAME: &str = "ferry-application-controller";

/// Requeue delay between stages when chaining is disabled
const STAGE_REQUEUE: Duration = Duration::from_secs(1);

/// Kubernetes writes the controller makes for a FerryApplication
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Merge-patch the status subresource
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &FerryApplicationStatus,
    ) -> Result<(), Error>;

    /// Add the teardown finalizer
    async fn add_finalizer(&self, name: &str, namespace: &str) -> Result<(), Error>;

    /// Remove the teardown finalizer
    async fn remove_finalizer(&self, name: &str, namespace: &str) -> Result<(), Error>;
}

/// [`ApplicationStore`] backed by the Kubernetes API
pub struct KubeApplicationStore {
    client: Client,
}

impl KubeApplicationStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ApplicationStore for KubeApplicationStore {
    async fn patch_status(
        &self,
        name: &str,
        namespace: &str,
        status: &FerryApplicationStatus,
    ) -> Result<(), Error> {
        kube_utils::patch_resource_status::<FerryApplication>(&self.client, name, namespace, status)
            .await
    }

    async fn add_finalizer(&self, name: &str, namespace: &str) -> Result<(), Error> {
        kube_utils::add_finalizer::<FerryApplication>(
            &self.client,
            name,
            namespace,
            APPLICATION_FINALIZER,
        )
        .await
    }

    async fn remove_finalizer(&self, name: &str, namespace: &str) -> Result<(), Error> {
        kube_utils::remove_finalizer::<FerryApplication>(
            &self.client,
            name,
            namespace,
            APPLICATION_FINALIZER,
        )
        .await
    }
}

/// Shared context for the FerryApplication controller
///
/// Use [`Context::builder`] to construct instances.
pub struct Context {
    /// Status and finalizer writes
    pub store: Arc<dyn ApplicationStore>,
    /// Provider networking API
    pub cloud: Arc<dyn LoadBalancerApi>,
    /// Compute cluster ID source
    pub identity: Arc<dyn ClusterIdentity>,
    /// Kubernetes event sink
    pub events: Arc<dyn EventPublisher>,
    /// Per-object failure backoff
    pub backoff: RequeueBackoff,
    /// Engine tunables
    pub settings: EngineSettings,
    /// Root token; cancelled on operator shutdown
    pub shutdown: CancellationToken,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, cloud: Arc<dyn LoadBalancerApi>) -> ContextBuilder {
        ContextBuilder::new(client, cloud)
    }

    /// Create a context for testing with injected collaborators
    #[cfg(test)]
    pub fn for_testing(
        store: Arc<dyn ApplicationStore>,
        cloud: Arc<dyn LoadBalancerApi>,
        identity: Arc<dyn ClusterIdentity>,
        events: Arc<dyn EventPublisher>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            cloud,
            identity,
            events,
            backoff: RequeueBackoff::default(),
            settings,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    cloud: Arc<dyn LoadBalancerApi>,
    store: Option<Arc<dyn ApplicationStore>>,
    identity: Option<Arc<dyn ClusterIdentity>>,
    events: Option<Arc<dyn EventPublisher>>,
    cluster_id_label: String,
    backoff: BackoffConfig,
    settings: EngineSettings,
    shutdown: CancellationToken,
}

impl ContextBuilder {
    fn new(client: Client, cloud: Arc<dyn LoadBalancerApi>) -> Self {
        Self {
            client,
            cloud,
            store: None,
            identity: None,
            events: None,
            cluster_id_label: DEFAULT_CLUSTER_ID_LABEL.to_string(),
            backoff: BackoffConfig::default(),
            settings: EngineSettings::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the status store
    pub fn store(mut self, store: Arc<dyn ApplicationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the cluster identity source
    pub fn identity(mut self, identity: Arc<dyn ClusterIdentity>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Node label carrying the cluster ID
    pub fn cluster_id_label(mut self, label: impl Into<String>) -> Self {
        self.cluster_id_label = label.into();
        self
    }

    /// Requeue backoff schedule
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = config;
        self
    }

    /// Engine tunables
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
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
                .unwrap_or_else(|| Arc::new(KubeApplicationStore::new(self.client.clone()))),
            cloud: self.cloud,
            identity: self.identity.unwrap_or_else(|| {
                Arc::new(NodeLabelClusterIdentity::new(
                    self.client.clone(),
                    self.cluster_id_label,
                ))
            }),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
            backoff: RequeueBackoff::new(self.backoff),
            settings: self.settings,
            shutdown: self.shutdown,
        }
    }
}

fn object_key(app: &FerryApplication) -> String {
    format!("{}/{}", app.namespace().unwrap_or_default(), app.name_any())
}

/// Whether a Running object has already been reconciled at its generation
fn is_settled(app: &FerryApplication) -> bool {
    app.status.as_ref().is_some_and(|status| {
        status.phase == ApplicationPhase::Running
            && status.observed_generation == app.metadata.generation
    })
}

/// Reconcile a FerryApplication
#[instrument(skip(app, ctx), fields(app = %app.name_any(), namespace = ?app.namespace()))]
pub async fn reconcile(app: Arc<FerryApplication>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = app.name_any();
    let namespace = app.namespace().ok_or_else(|| {
        Error::internal_with_context("reconcile", format!("{name} has no namespace"))
    })?;
    let key = object_key(&app);

    if app.metadata.deletion_timestamp.is_some() {
        if !kube_utils::has_finalizer(app.as_ref(), APPLICATION_FINALIZER) {
            debug!("deleted without finalizer, nothing to do");
            ctx.backoff.reset(&key);
            return Ok(Action::await_change());
        }
        let mut run = Convergence::new(&app, namespace, &ctx);
        run.teardown().await?;
        ctx.backoff.reset(&key);
        return Ok(Action::await_change());
    }

    if let Err(e) = validate_application(&app) {
        warn!(error = %e, "application validation failed");
        ctx.events
            .publish(
                &app.object_ref(&()),
                EventType::Warning,
                reasons::VALIDATION_FAILED,
                actions::RECONCILE,
                Some(e.to_string()),
            )
            .await;
        return Ok(Action::await_change());
    }

    if is_settled(&app) {
        debug!("running and generation unchanged");
        return Ok(Action::await_change());
    }

    if !kube_utils::has_finalizer(app.as_ref(), APPLICATION_FINALIZER) {
        info!("adding finalizer");
        ctx.store.add_finalizer(&name, &namespace).await?;
    }

    let mut run = Convergence::new(&app, namespace, &ctx);
    let progress = run.converge().await?;
    ctx.backoff.reset(&key);

    Ok(match progress {
        Progress::Settled => Action::await_change(),
        Progress::Advanced => Action::requeue(STAGE_REQUEUE),
    })
}

/// Requeue a failed reconcile with per-object backoff
pub fn error_policy(app: Arc<FerryApplication>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = object_key(&app);
    let delay = ctx.backoff.next_delay(&key, error);
    warn!(
        app = %app.name_any(),
        error = %error,
        retryable = error.is_retryable(),
        delay_secs = delay.as_secs(),
        "reconciliation failed"
    );
    Action::requeue(delay)
}
