//! Convergence engine
//!
//! One [`Convergence`] exists per reconcile invocation. It owns a working
//! copy of the status, walks the [`StageOrder`] table from the persisted
//! phase, and writes the status back through the [`ApplicationStore`] on
//! every transition and after every remote call that produced an ID.
//!
//! [`ApplicationStore`]: crate::controller::ApplicationStore

use std::future::Future;
use std::time::Duration;

use ferry_cloud::CloudResult;
use ferry_common::crd::{ApplicationPhase, FerryApplication, FerryApplicationStatus};
use ferry_common::events::{actions, reasons};
use ferry_common::invocation::Invocation;
use ferry_common::{CloudError, Error};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use crate::controller::Context;
use crate::stages::{Stage, StageOrder, Step};

/// Default per-invocation deadline
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(120);

/// Tunables for the convergence engine
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Run successive stages in one invocation
    pub chain_phases: bool,
    /// Order of the provisioning stages
    pub stage_order: StageOrder,
    /// Deadline for one invocation
    pub reconcile_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chain_phases: true,
            stage_order: StageOrder::default(),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
        }
    }
}

/// How far an invocation got
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// The object is Running and matches its generation
    Settled,
    /// A stage completed and another invocation should continue
    Advanced,
}

/// Working state of one reconcile invocation
pub(crate) struct Convergence<'a> {
    pub(crate) app: &'a FerryApplication,
    pub(crate) ctx: &'a Context,
    pub(crate) name: String,
    namespace: String,
    pub(crate) status: FerryApplicationStatus,
    pub(crate) invocation: Invocation,
}

impl<'a> Convergence<'a> {
    pub(crate) fn new(app: &'a FerryApplication, namespace: String, ctx: &'a Context) -> Self {
        Self {
            app,
            ctx,
            name: app.name_any(),
            namespace,
            status: app.status.clone().unwrap_or_default(),
            invocation: Invocation::new(
                ctx.shutdown.child_token(),
                ctx.settings.reconcile_timeout,
            ),
        }
    }

    /// Drive the object forward from its persisted phase
    pub(crate) async fn converge(&mut self) -> Result<Progress, Error> {
        loop {
            let phase = self.status.phase;
            let transition = self.ctx.settings.stage_order.transition(phase).ok_or_else(|| {
                Error::internal_with_context(
                    "convergence",
                    format!("no transition from phase {phase}"),
                )
            })?;

            match transition.step {
                Step::Drift => {
                    self.drift().await?;
                    return Ok(Progress::Settled);
                }
                Step::EnterRunning => {
                    self.status.observed_generation = self.app.metadata.generation;
                    self.status.message.clear();
                    self.set_phase(transition.success).await?;
                    info!(app = %self.name, "application converged");
                    self.publish(
                        EventType::Normal,
                        reasons::CONVERGED,
                        actions::PROVISION,
                        Some(format!(
                            "load balancer {} serving at {}",
                            self.status.load_balancer_id, self.status.load_balancer_ip
                        )),
                    )
                    .await;
                    return Ok(Progress::Settled);
                }
                Step::Stage(stage) => {
                    self.invocation.check(stage.as_str())?;
                    if let Some(pending) = transition.pending {
                        if phase != pending {
                            self.set_phase(pending).await?;
                        }
                    }
                    debug!(app = %self.name, %stage, from = %phase, "running stage");

                    match self.run_stage(stage).await {
                        Ok(()) => {
                            self.status.message.clear();
                            self.set_phase(transition.success).await?;
                            info!(app = %self.name, %stage, phase = %transition.success, "stage complete");
                            if !self.ctx.settings.chain_phases {
                                return Ok(Progress::Advanced);
                            }
                        }
                        Err(e) if e.is_interrupted() => {
                            warn!(app = %self.name, %stage, error = %e, "stage interrupted");
                            return Err(e);
                        }
                        Err(e) => {
                            let failure = transition.failure.unwrap_or(stage.error());
                            warn!(app = %self.name, %stage, phase = %failure, error = %e, "stage failed");
                            self.status.message = e.to_string();
                            self.set_phase(failure).await?;
                            self.publish(
                                EventType::Warning,
                                reasons::STEP_FAILED,
                                actions::PROVISION,
                                Some(e.to_string()),
                            )
                            .await;
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    async fn run_stage(&mut self, stage: Stage) -> Result<(), Error> {
        match stage {
            Stage::LoadBalancer => self.create_load_balancer().await,
            Stage::TargetGroups => self.create_target_groups().await,
            Stage::LbAttach => self.attach_load_balancer().await,
            Stage::TgAttach => self.attach_target_groups().await,
            Stage::Frontend => self.ensure_frontend().await,
            Stage::Acl => self.configure_acl().await,
        }
    }

    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Write the working status
    pub(crate) async fn persist(&self) -> Result<(), Error> {
        self.ctx
            .store
            .patch_status(&self.name, &self.namespace, &self.status)
            .await
    }

    /// Record a phase transition and persist it
    pub(crate) async fn set_phase(&mut self, phase: ApplicationPhase) -> Result<(), Error> {
        self.status.phase = phase;
        self.status.last_transition_time = Some(chrono::Utc::now().to_rfc3339());
        self.persist().await
    }

    /// Run a provider call inside the invocation's cancellation scope
    ///
    /// The outer error is an interruption; the inner result is the call's
    /// own outcome for the caller to classify.
    pub(crate) async fn call<T, F>(&self, operation: &str, fut: F) -> Result<CloudResult<T>, Error>
    where
        F: Future<Output = CloudResult<T>>,
    {
        debug!(app = %self.name, operation, "provider call");
        self.invocation.run(operation, fut).await
    }

    pub(crate) fn cloud_error(&self, operation: &str, source: CloudError) -> Error {
        Error::cloud_for(&self.name, operation, source)
    }

    pub(crate) fn require_lb_id(&self) -> Result<String, Error> {
        if self.status.load_balancer_id.is_empty() {
            return Err(Error::missing_dependency(&self.name, "load balancer id"));
        }
        Ok(self.status.load_balancer_id.clone())
    }

    pub(crate) fn require_frontend_id(&self) -> Result<String, Error> {
        if self.status.frontend_id.is_empty() {
            return Err(Error::missing_dependency(&self.name, "frontend id"));
        }
        Ok(self.status.frontend_id.clone())
    }

    pub(crate) async fn cluster_id(&self) -> Result<String, Error> {
        self.invocation
            .run("cluster_id", self.ctx.identity.cluster_id())
            .await?
    }

    pub(crate) fn object_ref(&self) -> ObjectReference {
        self.app.object_ref(&())
    }

    pub(crate) async fn publish(
        &self,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.ctx
            .events
            .publish(&self.object_ref(), type_, reason, action, note)
            .await;
    }
}
