//! Domain and record convergence for one FerryDomain invocation
//!
//! The domain is created first, then every record. Record creation always
//! starts by deleting the record IDs already owned by the object, so a
//! retry after a partial failure and a resync after a spec change both end
//! with exactly the desired set.

use std::future::Future;

use ferry_cloud::types::DnsRecordParams;
use ferry_cloud::CloudResult;
use ferry_common::crd::{DnsPhase, FerryDomain, FerryDomainStatus};
use ferry_common::events::{actions, reasons};
use ferry_common::invocation::Invocation;
use ferry_common::{CloudErrorKind, Error};
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use crate::controller::Context;

/// Working state of one reconcile invocation
pub(crate) struct DomainSync<'a> {
    domain: &'a FerryDomain,
    ctx: &'a Context,
    name: String,
    namespace: String,
    pub(crate) status: FerryDomainStatus,
    invocation: Invocation,
}

impl<'a> DomainSync<'a> {
    pub(crate) fn new(domain: &'a FerryDomain, namespace: String, ctx: &'a Context) -> Self {
        Self {
            domain,
            ctx,
            name: domain.name_any(),
            namespace,
            status: domain.status.clone().unwrap_or_default(),
            invocation: Invocation::new(ctx.shutdown.child_token(), ctx.reconcile_timeout),
        }
    }

    fn zone(&self) -> &'a str {
        &self.domain.spec.domain
    }

    /// Drive the domain to Running from its persisted phase
    pub(crate) async fn converge(&mut self) -> Result<(), Error> {
        let start = self.status.phase;
        debug!(domain = %self.zone(), phase = ?start, "converging");

        let needs_domain = matches!(
            start,
            DnsPhase::New
                | DnsPhase::DomainPending
                | DnsPhase::DomainError
                | DnsPhase::DeletionPending
                | DnsPhase::RecordsDeleted
                | DnsPhase::DeletionError
        );
        if needs_domain {
            self.invocation.check("create_domain")?;
            self.set_phase(DnsPhase::DomainPending).await?;
            if let Err(e) = self.ensure_domain().await {
                return Err(self.fail(DnsPhase::DomainError, e).await);
            }
            self.set_phase(DnsPhase::DomainCreated).await?;
        }

        if start != DnsPhase::RecordsCreated {
            self.invocation.check("create_records")?;
            self.set_phase(DnsPhase::RecordsPending).await?;
            if let Err(e) = self.replace_records().await {
                return Err(self.fail(DnsPhase::RecordsError, e).await);
            }
            self.status.record_count = self.status.record_ids.len() as u32;
            self.set_phase(DnsPhase::RecordsCreated).await?;
        }

        self.status.observed_generation = self.domain.metadata.generation;
        self.status.message.clear();
        self.set_phase(DnsPhase::Running).await?;
        info!(domain = %self.zone(), records = self.status.record_count, "domain converged");
        self.publish(
            EventType::Normal,
            reasons::CONVERGED,
            if start == DnsPhase::Running {
                actions::DRIFT
            } else {
                actions::PROVISION
            },
            Some(format!("{} records served", self.status.record_count)),
        )
        .await;
        Ok(())
    }

    async fn ensure_domain(&mut self) -> Result<(), Error> {
        let zone = self.zone();
        match self
            .call("create_domain", self.ctx.cloud.create_domain(zone))
            .await?
        {
            Ok(()) => {
                info!(domain = %zone, "domain created");
                Ok(())
            }
            Err(e) if e.is(CloudErrorKind::AlreadyExists) => {
                warn!(domain = %zone, "domain already exists, adopting it");
                self.publish(
                    EventType::Warning,
                    reasons::DOMAIN_EXISTS,
                    actions::PROVISION,
                    Some(format!("domain {zone} already exists and was adopted")),
                )
                .await;
                Ok(())
            }
            Err(e) => Err(Error::cloud_for(&self.name, "create_domain", e)),
        }
    }

    async fn replace_records(&mut self) -> Result<(), Error> {
        self.delete_records().await?;

        let domain = self.domain;
        for record in &domain.spec.records {
            let params = DnsRecordParams::from(record);
            let id = self
                .call("create_record", self.ctx.cloud.create_record(self.zone(), &params))
                .await?
                .map_err(|e| Error::cloud_for(&self.name, "create_record", e))?;
            debug!(domain = %self.zone(), hostname = %params.hostname, record_type = %params.record_type, %id, "record created");
            self.status.record_ids.push(id);
            self.persist().await?;
        }
        Ok(())
    }

    /// Delete every owned record, persisting the shrinking ID list
    async fn delete_records(&mut self) -> Result<(), Error> {
        while let Some(id) = self.status.record_ids.first().cloned() {
            match self
                .call("delete_record", self.ctx.cloud.delete_record(self.zone(), &id))
                .await?
            {
                Ok(()) => debug!(domain = %self.zone(), %id, "record deleted"),
                Err(e) if e.kind.is_gone() => debug!(domain = %self.zone(), %id, "record already gone"),
                Err(e) => return Err(Error::cloud_for(&self.name, "delete_record", e)),
            }
            self.status.record_ids.remove(0);
            self.status.record_count = self.status.record_ids.len() as u32;
            self.persist().await?;
        }
        Ok(())
    }

    /// Delete the records, then the domain
    pub(crate) async fn teardown(&mut self) -> Result<(), Error> {
        let start = self.status.phase;
        info!(domain = %self.zone(), phase = ?start, "tearing down");

        if start != DnsPhase::RecordsDeleted {
            self.set_phase(DnsPhase::DeletionPending).await?;
            if let Err(e) = self.delete_records().await {
                return Err(self.fail(DnsPhase::DeletionError, e).await);
            }
            self.set_phase(DnsPhase::RecordsDeleted).await?;
        }

        let zone = self.zone();
        match self
            .call("delete_domain", self.ctx.cloud.delete_domain(zone))
            .await?
        {
            Ok(()) => info!(domain = %zone, "domain deleted"),
            Err(e) if e.kind.is_gone() => debug!(domain = %zone, "domain already gone"),
            Err(e) => {
                let err = Error::cloud_for(&self.name, "delete_domain", e);
                return Err(self.fail(DnsPhase::DeletionError, err).await);
            }
        }

        self.ctx
            .store
            .remove_finalizer(&self.name, &self.namespace)
            .await?;
        self.publish(
            EventType::Normal,
            reasons::TEARDOWN_COMPLETE,
            actions::DELETE,
            None,
        )
        .await;
        Ok(())
    }

    async fn fail(&mut self, phase: DnsPhase, error: Error) -> Error {
        if error.is_interrupted() {
            return error;
        }
        warn!(domain = %self.zone(), ?phase, error = %error, "domain step failed");
        self.status.message = error.to_string();
        if let Err(persist) = self.set_phase(phase).await {
            warn!(domain = %self.zone(), error = %persist, "failed to record failure phase");
        }
        let action = if phase == DnsPhase::DeletionError {
            actions::DELETE
        } else {
            actions::PROVISION
        };
        self.publish(
            EventType::Warning,
            reasons::STEP_FAILED,
            action,
            Some(error.to_string()),
        )
        .await;
        error
    }

    async fn call<T, F>(&self, operation: &str, fut: F) -> Result<CloudResult<T>, Error>
    where
        F: Future<Output = CloudResult<T>>,
    {
        self.invocation.run(operation, fut).await
    }

    async fn persist(&self) -> Result<(), Error> {
        self.ctx
            .store
            .patch_status(&self.name, &self.namespace, &self.status)
            .await
    }

    async fn set_phase(&mut self, phase: DnsPhase) -> Result<(), Error> {
        self.status.phase = phase;
        self.persist().await
    }

    async fn publish(&self, type_: EventType, reason: &str, action: &str, note: Option<String>) {
        self.ctx
            .events
            .publish(&self.domain.object_ref(&()), type_, reason, action, note)
            .await;
    }
}
