//! Drift reconciliation for Running applications
//!
//! Frontend and target group settings are compared field by field and
//! updated in place. Target groups are reconciled three ways by name:
//! matched groups are updated, missing ones are created, and leftover groups
//! this object owns are deleted. ACL rules are replaced wholesale.

use std::collections::{BTreeMap, HashSet};

use ferry_cloud::types::{FrontendParams, FrontendRecord, TargetGroupParams, TargetGroupRecord};
use ferry_common::events::{actions, reasons};
use ferry_common::{CloudErrorKind, Error};
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

use crate::engine::Convergence;

impl Convergence<'_> {
    pub(crate) async fn drift(&mut self) -> Result<(), Error> {
        self.drift_frontend().await?;
        if self.app.spec.load_balancer.lb_type.uses_target_groups() {
            self.drift_target_groups().await?;
            self.replace_acl_rules().await?;
        }

        self.status.observed_generation = self.app.metadata.generation;
        self.status.message.clear();
        self.persist().await?;
        debug!(app = %self.name, generation = ?self.status.observed_generation, "drift reconciled");
        self.publish(
            EventType::Normal,
            reasons::CONVERGED,
            actions::DRIFT,
            self.status
                .observed_generation
                .map(|g| format!("reconciled generation {g}")),
        )
        .await;
        Ok(())
    }

    async fn drift_frontend(&mut self) -> Result<(), Error> {
        let lb_id = self.require_lb_id()?;
        let spec = self.frontend_spec()?;
        let frontend_id = self.require_frontend_id()?;
        let cloud = &self.ctx.cloud;

        let certificate_id = self.resolve_certificate(spec).await?;
        let desired = FrontendParams::from_spec(spec, certificate_id);

        match self
            .call("read_frontend", cloud.read_frontend(&lb_id, &frontend_id))
            .await?
        {
            Ok(observed) => {
                if frontend_differs(&observed, &desired) {
                    info!(app = %self.name, %frontend_id, "frontend drifted, updating");
                    self.call(
                        "update_frontend",
                        cloud.update_frontend(&lb_id, &frontend_id, &desired),
                    )
                    .await?
                    .map_err(|e| self.cloud_error("update_frontend", e))?;
                }
                Ok(())
            }
            Err(e) if e.is(CloudErrorKind::NotFound) => {
                warn!(app = %self.name, %frontend_id, "frontend deleted remotely, recreating");
                let id = self
                    .call("create_frontend", cloud.create_frontend(&lb_id, &desired))
                    .await?
                    .map_err(|e| self.cloud_error("create_frontend", e))?;
                self.status.frontend_id = id;
                self.persist().await
            }
            Err(e) => Err(self.cloud_error("read_frontend", e)),
        }
    }

    async fn drift_target_groups(&mut self) -> Result<(), Error> {
        let cloud = &self.ctx.cloud;
        let listing = self
            .call("list_target_groups", cloud.list_target_groups())
            .await?
            .map_err(|e| self.cloud_error("list_target_groups", e))?;

        let listed_ids: HashSet<String> = listing.iter().map(|r| r.id.clone()).collect();
        let before = self.status.target_group_ids.len();
        self.status
            .target_group_ids
            .retain(|id| listed_ids.contains(id));
        if self.status.target_group_ids.len() != before {
            debug!(app = %self.name, dropped = before - self.status.target_group_ids.len(), "dropped unlisted target group ids");
            self.persist().await?;
        }

        let mut remote: BTreeMap<String, TargetGroupRecord> = listing
            .into_iter()
            .map(|record| (record.config.name.clone(), record))
            .collect();
        let mut created = Vec::new();

        for tg in &self.app.spec.target_groups {
            let desired = TargetGroupParams::from(tg);
            match remote.remove(&tg.name) {
                Some(record) => {
                    if target_group_differs(&record.config, &desired) {
                        info!(app = %self.name, target_group = %tg.name, "target group drifted, updating");
                        self.call(
                            "update_target_group",
                            cloud.update_target_group(&record.id, &desired),
                        )
                        .await?
                        .map_err(|e| self.cloud_error("update_target_group", e))?;
                    }
                    if !self.status.target_group_ids.contains(&record.id) {
                        self.status.target_group_ids.push(record.id);
                        self.persist().await?;
                    }
                }
                None => {
                    info!(app = %self.name, target_group = %tg.name, "target group missing, creating");
                    let id = self
                        .call("create_target_group", cloud.create_target_group(&desired))
                        .await?
                        .map_err(|e| self.cloud_error("create_target_group", e))?;
                    self.status.target_group_ids.push(id.clone());
                    self.persist().await?;
                    created.push(id);
                }
            }
        }

        for record in remote.into_values() {
            if !self.status.target_group_ids.contains(&record.id) {
                continue;
            }
            info!(app = %self.name, target_group = %record.config.name, "target group no longer desired, deleting");
            self.delete_tolerating_gone(
                "delete_target_group",
                cloud.delete_target_group(&record.id, &record.config.name),
            )
            .await?;
            self.status.target_group_ids.retain(|id| *id != record.id);
            self.persist().await?;
        }

        if !created.is_empty() {
            let cluster_id = self.cluster_id().await?;
            for tg_id in &created {
                self.attach_target_group(tg_id, &cluster_id).await?;
            }
        }
        Ok(())
    }
}

/// Whether the live frontend differs from the desired configuration
pub(crate) fn frontend_differs(observed: &FrontendRecord, desired: &FrontendParams) -> bool {
    observed.name != desired.name
        || !observed.algorithm.eq_ignore_ascii_case(&desired.algorithm)
        || !observed.protocol.eq_ignore_ascii_case(&desired.protocol)
        || observed.port != desired.port
        || observed.redirect_https != desired.redirect_https
        || observed.cookie != desired.cookie
        || observed.certificate_id != desired.certificate_id
}

/// Whether a listed target group differs from the desired configuration
pub(crate) fn target_group_differs(observed: &TargetGroupParams, desired: &TargetGroupParams) -> bool {
    !observed.protocol.eq_ignore_ascii_case(&desired.protocol)
        || observed.port != desired.port
        || observed.health_check_path != desired.health_check_path
        || !observed
            .health_check_protocol
            .eq_ignore_ascii_case(&desired.health_check_protocol)
        || observed.health_check_interval != desired.health_check_interval
        || observed.health_check_timeout != desired.health_check_timeout
        || observed.healthy_threshold != desired.healthy_threshold
        || observed.unhealthy_threshold != desired.unhealthy_threshold
}
