//! Provisioning actions, one per stage
//!
//! Every action persists each ID as soon as the call that produced it
//! returns, so a later failure or interruption never loses track of a
//! remote resource.

use std::collections::HashMap;

use ferry_cloud::types::{
    AclRuleParams, BackendParams, FrontendParams, LoadBalancerParams, RoutingRuleParams,
    TargetGroupParams, TargetGroupRecord,
};
use ferry_common::crd::{ApplicationPhase, FrontendSpec, LoadBalancerType};
use ferry_common::events::{actions, reasons};
use ferry_common::{CloudError, CloudErrorKind, Error};
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

use crate::engine::Convergence;

impl<'a> Convergence<'a> {
    pub(crate) async fn create_load_balancer(&mut self) -> Result<(), Error> {
        let cloud = &self.ctx.cloud;

        if !self.status.load_balancer_id.is_empty() {
            let id = self.status.load_balancer_id.clone();
            match self
                .call("read_load_balancer", cloud.read_load_balancer(&id))
                .await?
            {
                Ok(lb) => {
                    info!(app = %self.name, lb_id = %id, "adopting recorded load balancer");
                    if !lb.ip.is_empty() {
                        self.status.load_balancer_ip = lb.ip;
                    }
                    return self.persist().await;
                }
                Err(e) if e.kind.is_gone() => {
                    warn!(app = %self.name, lb_id = %id, "recorded load balancer is gone, creating a new one");
                    self.status.load_balancer_id.clear();
                    self.status.load_balancer_ip.clear();
                    self.persist().await?;
                }
                Err(e) => return Err(self.cloud_error("read_load_balancer", e)),
            }
        }

        let params = LoadBalancerParams::from(&self.app.spec.load_balancer);
        let created = self
            .call("create_load_balancer", cloud.create_load_balancer(&params))
            .await?
            .map_err(|e| self.cloud_error("create_load_balancer", e))?;
        self.status.load_balancer_id = created.id.clone();
        self.status.load_balancer_ip = created.ip;
        self.persist().await?;
        info!(app = %self.name, lb_id = %created.id, "load balancer created");
        self.publish(
            EventType::Normal,
            reasons::LOAD_BALANCER_CREATED,
            actions::PROVISION,
            Some(format!("created load balancer {}", created.id)),
        )
        .await;

        if self.status.load_balancer_ip.is_empty() {
            let lb = self
                .call("read_load_balancer", cloud.read_load_balancer(&created.id))
                .await?
                .map_err(|e| self.cloud_error("read_load_balancer", e))?;
            self.status.load_balancer_ip = lb.ip;
            self.persist().await?;
        }
        Ok(())
    }

    pub(crate) async fn create_target_groups(&mut self) -> Result<(), Error> {
        if !self.app.spec.load_balancer.lb_type.uses_target_groups() {
            debug!(app = %self.name, "network load balancer, no target groups");
            return Ok(());
        }

        let cloud = &self.ctx.cloud;
        let recorded = self.status.target_group_ids.len();
        let mut listing: Option<Vec<TargetGroupRecord>> = None;

        for tg in self.app.spec.target_groups.iter().skip(recorded) {
            let params = TargetGroupParams::from(tg);
            let id = match self
                .call("create_target_group", cloud.create_target_group(&params))
                .await?
            {
                Ok(id) => id,
                Err(e) if e.is(CloudErrorKind::AlreadyExists) => {
                    if listing.is_none() {
                        let groups = self
                            .call("list_target_groups", cloud.list_target_groups())
                            .await?
                            .map_err(|e| self.cloud_error("list_target_groups", e))?;
                        listing = Some(groups);
                    }
                    let found = listing
                        .iter()
                        .flatten()
                        .find(|record| record.config.name == tg.name)
                        .map(|record| record.id.clone());
                    match found {
                        Some(id) => {
                            debug!(app = %self.name, target_group = %tg.name, %id, "target group already exists");
                            id
                        }
                        None => {
                            return Err(self.cloud_error(
                                "create_target_group",
                                CloudError::not_found(format!(
                                    "target group {} reported as existing but not listed",
                                    tg.name
                                )),
                            ))
                        }
                    }
                }
                Err(e) => return Err(self.cloud_error("create_target_group", e)),
            };
            self.status.target_group_ids.push(id);
            self.persist().await?;
        }
        Ok(())
    }

    pub(crate) async fn attach_load_balancer(&mut self) -> Result<(), Error> {
        let lb_id = self.require_lb_id()?;
        let cluster_id = self.cluster_id().await?;
        match self
            .call(
                "attach_load_balancer",
                self.ctx.cloud.attach_load_balancer(&lb_id, &cluster_id),
            )
            .await?
        {
            Ok(()) => Ok(()),
            Err(e) if e.is(CloudErrorKind::AlreadyAttached) => {
                debug!(app = %self.name, %lb_id, "load balancer already attached");
                Ok(())
            }
            Err(e) => Err(self.cloud_error("attach_load_balancer", e)),
        }
    }

    pub(crate) async fn attach_target_groups(&mut self) -> Result<(), Error> {
        if !self.app.spec.load_balancer.lb_type.uses_target_groups() {
            return Ok(());
        }
        let cluster_id = self.cluster_id().await?;
        for tg_id in self.status.target_group_ids.clone() {
            self.attach_target_group(&tg_id, &cluster_id).await?;
        }
        Ok(())
    }

    pub(crate) async fn attach_target_group(
        &self,
        tg_id: &str,
        cluster_id: &str,
    ) -> Result<(), Error> {
        match self
            .call(
                "attach_target_group",
                self.ctx.cloud.attach_target_group(tg_id, cluster_id),
            )
            .await?
        {
            Ok(()) => Ok(()),
            Err(e) if e.is(CloudErrorKind::AlreadyAttached) => {
                debug!(app = %self.name, tg_id, "target group already attached");
                Ok(())
            }
            Err(e) => Err(self.cloud_error("attach_target_group", e)),
        }
    }

    pub(crate) async fn ensure_frontend(&mut self) -> Result<(), Error> {
        let lb_id = self.require_lb_id()?;
        let spec = self.frontend_spec()?;
        let cloud = &self.ctx.cloud;

        let lb = self
            .call("read_load_balancer", cloud.read_load_balancer(&lb_id))
            .await?
            .map_err(|e| self.cloud_error("read_load_balancer", e))?;
        if let Some(existing) = lb.frontends.first() {
            info!(app = %self.name, frontend_id = %existing.id, "adopting existing frontend");
            self.status.frontend_id = existing.id.clone();
            return self.persist().await;
        }

        let certificate_id = self.resolve_certificate(spec).await?;
        let params = FrontendParams::from_spec(spec, certificate_id);
        let id = self
            .call("create_frontend", cloud.create_frontend(&lb_id, &params))
            .await?
            .map_err(|e| self.cloud_error("create_frontend", e))?;
        info!(app = %self.name, frontend_id = %id, "frontend created");
        self.status.frontend_id = id;
        self.persist().await
    }

    pub(crate) fn frontend_spec(&self) -> Result<&'a FrontendSpec, Error> {
        self.app
            .spec
            .load_balancer
            .frontend
            .as_ref()
            .ok_or_else(|| {
                Error::validation_for_field(
                    &self.name,
                    "spec.loadBalancer.frontend",
                    "a frontend is required",
                )
            })
    }

    /// Resolve the frontend certificate by name; a missing certificate is not fatal
    pub(crate) async fn resolve_certificate(
        &self,
        spec: &FrontendSpec,
    ) -> Result<Option<String>, Error> {
        let Some(name) = spec.certificate_name.as_deref().filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        match self
            .call(
                "lookup_certificate_id",
                self.ctx.cloud.lookup_certificate_id(name),
            )
            .await?
        {
            Ok(id) => Ok(Some(id)),
            Err(e) if e.is(CloudErrorKind::NotFound) => {
                warn!(app = %self.name, certificate = name, "certificate not found, continuing without it");
                self.publish(
                    EventType::Warning,
                    reasons::CERTIFICATE_NOT_FOUND,
                    actions::PROVISION,
                    Some(format!("certificate {name} not found")),
                )
                .await;
                Ok(None)
            }
            Err(e) => Err(self.cloud_error("lookup_certificate_id", e)),
        }
    }

    pub(crate) async fn configure_acl(&mut self) -> Result<(), Error> {
        match self.app.spec.load_balancer.lb_type {
            LoadBalancerType::Network => self.create_backend().await,
            LoadBalancerType::Application => self.replace_acl_rules().await,
        }
    }

    async fn create_backend(&mut self) -> Result<(), Error> {
        let lb_id = self.require_lb_id()?;
        let frontend_id = self.require_frontend_id()?;
        let backend_port = self.app.spec.load_balancer.backend_port.ok_or_else(|| {
            Error::validation_for_field(
                &self.name,
                "spec.loadBalancer.backendPort",
                "a network load balancer requires backendPort",
            )
        })?;
        let cluster_id = self.cluster_id().await?;

        let params = BackendParams {
            frontend_id,
            cluster_id,
            backend_port,
        };
        match self
            .call("create_backend", self.ctx.cloud.create_backend(&lb_id, &params))
            .await?
        {
            Ok(id) => {
                info!(app = %self.name, backend_id = %id, "network backend created");
                Ok(())
            }
            Err(e) if e.is(CloudErrorKind::AlreadyExists) => Ok(()),
            Err(e) => Err(self.cloud_error("create_backend", e)),
        }
    }

    /// Delete every recorded routing and ACL rule, then create the desired set
    pub(crate) async fn replace_acl_rules(&mut self) -> Result<(), Error> {
        let lb_id = self.require_lb_id()?;
        let frontend_id = self.require_frontend_id()?;
        let cloud = &self.ctx.cloud;

        // An ID leaves status only once its delete succeeded
        while let Some(rule_id) = self.status.advanced_routing_rule_ids.first().cloned() {
            self.delete_tolerating_gone(
                "delete_routing_rule",
                cloud.delete_routing_rule(&lb_id, &rule_id),
            )
            .await?;
            self.status.advanced_routing_rule_ids.remove(0);
            self.persist().await?;
        }
        while let Some(acl_id) = self.status.acl_rule_ids.first().cloned() {
            self.delete_tolerating_gone("delete_acl_rule", cloud.delete_acl_rule(&lb_id, &acl_id))
                .await?;
            self.status.acl_rule_ids.remove(0);
            self.persist().await?;
        }

        let lb_spec = &self.app.spec.load_balancer;
        let mut acl_ids: HashMap<&str, String> = HashMap::new();
        for rule in &lb_spec.acl_rules {
            let params = AclRuleParams::from(rule);
            match self
                .call(
                    "create_acl_rule",
                    cloud.create_acl_rule(&lb_id, &frontend_id, &params),
                )
                .await?
            {
                Ok(id) => {
                    acl_ids.insert(rule.name.as_str(), id.clone());
                    self.status.acl_rule_ids.push(id);
                    self.persist().await?;
                }
                Err(e) if e.is(CloudErrorKind::DuplicateEntry) || e.is(CloudErrorKind::AlreadyExists) => {
                    warn!(app = %self.name, acl = %rule.name, "acl rule already present without a recorded id");
                    self.publish(
                        EventType::Warning,
                        reasons::ACL_RULE_UNTRACKED,
                        self.event_action(),
                        Some(format!(
                            "acl rule {} already exists at the provider; routing rules using it are skipped",
                            rule.name
                        )),
                    )
                    .await;
                }
                Err(e) => return Err(self.cloud_error("create_acl_rule", e)),
            }
        }

        if lb_spec.advanced_routing_rules.is_empty() {
            return Ok(());
        }

        let groups: HashMap<String, String> = self
            .call("list_target_groups", cloud.list_target_groups())
            .await?
            .map_err(|e| self.cloud_error("list_target_groups", e))?
            .into_iter()
            .map(|record| (record.config.name, record.id))
            .collect();

        for rule in &lb_spec.advanced_routing_rules {
            let Some(acl_id) = acl_ids.get(rule.acl_name.as_str()) else {
                warn!(app = %self.name, acl = %rule.acl_name, "routing rule references an unknown acl, skipping");
                continue;
            };
            let Some(tg_id) = groups.get(&rule.target_group_name) else {
                warn!(app = %self.name, target_group = %rule.target_group_name, "routing rule references an unknown target group, skipping");
                continue;
            };
            let params = RoutingRuleParams {
                acl_id: acl_id.clone(),
                target_group_id: tg_id.clone(),
                route_condition: rule.route_condition,
            };
            match self
                .call("create_routing_rule", cloud.create_routing_rule(&lb_id, &params))
                .await?
            {
                Ok(id) => {
                    self.status.advanced_routing_rule_ids.push(id);
                    self.persist().await?;
                }
                Err(e) if e.is(CloudErrorKind::AlreadyExists) || e.is(CloudErrorKind::DuplicateEntry) => {
                    debug!(app = %self.name, acl = %rule.acl_name, "routing rule already present");
                }
                Err(e) => return Err(self.cloud_error("create_routing_rule", e)),
            }
        }
        Ok(())
    }

    fn event_action(&self) -> &'static str {
        if self.status.phase == ApplicationPhase::Running {
            actions::DRIFT
        } else {
            actions::PROVISION
        }
    }

    pub(crate) async fn delete_tolerating_gone<F>(
        &self,
        operation: &str,
        fut: F,
    ) -> Result<(), Error>
    where
        F: std::future::Future<Output = ferry_cloud::CloudResult<()>>,
    {
        match self.call(operation, fut).await? {
            Ok(()) => Ok(()),
            Err(e) if e.kind.is_gone() => {
                debug!(app = %self.name, operation, "already gone");
                Ok(())
            }
            Err(e) => Err(self.cloud_error(operation, e)),
        }
    }
}
