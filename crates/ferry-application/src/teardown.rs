//! Ordered teardown of a deleted FerryApplication
//!
//! The load balancer goes first, taking its frontend, ACLs and routes with
//! it. Target groups are deleted only after that succeeds. The finalizer is
//! released last, so a failure at either stage keeps the object around and
//! the next invocation resumes from the failed stage.

use std::collections::HashMap;

use ferry_common::crd::ApplicationPhase;
use ferry_common::events::{actions, reasons};
use ferry_common::Error;
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

use crate::engine::Convergence;

impl Convergence<'_> {
    pub(crate) async fn teardown(&mut self) -> Result<(), Error> {
        let start = self.status.phase;
        info!(app = %self.name, phase = %start, "tearing down");

        let lb_done = matches!(
            start,
            ApplicationPhase::LbDeleted
                | ApplicationPhase::TgDeletionPending
                | ApplicationPhase::TgDeletionError
                | ApplicationPhase::TgDeleted
        );
        if !lb_done {
            self.set_phase(ApplicationPhase::LbDeletionPending).await?;
            if let Err(e) = self.delete_load_balancer().await {
                return Err(self.fail_teardown(ApplicationPhase::LbDeletionError, e).await);
            }
            self.set_phase(ApplicationPhase::LbDeleted).await?;
        }

        if start != ApplicationPhase::TgDeleted {
            self.set_phase(ApplicationPhase::TgDeletionPending).await?;
            if let Err(e) = self.delete_target_groups().await {
                return Err(self.fail_teardown(ApplicationPhase::TgDeletionError, e).await);
            }
            self.set_phase(ApplicationPhase::TgDeleted).await?;
        }

        self.ctx
            .store
            .remove_finalizer(&self.name, self.namespace())
            .await?;
        info!(app = %self.name, "teardown complete");
        self.publish(
            EventType::Normal,
            reasons::TEARDOWN_COMPLETE,
            actions::DELETE,
            None,
        )
        .await;
        Ok(())
    }

    async fn fail_teardown(&mut self, phase: ApplicationPhase, error: Error) -> Error {
        if error.is_interrupted() {
            return error;
        }
        warn!(app = %self.name, %phase, error = %error, "teardown stage failed");
        self.status.message = error.to_string();
        if let Err(persist) = self.set_phase(phase).await {
            warn!(app = %self.name, error = %persist, "failed to record teardown failure");
        }
        self.publish(
            EventType::Warning,
            reasons::STEP_FAILED,
            actions::DELETE,
            Some(error.to_string()),
        )
        .await;
        error
    }

    async fn delete_load_balancer(&mut self) -> Result<(), Error> {
        if !self.status.load_balancer_id.is_empty() {
            let lb_id = self.status.load_balancer_id.clone();
            self.delete_tolerating_gone(
                "delete_load_balancer",
                self.ctx.cloud.delete_load_balancer(&lb_id),
            )
            .await?;
            debug!(app = %self.name, %lb_id, "load balancer deleted");
        }

        self.status.load_balancer_id.clear();
        self.status.load_balancer_ip.clear();
        self.status.frontend_id.clear();
        self.status.acl_rule_ids.clear();
        self.status.advanced_routing_rule_ids.clear();
        Ok(())
    }

    async fn delete_target_groups(&mut self) -> Result<(), Error> {
        if self.status.target_group_ids.is_empty() {
            return Ok(());
        }

        let cloud = &self.ctx.cloud;
        let names: HashMap<String, String> = self
            .call("list_target_groups", cloud.list_target_groups())
            .await?
            .map_err(|e| self.cloud_error("list_target_groups", e))?
            .into_iter()
            .map(|record| (record.id, record.config.name))
            .collect();

        for tg_id in self.status.target_group_ids.clone() {
            match names.get(&tg_id) {
                Some(name) => {
                    self.delete_tolerating_gone(
                        "delete_target_group",
                        cloud.delete_target_group(&tg_id, name),
                    )
                    .await?;
                    debug!(app = %self.name, %tg_id, "target group deleted");
                }
                None => debug!(app = %self.name, %tg_id, "target group already gone"),
            }
            self.status.target_group_ids.retain(|id| *id != tg_id);
            self.persist().await?;
        }
        Ok(())
    }
}
