//! Test fixtures: sample objects, an in-memory provider and a context harness

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ferry_cloud::types::{
    AclRuleParams, BackendParams, CreatedLoadBalancer, FrontendParams, FrontendRecord,
    LoadBalancerParams, LoadBalancerRecord, RoutingRuleParams, TargetGroupParams,
    TargetGroupRecord,
};
use ferry_cloud::{CloudResult, LoadBalancerApi};
use ferry_common::crd::{
    AclRuleSpec, ApplicationPhase, FerryApplication, FerryApplicationSpec, FerryApplicationStatus,
    FrontendSpec, HealthCheckSpec, LoadBalancerSpec, LoadBalancerType, RoutingRuleSpec,
    TargetGroupSpec,
};
use ferry_common::events::RecordingEventPublisher;
use ferry_common::kube_utils::StaticClusterIdentity;
use ferry_common::{CloudError, CloudErrorKind};
use kube::api::ObjectMeta;
use tokio_util::sync::CancellationToken;

use crate::controller::{Context, MockApplicationStore};
use crate::engine::EngineSettings;

/// IP the fake provider assigns once a load balancer is read back
pub(crate) const FAKE_LB_IP: &str = "203.0.113.10";

// =============================================================================
// Fixtures
// =============================================================================

fn sample_frontend() -> FrontendSpec {
    FrontendSpec {
        name: "fe".to_string(),
        protocol: "http".to_string(),
        port: 80,
        algorithm: "roundrobin".to_string(),
        redirect_https: false,
        cookie: false,
        certificate_name: None,
    }
}

pub(crate) fn target_group(name: &str, protocol: &str, port: u16) -> TargetGroupSpec {
    TargetGroupSpec {
        name: name.to_string(),
        protocol: protocol.to_string(),
        port,
        health_check: HealthCheckSpec::default(),
    }
}

/// Application load balancer with one target group and one routed ACL
pub(crate) fn sample_app() -> FerryApplication {
    FerryApplication {
        metadata: ObjectMeta {
            name: Some("web".to_string()),
            namespace: Some("default".to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: FerryApplicationSpec {
            load_balancer: LoadBalancerSpec {
                lb_type: LoadBalancerType::Application,
                region: "inmumbaizone2".to_string(),
                name: "lb1".to_string(),
                frontend: Some(sample_frontend()),
                acl_rules: vec![AclRuleSpec {
                    name: "api".to_string(),
                    condition_type: "http_path_beg".to_string(),
                    value: vec!["/api".to_string()],
                }],
                advanced_routing_rules: vec![RoutingRuleSpec {
                    acl_name: "api".to_string(),
                    target_group_name: "tg1".to_string(),
                    route_condition: true,
                }],
                backend_port: None,
            },
            target_groups: vec![target_group("tg1", "http", 80)],
        },
        status: None,
    }
}

/// Network load balancer forwarding to a cluster port
pub(crate) fn network_app() -> FerryApplication {
    let mut app = sample_app();
    app.spec.load_balancer.lb_type = LoadBalancerType::Network;
    app.spec.load_balancer.backend_port = Some(30080);
    app.spec.load_balancer.acl_rules.clear();
    app.spec.load_balancer.advanced_routing_rules.clear();
    app.spec.target_groups.clear();
    app
}

// =============================================================================
// Fake Provider
// =============================================================================

#[derive(Default)]
struct FakeLoadBalancer {
    frontends: Vec<FrontendRecord>,
    acls: BTreeMap<String, String>,
    routes: HashSet<String>,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    load_balancers: BTreeMap<String, FakeLoadBalancer>,
    attached_lbs: HashSet<String>,
    target_groups: Vec<TargetGroupRecord>,
    attached_tgs: HashSet<String>,
    certificates: HashMap<String, String>,
    calls: Vec<(String, String)>,
    fail_next: HashMap<String, VecDeque<CloudError>>,
    fail_always: HashMap<String, CloudError>,
    cancel_after: HashMap<String, CancellationToken>,
}

impl FakeState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

fn gone(kind: CloudErrorKind, what: &str) -> CloudError {
    CloudError::new(kind, format!("{what} not found"))
}

/// In-memory provider that logs every call and answers with real sentinels
#[derive(Default)]
pub(crate) struct FakeCloud {
    state: Mutex<FakeState>,
}

impl FakeCloud {
    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("mutex should not be poisoned")
    }

    /// Log the call, then apply any injected failure or cancellation
    fn enter(&self, op: &str, arg: &str) -> Result<std::sync::MutexGuard<'_, FakeState>, CloudError> {
        let mut state = self.lock();
        state.calls.push((op.to_string(), arg.to_string()));
        if let Some(token) = state.cancel_after.get(op) {
            token.cancel();
        }
        if let Some(err) = state.fail_next.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(err) = state.fail_always.get(op) {
            return Err(err.clone());
        }
        Ok(state)
    }

    pub(crate) fn fail_next(&self, op: &str, err: CloudError) {
        self.lock()
            .fail_next
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    pub(crate) fn fail_always(&self, op: &str, err: CloudError) {
        self.lock().fail_always.insert(op.to_string(), err);
    }

    /// Cancel `token` while `op` runs; the call itself still succeeds
    pub(crate) fn cancel_after(&self, op: &str, token: CancellationToken) {
        self.lock().cancel_after.insert(op.to_string(), token);
    }

    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.lock().calls.clone()
    }

    pub(crate) fn count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|(o, _)| o == op).count()
    }

    pub(crate) fn args(&self, op: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|(o, _)| o == op)
            .map(|(_, arg)| arg.clone())
            .collect()
    }

    /// Calls that change provider state, in order
    pub(crate) fn mutating_ops(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .map(|(op, _)| op.clone())
            .filter(|op| {
                !op.starts_with("read_") && !op.starts_with("list_") && !op.starts_with("lookup_")
            })
            .collect()
    }

    pub(crate) fn tg_id(&self, name: &str) -> Option<String> {
        self.lock()
            .target_groups
            .iter()
            .find(|tg| tg.config.name == name)
            .map(|tg| tg.id.clone())
    }

    pub(crate) fn frontend(&self, lb_id: &str, frontend_id: &str) -> Option<FrontendRecord> {
        self.lock()
            .load_balancers
            .get(lb_id)?
            .frontends
            .iter()
            .find(|fe| fe.id == frontend_id)
            .cloned()
    }

    pub(crate) fn acl_count(&self, lb_id: &str) -> usize {
        self.lock()
            .load_balancers
            .get(lb_id)
            .map(|lb| lb.acls.len())
            .unwrap_or(0)
    }

    pub(crate) fn seed_load_balancer(&self, _name: &str) -> String {
        let mut state = self.lock();
        let id = state.id("lb");
        state
            .load_balancers
            .insert(id.clone(), FakeLoadBalancer::default());
        id
    }

    /// Seed a frontend matching the sample application's frontend
    pub(crate) fn seed_frontend(&self, lb_id: &str, name: &str) -> String {
        let mut state = self.lock();
        let id = state.id("fe");
        let spec = FrontendSpec {
            name: name.to_string(),
            ..sample_frontend()
        };
        let record = frontend_record(&id, &FrontendParams::from_spec(&spec, None));
        if let Some(lb) = state.load_balancers.get_mut(lb_id) {
            lb.frontends.push(record);
        }
        id
    }

    pub(crate) fn seed_target_group(&self, name: &str, protocol: &str, port: u16) -> String {
        let mut state = self.lock();
        let id = state.id("tg");
        state.target_groups.push(TargetGroupRecord {
            id: id.clone(),
            config: TargetGroupParams::from(&target_group(name, protocol, port)),
        });
        id
    }

    pub(crate) fn seed_certificate(&self, name: &str, id: &str) {
        self.lock()
            .certificates
            .insert(name.to_string(), id.to_string());
    }

    pub(crate) fn seed_acl(&self, lb_id: &str, name: &str) -> String {
        let mut state = self.lock();
        let id = state.id("acl");
        if let Some(lb) = state.load_balancers.get_mut(lb_id) {
            lb.acls.insert(id.clone(), name.to_string());
        }
        id
    }
}

fn frontend_record(id: &str, params: &FrontendParams) -> FrontendRecord {
    FrontendRecord {
        id: id.to_string(),
        name: params.name.clone(),
        protocol: params.protocol.clone(),
        port: params.port,
        algorithm: params.algorithm.clone(),
        redirect_https: params.redirect_https,
        cookie: params.cookie,
        certificate_id: params.certificate_id.clone(),
    }
}

#[async_trait]
impl LoadBalancerApi for FakeCloud {
    async fn create_load_balancer(
        &self,
        params: &LoadBalancerParams,
    ) -> CloudResult<CreatedLoadBalancer> {
        let mut state = self.enter("create_load_balancer", &params.name)?;
        let id = state.id("lb");
        state
            .load_balancers
            .insert(id.clone(), FakeLoadBalancer::default());
        Ok(CreatedLoadBalancer {
            id,
            ip: String::new(),
        })
    }

    async fn read_load_balancer(&self, id: &str) -> CloudResult<LoadBalancerRecord> {
        let state = self.enter("read_load_balancer", id)?;
        let lb = state
            .load_balancers
            .get(id)
            .ok_or_else(|| gone(CloudErrorKind::NotFound, "load balancer"))?;
        Ok(LoadBalancerRecord {
            id: id.to_string(),
            name: String::new(),
            ip: FAKE_LB_IP.to_string(),
            frontends: lb.frontends.clone(),
        })
    }

    async fn delete_load_balancer(&self, id: &str) -> CloudResult<()> {
        let mut state = self.enter("delete_load_balancer", id)?;
        state
            .load_balancers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| gone(CloudErrorKind::AlreadyDeleted, "load balancer"))
    }

    async fn create_frontend(&self, lb_id: &str, params: &FrontendParams) -> CloudResult<String> {
        let mut state = self.enter("create_frontend", lb_id)?;
        let id = state.id("fe");
        let lb = state
            .load_balancers
            .get_mut(lb_id)
            .ok_or_else(|| gone(CloudErrorKind::NotFound, "load balancer"))?;
        lb.frontends.push(frontend_record(&id, params));
        Ok(id)
    }

    async fn read_frontend(&self, lb_id: &str, frontend_id: &str) -> CloudResult<FrontendRecord> {
        let state = self.enter("read_frontend", frontend_id)?;
        state
            .load_balancers
            .get(lb_id)
            .and_then(|lb| lb.frontends.iter().find(|fe| fe.id == frontend_id))
            .cloned()
            .ok_or_else(|| gone(CloudErrorKind::NotFound, "frontend"))
    }

    async fn update_frontend(
        &self,
        lb_id: &str,
        frontend_id: &str,
        params: &FrontendParams,
    ) -> CloudResult<()> {
        let mut state = self.enter("update_frontend", frontend_id)?;
        let frontend = state
            .load_balancers
            .get_mut(lb_id)
            .and_then(|lb| lb.frontends.iter_mut().find(|fe| fe.id == frontend_id))
            .ok_or_else(|| gone(CloudErrorKind::NotFound, "frontend"))?;
        *frontend = frontend_record(frontend_id, params);
        Ok(())
    }

    async fn create_target_group(&self, params: &TargetGroupParams) -> CloudResult<String> {
        let mut state = self.enter("create_target_group", &params.name)?;
        if state.target_groups.iter().any(|tg| tg.config.name == params.name) {
            return Err(CloudError::new(
                CloudErrorKind::AlreadyExists,
                "target group with the same name already exists",
            ));
        }
        let id = state.id("tg");
        state.target_groups.push(TargetGroupRecord {
            id: id.clone(),
            config: params.clone(),
        });
        Ok(id)
    }

    async fn list_target_groups(&self) -> CloudResult<Vec<TargetGroupRecord>> {
        let state = self.enter("list_target_groups", "")?;
        Ok(state.target_groups.clone())
    }

    async fn update_target_group(&self, id: &str, params: &TargetGroupParams) -> CloudResult<()> {
        let mut state = self.enter("update_target_group", id)?;
        let record = state
            .target_groups
            .iter_mut()
            .find(|tg| tg.id == id)
            .ok_or_else(|| gone(CloudErrorKind::NotFound, "target group"))?;
        record.config = params.clone();
        Ok(())
    }

    async fn delete_target_group(&self, id: &str, _name: &str) -> CloudResult<()> {
        let mut state = self.enter("delete_target_group", id)?;
        let before = state.target_groups.len();
        state.target_groups.retain(|tg| tg.id != id);
        if state.target_groups.len() == before {
            return Err(gone(CloudErrorKind::AlreadyDeleted, "target group"));
        }
        state.attached_tgs.remove(id);
        Ok(())
    }

    async fn create_acl_rule(
        &self,
        lb_id: &str,
        _frontend_id: &str,
        params: &AclRuleParams,
    ) -> CloudResult<String> {
        let mut state = self.enter("create_acl_rule", &params.name)?;
        let id = state.id("acl");
        let lb = state
            .load_balancers
            .get_mut(lb_id)
            .ok_or_else(|| gone(CloudErrorKind::NotFound, "load balancer"))?;
        lb.acls.insert(id.clone(), params.name.clone());
        Ok(id)
    }

    async fn delete_acl_rule(&self, lb_id: &str, acl_id: &str) -> CloudResult<()> {
        let mut state = self.enter("delete_acl_rule", acl_id)?;
        state
            .load_balancers
            .get_mut(lb_id)
            .and_then(|lb| lb.acls.remove(acl_id))
            .map(|_| ())
            .ok_or_else(|| gone(CloudErrorKind::AlreadyDeleted, "acl rule"))
    }

    async fn create_routing_rule(
        &self,
        lb_id: &str,
        params: &RoutingRuleParams,
    ) -> CloudResult<String> {
        let mut state = self.enter("create_routing_rule", &params.acl_id)?;
        let id = state.id("route");
        let lb = state
            .load_balancers
            .get_mut(lb_id)
            .ok_or_else(|| gone(CloudErrorKind::NotFound, "load balancer"))?;
        lb.routes.insert(id.clone());
        Ok(id)
    }

    async fn delete_routing_rule(&self, lb_id: &str, rule_id: &str) -> CloudResult<()> {
        let mut state = self.enter("delete_routing_rule", rule_id)?;
        let removed = state
            .load_balancers
            .get_mut(lb_id)
            .is_some_and(|lb| lb.routes.remove(rule_id));
        if removed {
            Ok(())
        } else {
            Err(gone(CloudErrorKind::AlreadyDeleted, "routing rule"))
        }
    }

    async fn create_backend(&self, lb_id: &str, _params: &BackendParams) -> CloudResult<String> {
        let mut state = self.enter("create_backend", lb_id)?;
        Ok(state.id("backend"))
    }

    async fn attach_load_balancer(&self, lb_id: &str, _cluster_id: &str) -> CloudResult<()> {
        let mut state = self.enter("attach_load_balancer", lb_id)?;
        if !state.attached_lbs.insert(lb_id.to_string()) {
            return Err(CloudError::new(
                CloudErrorKind::AlreadyAttached,
                "load balancer is already part of this cluster",
            ));
        }
        Ok(())
    }

    async fn attach_target_group(&self, tg_id: &str, _cluster_id: &str) -> CloudResult<()> {
        let mut state = self.enter("attach_target_group", tg_id)?;
        if !state.attached_tgs.insert(tg_id.to_string()) {
            return Err(CloudError::new(
                CloudErrorKind::AlreadyAttached,
                "target group is already part of this cluster",
            ));
        }
        Ok(())
    }

    async fn lookup_certificate_id(&self, name: &str) -> CloudResult<String> {
        let state = self.enter("lookup_certificate_id", name)?;
        state
            .certificates
            .get(name)
            .cloned()
            .ok_or_else(|| gone(CloudErrorKind::NotFound, "certificate"))
    }
}

// =============================================================================
// Context Harness
// =============================================================================

/// Captures status updates for verification
#[derive(Clone, Default)]
pub(crate) struct StatusCapture {
    updates: Arc<Mutex<Vec<FerryApplicationStatus>>>,
}

impl StatusCapture {
    fn record(&self, status: FerryApplicationStatus) {
        self.updates
            .lock()
            .expect("mutex should not be poisoned")
            .push(status);
    }

    pub(crate) fn phases(&self) -> Vec<ApplicationPhase> {
        self.updates
            .lock()
            .expect("mutex should not be poisoned")
            .iter()
            .map(|s| s.phase)
            .collect()
    }

    pub(crate) fn statuses(&self) -> Vec<FerryApplicationStatus> {
        self.updates
            .lock()
            .expect("mutex should not be poisoned")
            .clone()
    }

    pub(crate) fn last(&self) -> Option<FerryApplicationStatus> {
        self.updates
            .lock()
            .expect("mutex should not be poisoned")
            .last()
            .cloned()
    }
}

/// A test context wired to a [`FakeCloud`] and a capturing store
pub(crate) struct Harness {
    pub(crate) cloud: Arc<FakeCloud>,
    pub(crate) events: Arc<RecordingEventPublisher>,
    pub(crate) capture: StatusCapture,
    pub(crate) ctx: Arc<Context>,
    finalizer_added: Arc<AtomicBool>,
    finalizer_removed: Arc<AtomicBool>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub(crate) fn with_settings(settings: EngineSettings) -> Self {
        let cloud = Arc::new(FakeCloud::default());
        let events = Arc::new(RecordingEventPublisher::new());
        let capture = StatusCapture::default();
        let finalizer_added = Arc::new(AtomicBool::new(false));
        let finalizer_removed = Arc::new(AtomicBool::new(false));

        let mut store = MockApplicationStore::new();
        let capture_clone = capture.clone();
        store.expect_patch_status().returning(move |_, _, status| {
            capture_clone.record(status.clone());
            Ok(())
        });
        let added = finalizer_added.clone();
        store.expect_add_finalizer().returning(move |_, _| {
            added.store(true, Ordering::SeqCst);
            Ok(())
        });
        let removed = finalizer_removed.clone();
        store.expect_remove_finalizer().returning(move |_, _| {
            removed.store(true, Ordering::SeqCst);
            Ok(())
        });

        let ctx = Arc::new(Context::for_testing(
            Arc::new(store),
            cloud.clone(),
            Arc::new(StaticClusterIdentity("cluster-1".to_string())),
            events.clone(),
            settings,
        ));

        Self {
            cloud,
            events,
            capture,
            ctx,
            finalizer_added,
            finalizer_removed,
        }
    }

    /// The object as the next watch event would deliver it
    pub(crate) fn app_with_last_status(&self, app: &FerryApplication) -> FerryApplication {
        let mut next = app.clone();
        next.status = self.capture.last();
        next
    }

    pub(crate) fn finalizer_added(&self) -> bool {
        self.finalizer_added.load(Ordering::SeqCst)
    }

    pub(crate) fn finalizer_removed(&self) -> bool {
        self.finalizer_removed.load(Ordering::SeqCst)
    }
}
