//! Test fixtures: a sample domain, an in-memory DNS provider and a context harness

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ferry_cloud::types::DnsRecordParams;
use ferry_cloud::{CloudResult, DnsApi};
use ferry_common::crd::{DnsPhase, DnsRecordSpec, FerryDomain, FerryDomainSpec, FerryDomainStatus};
use ferry_common::events::RecordingEventPublisher;
use ferry_common::{CloudError, CloudErrorKind};
use kube::api::ObjectMeta;

use crate::controller::{Context, MockDomainStore};

fn record(hostname: &str, record_type: &str, value: &str) -> DnsRecordSpec {
    DnsRecordSpec {
        hostname: hostname.to_string(),
        record_type: record_type.to_string(),
        ttl: 300,
        value: value.to_string(),
        priority: None,
        port: None,
        port_type: None,
        weight: None,
    }
}

/// example.com with an A record and a CNAME
pub(crate) fn sample_domain() -> FerryDomain {
    FerryDomain {
        metadata: ObjectMeta {
            name: Some("example".to_string()),
            namespace: Some("default".to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: FerryDomainSpec {
            domain: "example.com".to_string(),
            records: vec![
                record("www", "A", "203.0.113.10"),
                record("blog", "CNAME", "web.example.net"),
            ],
        },
        status: None,
    }
}

// =============================================================================
// Fake Provider
// =============================================================================

#[derive(Default)]
struct DnsState {
    next_id: u64,
    zones: HashMap<String, BTreeMap<String, DnsRecordParams>>,
    calls: Vec<String>,
    creates: usize,
    fail_next: HashMap<String, VecDeque<CloudError>>,
    fail_create_at: Option<(usize, CloudError)>,
}

#[derive(Default)]
pub(crate) struct FakeDns {
    state: Mutex<DnsState>,
}

impl FakeDns {
    fn lock(&self) -> std::sync::MutexGuard<'_, DnsState> {
        self.state.lock().expect("mutex should not be poisoned")
    }

    fn enter(&self, op: &str) -> Result<std::sync::MutexGuard<'_, DnsState>, CloudError> {
        let mut state = self.lock();
        state.calls.push(op.to_string());
        if let Some(err) = state.fail_next.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
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

    /// Fail the `n`th create_record call (1-based)
    pub(crate) fn fail_nth_create(&self, n: usize, err: CloudError) {
        self.lock().fail_create_at = Some((n, err));
    }

    pub(crate) fn seed_domain(&self, domain: &str) {
        self.lock().zones.entry(domain.to_string()).or_default();
    }

    pub(crate) fn ops(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == op).count()
    }

    pub(crate) fn has_domain(&self, domain: &str) -> bool {
        self.lock().zones.contains_key(domain)
    }

    pub(crate) fn record_count(&self, domain: &str) -> usize {
        self.lock().zones.get(domain).map(BTreeMap::len).unwrap_or(0)
    }
}

#[async_trait]
impl DnsApi for FakeDns {
    async fn create_domain(&self, domain: &str) -> CloudResult<()> {
        let mut state = self.enter("create_domain")?;
        if state.zones.contains_key(domain) {
            return Err(CloudError::new(
                CloudErrorKind::AlreadyExists,
                format!("Domain {domain} already exits in dns zones"),
            ));
        }
        state.zones.insert(domain.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_domain(&self, domain: &str) -> CloudResult<()> {
        let mut state = self.enter("delete_domain")?;
        state
            .zones
            .remove(domain)
            .map(|_| ())
            .ok_or_else(|| CloudError::not_found(format!("domain {domain} not found")))
    }

    async fn create_record(&self, domain: &str, params: &DnsRecordParams) -> CloudResult<String> {
        let mut state = self.enter("create_record")?;
        state.creates += 1;
        let attempt = state.creates;
        if let Some((n, err)) = state.fail_create_at.take() {
            if n == attempt {
                return Err(err);
            }
            state.fail_create_at = Some((n, err));
        }

        state.next_id += 1;
        let id = format!("rec-{}", state.next_id);
        let zone = state
            .zones
            .get_mut(domain)
            .ok_or_else(|| CloudError::not_found(format!("domain {domain} not found")))?;
        zone.insert(id.clone(), params.clone());
        Ok(id)
    }

    async fn delete_record(&self, domain: &str, record_id: &str) -> CloudResult<()> {
        let mut state = self.enter("delete_record")?;
        state
            .zones
            .get_mut(domain)
            .and_then(|zone| zone.remove(record_id))
            .map(|_| ())
            .ok_or_else(|| CloudError::not_found(format!("record {record_id} not found")))
    }
}

// =============================================================================
// Context Harness
// =============================================================================

/// Captures status updates for verification
#[derive(Clone, Default)]
pub(crate) struct StatusCapture {
    updates: Arc<Mutex<Vec<FerryDomainStatus>>>,
}

impl StatusCapture {
    fn record(&self, status: FerryDomainStatus) {
        self.updates
            .lock()
            .expect("mutex should not be poisoned")
            .push(status);
    }

    pub(crate) fn phases(&self) -> Vec<DnsPhase> {
        self.updates
            .lock()
            .expect("mutex should not be poisoned")
            .iter()
            .map(|s| s.phase)
            .collect()
    }

    pub(crate) fn last(&self) -> Option<FerryDomainStatus> {
        self.updates
            .lock()
            .expect("mutex should not be poisoned")
            .last()
            .cloned()
    }
}

pub(crate) struct Harness {
    pub(crate) dns: Arc<FakeDns>,
    pub(crate) events: Arc<RecordingEventPublisher>,
    pub(crate) capture: StatusCapture,
    pub(crate) ctx: Arc<Context>,
    finalizer_added: Arc<AtomicBool>,
    finalizer_removed: Arc<AtomicBool>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let dns = Arc::new(FakeDns::default());
        let events = Arc::new(RecordingEventPublisher::new());
        let capture = StatusCapture::default();
        let finalizer_added = Arc::new(AtomicBool::new(false));
        let finalizer_removed = Arc::new(AtomicBool::new(false));

        let mut store = MockDomainStore::new();
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
            dns.clone(),
            events.clone(),
        ));

        Self {
            dns,
            events,
            capture,
            ctx,
            finalizer_added,
            finalizer_removed,
        }
    }

    pub(crate) fn domain_with_last_status(&self, domain: &FerryDomain) -> FerryDomain {
        let mut next = domain.clone();
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
