//! Controller runner - builds controller futures for each CRD
//!
//! Each `build_*` function returns a Vec of boxed futures that can be composed
//! by the caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use ferry_common::crd::{FerryApplication, FerryDomain};

/// Boxed controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Build the FerryApplication controller future
pub fn build_application_controllers(
    client: Client,
    ctx: Arc<ferry_application::Context>,
    workers: u16,
) -> Vec<ControllerFuture> {
    let apps: Api<FerryApplication> = Api::all(client);

    tracing::info!(workers, "- FerryApplication controller");

    vec![Box::pin(
        Controller::new(apps, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .with_config(ControllerConfig::default().concurrency(workers))
            .shutdown_on_signal()
            .run(
                ferry_application::reconcile,
                ferry_application::error_policy,
                ctx,
            )
            .for_each(log_reconcile_result("Application")),
    )]
}

/// Build the FerryDomain controller future
pub fn build_dns_controllers(
    client: Client,
    ctx: Arc<ferry_dns::Context>,
    workers: u16,
) -> Vec<ControllerFuture> {
    let domains: Api<FerryDomain> = Api::all(client);

    tracing::info!(workers, "- FerryDomain controller");

    vec![Box::pin(
        Controller::new(domains, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .with_config(ControllerConfig::default().concurrency(workers))
            .shutdown_on_signal()
            .run(ferry_dns::reconcile, ferry_dns::error_policy, ctx)
            .for_each(log_reconcile_result("Domain")),
    )]
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
