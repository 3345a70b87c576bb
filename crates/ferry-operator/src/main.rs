//! ferry operator - load balancer and DNS convergence for Kubernetes

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::Client;
use tokio_util::sync::CancellationToken;

use ferry_cloud::HttpCloudClient;
use ferry_common::kube_utils::{ClusterIdentity, NodeLabelClusterIdentity, StaticClusterIdentity};
use ferry_common::telemetry::init_telemetry;
use ferry_operator::controller_runner::{build_application_controllers, build_dns_controllers};
use ferry_operator::crds::{crd_yaml, ensure_crds_installed};
use ferry_operator::OperatorConfig;

/// ferry - phase-driven convergence of cloud load balancers and DNS zones
#[derive(Parser, Debug)]
#[command(name = "ferry", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the FerryApplication and FerryDomain controllers (default mode)
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let yaml = crd_yaml().map_err(|e| anyhow::anyhow!("Failed to serialize CRDs: {}", e))?;
        println!("{yaml}");
        return Ok(());
    }

    init_telemetry(cli.config.telemetry())?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    let settings = config.engine_settings()?;
    tracing::info!(
        stage_order = %settings.stage_order,
        chain_phases = settings.chain_phases,
        "starting ferry operator"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let cloud = Arc::new(HttpCloudClient::new(
        &config.api_url,
        config.require_api_key()?,
        config.http_timeout(),
    )?);

    let identity: Arc<dyn ClusterIdentity> = match config.cluster_id.clone() {
        Some(id) => {
            tracing::info!(cluster_id = %id, "using configured cluster ID");
            Arc::new(StaticClusterIdentity(id))
        }
        None => Arc::new(NodeLabelClusterIdentity::new(
            client.clone(),
            config.cluster_id_label.clone(),
        )),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let app_ctx = ferry_application::Context::builder(client.clone(), cloud.clone())
        .identity(identity)
        .backoff(config.backoff())
        .settings(settings)
        .shutdown(shutdown.clone())
        .build();
    let dns_ctx = ferry_dns::Context::builder(client.clone(), cloud)
        .backoff(config.backoff())
        .reconcile_timeout(config.reconcile_timeout())
        .shutdown(shutdown)
        .build();

    tracing::info!("Starting controllers:");
    let mut controllers =
        build_application_controllers(client.clone(), Arc::new(app_ctx), config.num_workers);
    controllers.extend(build_dns_controllers(
        client,
        Arc::new(dns_ctx),
        config.dns_workers,
    ));

    futures::future::join_all(controllers).await;
    tracing::info!("controllers stopped");
    Ok(())
}

/// Cancel in-flight reconciles when the process is asked to stop
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                token.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown requested, cancelling in-flight reconciles");
    token.cancel();
}
