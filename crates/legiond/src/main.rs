//! legiond: runs the Legion reconciler over an in-memory resource store.
//!
//! Deployments are loaded from a manifest file at startup and reconciled
//! until Ctrl-C. Every flag has a `LEGION_*` environment fallback.

mod manifest;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use legion_core::config::{
    DEFAULT_CLUSTER_DOMAIN, DEFAULT_JWKS_URI, DEFAULT_JWT_ISSUER, DEFAULT_REQUEUE_DELAY_SECS,
};
use legion_core::{Metrics, OperatorConfig, Reconciler, RequeueScheduler, SchedulerConfig};
use legion_state::{MemoryResourceStore, ResourceStore};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "legiond")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Legion model deployment operator", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, env = "LEGION_VERBOSE")]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "LEGION_LOG_JSON")]
    json: bool,

    /// ModelDeployment manifests to load (JSON object or array)
    #[arg(short, long, env = "LEGION_MANIFESTS")]
    manifests: Option<PathBuf>,

    /// Seconds before re-checking a converging deployment
    #[arg(
        long,
        env = "LEGION_REQUEUE_DELAY_SECS",
        default_value_t = DEFAULT_REQUEUE_DELAY_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    requeue_delay_secs: u64,

    /// Namespace holding workload instances (default: the deployment's)
    #[arg(long, env = "LEGION_WORKLOAD_NAMESPACE")]
    workload_namespace: Option<String>,

    #[arg(long, env = "LEGION_CLUSTER_DOMAIN", default_value = DEFAULT_CLUSTER_DOMAIN)]
    cluster_domain: String,

    /// Capture request feedback on model routes
    #[arg(long, env = "LEGION_FEEDBACK")]
    feedback: bool,

    #[arg(long, env = "LEGION_JWT_ISSUER", default_value = DEFAULT_JWT_ISSUER)]
    jwt_issuer: String,

    #[arg(long, env = "LEGION_JWKS_URI", default_value = DEFAULT_JWKS_URI)]
    jwks_uri: String,

    /// Upper bound on deployments reconciled at once
    #[arg(long, env = "LEGION_MAX_CONCURRENT_RECONCILES", default_value_t = 4)]
    max_concurrent_reconciles: usize,
}

impl Cli {
    fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            requeue_delay_secs: self.requeue_delay_secs,
            workload_namespace: self.workload_namespace.clone(),
            cluster_domain: self.cluster_domain.clone(),
            feedback_enabled: self.feedback,
            jwt_issuer: self.jwt_issuer.clone(),
            jwks_uri: self.jwks_uri.clone(),
        }
    }

    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_reconciles: self.max_concurrent_reconciles,
            ..SchedulerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    legion_core::init_tracing(cli.json, level);

    let store = Arc::new(MemoryResourceStore::new());
    let initial = match &cli.manifests {
        Some(path) => manifest::seed_store(&store, manifest::load_manifests(path)?)?,
        None => Vec::new(),
    };
    // Subscribe after seeding: the initial resync already covers the seeds.
    let events = store.watch();

    let metrics = Arc::new(Metrics::new());
    let reconciler = Arc::new(
        Reconciler::new(Arc::clone(&store), cli.operator_config())
            .with_metrics(Arc::clone(&metrics)),
    );

    info!(
        version = legion_core::VERSION,
        deployments = initial.len(),
        "legiond started"
    );
    RequeueScheduler::new(reconciler, cli.scheduler_config())
        .run(initial, events, shutdown_signal())
        .await;

    metrics.flush();
    info!("legiond stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => warn!(error = %err, "cannot listen for ctrl-c, stopping"),
    }
}
