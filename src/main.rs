//! CLI entry point: bootstraps logging, the metrics/health HTTP server, and
//! the Kubernetes client, then runs the watch-and-reconcile driver until a
//! signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use prometheus_client::registry::Registry;
use tokio::signal::unix::{signal, SignalKind};

use ingrate::driver::{self, DriverConfig};
use ingrate::error::{Error, Result};
use ingrate::k8s::KubeResourceClient;
use ingrate::metrics::Metrics;
use ingrate::reconcile::{ReconcileConfig, Reconciler};
use ingrate::telemetry::{self, LogFormat};
use ingrate::templates::Renderer;

/// Identifies this process to the API server's server-side-apply conflict
/// resolution.
const FIELD_MANAGER: &str = "ingrate";

#[derive(Parser, Debug)]
#[command(name = "ingrate", about = "Derives an HAProxy configuration and rollout from watched Ingress state")]
struct Args {
    /// Repeat to lower the log level: warn -> info -> debug -> trace.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Label selector restricting which ingresses are watched.
    #[arg(short = 'l', long = "selector", default_value = "")]
    selector: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    #[arg(long = "log-format", env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[arg(long, env = "INGRATE_IMAGE", default_value = "haproxy:2.8")]
    image: String,

    #[arg(long, env = "INGRATE_REPLICAS", default_value_t = 1)]
    replicas: i32,

    /// Namespace the managed HAProxy deployment and its exposure services
    /// live in.
    namespace: String,

    /// This controller's own name, used to derive the deployment name and
    /// the `ingrate.maternity.io/name` label selector for its exposures.
    name: String,
}

struct AppState {
    registry: Registry,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut buffer = String::new();
    match prometheus_client::encoding::text::encode(&mut buffer, &state.registry) {
        Ok(()) => (StatusCode::OK, buffer),
        Err(error) => {
            tracing::error!(%error, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    telemetry::init(args.verbose, args.log_format);

    match run(args).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "ingrate exited with a fatal error");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let client = kube::Client::try_default().await.map_err(|e| Error::kube("building kube client", e))?;

    let mut registry = Registry::default();
    let metrics = Metrics::register(&mut registry);
    let state = Arc::new(AppState { registry });

    let app = Router::new().route("/metrics", get(metrics_handler)).route("/healthz", get(health_handler)).with_state(state);
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], args.port)))
        .await
        .map_err(|e| Error::Fatal(format!("binding metrics/health server on port {}: {e}", args.port)))?;
    let server = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, app).await {
            tracing::error!(%error, "metrics/health server exited");
        }
    });

    let ingress_client = KubeResourceClient::<Ingress>::new(client.clone(), FIELD_MANAGER);
    let service_client = KubeResourceClient::<Service>::new(client.clone(), FIELD_MANAGER);
    let secret_client = KubeResourceClient::<Secret>::new(client.clone(), FIELD_MANAGER);
    let configmap_client = KubeResourceClient::<ConfigMap>::new(client.clone(), FIELD_MANAGER);
    let deployment_client = KubeResourceClient::<Deployment>::new(client.clone(), FIELD_MANAGER);
    let replicaset_client = KubeResourceClient::<ReplicaSet>::new(client, FIELD_MANAGER);

    let renderer = Renderer::new()?;
    let reconcile_config = ReconcileConfig {
        namespace: args.namespace.clone(),
        ingrate_name: args.name.clone(),
        image: args.image,
        replicas: args.replicas,
    };
    let reconciler = Reconciler::new(configmap_client, deployment_client, replicaset_client, renderer, reconcile_config, metrics.clone());

    let driver_config =
        DriverConfig { label_selector: args.selector, throttle: Duration::from_millis(500), namespace: args.namespace, name: args.name };

    let mut terminate = signal(SignalKind::terminate()).map_err(|e| Error::Fatal(format!("installing SIGTERM handler: {e}")))?;

    tokio::select! {
        result = driver::run(ingress_client, service_client, secret_client, reconciler, driver_config, metrics) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }

    server.abort();
    Ok(())
}
