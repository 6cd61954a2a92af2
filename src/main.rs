//! ingress-gateway-api controller - translates nginx-annotated Ingresses
//! into Gateway API resources for a shared Envoy Gateway.

use std::sync::Arc;

use anyhow::Context as _;
use axum::{routing::get, Router};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ingress_gateway_api::api::{
    BackendTlsPolicy, BackendTrafficPolicy, ClientTrafficPolicy, HttpRoute, SecurityPolicy,
};
use ingress_gateway_api::config::Settings;
use ingress_gateway_api::controller::{error_policy, reconcile, Context};
use ingress_gateway_api::metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let settings = Settings::parse();
    tracing::info!(
        gateway_name = %settings.gateway_name,
        gateway_namespace = %settings.gateway_namespace,
        ingress_class = %settings.ingress_class,
        leader_elect = settings.leader_elect,
        "starting ingress-gateway-api controller"
    );

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("failed to create kubernetes client")?;

    serve_admin_endpoints(&settings).await?;

    let ctx = Arc::new(Context::new(client.clone(), settings));

    // Watch Ingresses; changes to owned derived resources requeue their
    // owning Ingress. ReferenceGrants live cross-namespace without an owner
    // reference and converge on Ingress events only.
    let ingresses: Api<Ingress> = Api::all(client.clone());
    tracing::info!("starting ingress controller");
    Controller::new(ingresses, WatcherConfig::default())
        .owns(Api::<HttpRoute>::all(client.clone()), WatcherConfig::default())
        .owns(
            Api::<BackendTrafficPolicy>::all(client.clone()),
            WatcherConfig::default(),
        )
        .owns(
            Api::<ClientTrafficPolicy>::all(client.clone()),
            WatcherConfig::default(),
        )
        .owns(
            Api::<SecurityPolicy>::all(client.clone()),
            WatcherConfig::default(),
        )
        .owns(Api::<BackendTlsPolicy>::all(client), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => {
                    tracing::debug!(?object, ?action, "reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("controller shutting down");
    Ok(())
}

/// Bind the health-probe and metrics listeners. Failure to bind is a startup
/// failure; failures while serving are logged and do not stop the controller.
async fn serve_admin_endpoints(settings: &Settings) -> anyhow::Result<()> {
    let health_addr = settings.health_probe_bind_addr();
    let health_router = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }));
    let health_listener = tokio::net::TcpListener::bind(&health_addr)
        .await
        .with_context(|| format!("failed to bind health probe address {health_addr}"))?;
    tracing::info!(addr = %health_addr, "health probe endpoints listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health_router).await {
            tracing::error!(error = %e, "health probe server error");
        }
    });

    let metrics_addr = settings.metrics_bind_addr();
    let metrics_router = Router::new().route("/metrics", get(|| async { metrics::gather() }));
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics address {metrics_addr}"))?;
    tracing::info!(addr = %metrics_addr, "metrics endpoint listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_router).await {
            tracing::error!(error = %e, "metrics server error");
        }
    });

    Ok(())
}
