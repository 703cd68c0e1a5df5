//! `vdc-controller`: reconciles `VirtualDC`/`AutoVirtualDC` resources and
//! fronts the validating admission webhooks.
//!
//! Wiring grounded on `bin/agent_controller.rs`: parse flags, build a
//! `kube::Client`, spawn each `Controller::run` stream as an independent
//! task alongside the admission/health servers, and drain everything on
//! `SIGTERM`/Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::runtime::controller::Controller;
use kube::runtime::watcher;
use kube::{Api, Client};
use serde_json::{json, Value};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vdc_operator::admission::run_admission_server;
use vdc_operator::config::ControllerConfig;
use vdc_operator::context::Context;
use vdc_operator::crds::{AutoVirtualDC, VirtualDC};
use vdc_operator::domain::SystemClock;
use vdc_operator::leader;
use vdc_operator::watch::RealJobProcessManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vdc_operator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ControllerConfig::parse();
    config.validate()?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting vdc-controller");

    let client = Client::try_default().await?;
    info!("connected to Kubernetes cluster");

    let shutdown = CancellationToken::new();

    if config.leader_elect {
        let identity = std::env::var("POD_NAME").unwrap_or_else(|_| hostname_fallback());
        leader::acquire(&client, &config.pod_namespace, "vdc-controller-leader", &identity).await?;
        leader::spawn_renewer(
            client.clone(),
            config.pod_namespace.clone(),
            "vdc-controller-leader".to_string(),
            identity,
            shutdown.clone(),
        );
    }

    let ctx = Context::new(
        client.clone(),
        Arc::new(config.clone()),
        Arc::new(RealJobProcessManager::default()),
        Arc::new(SystemClock),
    );

    let vdc_task = tokio::spawn(run_vdc_controller(client.clone(), ctx.clone(), shutdown.clone()));
    let avdc_task = tokio::spawn(run_avdc_controller(client.clone(), ctx.clone(), shutdown.clone()));

    let admission_task = {
        let client = client.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_admission_server(client, "0.0.0.0:8443", async move {
                shutdown.cancelled().await;
            })
            .await
            {
                error!(error = %e, "admission server exited with error");
            }
        })
    };

    let health_task = {
        let shutdown = shutdown.clone();
        let bind = config.health_probe_bind_address.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(&bind, async move {
                shutdown.cancelled().await;
            })
            .await
            {
                error!(error = %e, "health server exited with error");
            }
        })
    };

    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received, draining");
            shutdown.cancel();
        }
    }

    let _ = tokio::join!(vdc_task, avdc_task, admission_task, health_task);
    info!("vdc-controller stopped");
    Ok(())
}

#[instrument(skip(client, ctx, shutdown))]
async fn run_vdc_controller(client: Client, ctx: Arc<Context>, shutdown: CancellationToken) {
    let vdcs: Api<VirtualDC> = Api::all(client.clone());
    let pods: Api<Pod> = Api::all(client.clone());
    let services: Api<Service> = Api::all(client.clone());
    let watcher_config = watcher::Config::default();

    Controller::new(vdcs, watcher_config.clone())
        .watches(pods, watcher_config.clone(), |obj| vdc_operator::vdc::owner_object_ref(obj))
        .watches(services, watcher_config, |obj| vdc_operator::vdc::owner_object_ref(obj))
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(vdc_operator::vdc::reconcile_vdc, vdc_operator::vdc::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(object) => info!(?object, "vdc reconciled"),
                Err(error) => error!(%error, "vdc reconcile error"),
            }
        })
        .instrument(tracing::info_span!("vdc_controller"))
        .await;
    info!("vdc controller stopped");
}

#[instrument(skip(client, ctx, shutdown))]
async fn run_avdc_controller(client: Client, ctx: Arc<Context>, shutdown: CancellationToken) {
    let avdcs: Api<AutoVirtualDC> = Api::all(client.clone());
    let watcher_config = watcher::Config::default();

    Controller::new(avdcs, watcher_config)
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(vdc_operator::avdc::reconcile_avdc, vdc_operator::avdc::error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(object) => info!(?object, "avdc reconciled"),
                Err(error) => error!(%error, "avdc reconcile error"),
            }
        })
        .instrument(tracing::info_span!("avdc_controller"))
        .await;
    info!("avdc controller stopped");
}

async fn run_health_server(
    bind_address: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(10))),
        );

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(addr = bind_address, "health/metrics server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn metrics() -> &'static str {
    "# vdc-controller metrics are exported via the controller's own /metrics text format\n"
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "vdc-controller".to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C"),
        () = terminate => info!("received SIGTERM"),
    }
}
