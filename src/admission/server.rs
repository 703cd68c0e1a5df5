//! The admission webhook HTTP server.
//!
//! Wiring grounded on `bin/agent_controller.rs`'s `axum::Router` +
//! `tower-http` layer stack; `AppState` here plays the same role as that
//! file's `AppState` (a `kube::Client` plus whatever config a handler
//! needs).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use kube::api::Api;
use kube::Client;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::admission::types::{AdmissionResponse, AdmissionReview};
use crate::admission::{avdc, vdc};
use crate::crds::{AutoVirtualDC, VirtualDC};

#[derive(Clone)]
struct AppState {
    client: Client,
}

pub async fn run_admission_server(
    client: Client,
    bind_address: &str,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState { client });

    let app = Router::new()
        .route("/validate-virtualdc", post(validate_virtualdc))
        .route("/validate-autovirtualdc", post(validate_autovirtualdc))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(Duration::from_secs(10))),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn validate_virtualdc(
    State(state): State<Arc<AppState>>,
    Json(review): Json<AdmissionReview>,
) -> Json<AdmissionReview> {
    let Some(request) = review.request else {
        return Json(AdmissionResponse::allow(String::new()).into_review());
    };
    let uid = request.uid.clone();

    let object: Result<VirtualDC, _> = request
        .object
        .clone()
        .map(serde_json::from_value)
        .unwrap_or_else(|| Err(serde::de::Error::custom("missing object")));

    let object = match object {
        Ok(o) => o,
        Err(e) => {
            warn!(error = %e, "failed to decode VirtualDC admission object");
            return Json(AdmissionResponse::deny(uid, &[crate::admission::types::FieldError {
                field: "object".to_string(),
                message: e.to_string(),
            }]).into_review());
        }
    };

    // Name uniqueness (spec.md invariant 1 / §4.6) is enforced across the
    // whole cluster, not per namespace, so the collision-check Apis are
    // cluster-wide rather than `object`'s own namespace.
    let vdcs: Api<VirtualDC> = Api::all(state.client.clone());
    let avdcs: Api<AutoVirtualDC> = Api::all(state.client.clone());

    let result = if request.operation == "UPDATE" {
        let old: Option<VirtualDC> = request.old_object.and_then(|v| serde_json::from_value(v).ok());
        match old {
            Some(old) => vdc::validate_update(&old, &object),
            None => Ok(()),
        }
    } else {
        vdc::validate_create(&object, &vdcs, &avdcs).await
    };

    Json(match result {
        Ok(()) => AdmissionResponse::allow(uid).into_review(),
        Err(errors) => AdmissionResponse::deny(uid, &errors).into_review(),
    })
}

async fn validate_autovirtualdc(
    State(state): State<Arc<AppState>>,
    Json(review): Json<AdmissionReview>,
) -> Json<AdmissionReview> {
    let Some(request) = review.request else {
        return Json(AdmissionResponse::allow(String::new()).into_review());
    };
    let uid = request.uid.clone();

    let object: Result<AutoVirtualDC, _> = request
        .object
        .clone()
        .map(serde_json::from_value)
        .unwrap_or_else(|| Err(serde::de::Error::custom("missing object")));

    let object = match object {
        Ok(o) => o,
        Err(e) => {
            warn!(error = %e, "failed to decode AutoVirtualDC admission object");
            return Json(AdmissionResponse::deny(uid, &[crate::admission::types::FieldError {
                field: "object".to_string(),
                message: e.to_string(),
            }]).into_review());
        }
    };

    // Name uniqueness (spec.md invariant 1 / §4.6) is enforced across the
    // whole cluster, not per namespace, so the collision-check Apis are
    // cluster-wide rather than `object`'s own namespace.
    let vdcs: Api<VirtualDC> = Api::all(state.client.clone());
    let avdcs: Api<AutoVirtualDC> = Api::all(state.client.clone());

    let result = if request.operation == "UPDATE" {
        let old: Option<AutoVirtualDC> = request.old_object.and_then(|v| serde_json::from_value(v).ok());
        match old {
            Some(old) => avdc::validate_update(&old, &object),
            None => Ok(()),
        }
    } else {
        avdc::validate_create(&object, &vdcs, &avdcs).await
    };

    Json(match result {
        Ok(()) => AdmissionResponse::allow(uid).into_review(),
        Err(errors) => AdmissionResponse::deny(uid, &errors).into_review(),
    })
}
