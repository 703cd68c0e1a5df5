//! `GET /status` HTTP surface for the runner.
//!
//! Registering only `get` on `/status` makes axum's `MethodRouter` answer
//! any other method with `405` on its own, so no explicit fallback is
//! needed.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;

use super::job::{Runner, StatusResponse};

#[derive(Clone)]
struct AppState {
    runner: Arc<Runner>,
}

/// Builds the `/status` router over `runner`.
pub fn router(runner: Arc<Runner>) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .with_state(AppState { runner })
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.runner.snapshot().await)
}

/// Serves the status router on `listener`, draining in-flight requests
/// once `shutdown` resolves.
pub async fn run_status_server(
    listener: tokio::net::TcpListener,
    runner: Arc<Runner>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr(), "runner status server listening");
    axum::serve(listener, router(runner))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::job::JobSpec;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    fn test_runner() -> Arc<Runner> {
        Arc::new(Runner::new(vec![JobSpec {
            name: "a".to_string(),
            command: "true".to_string(),
            args: vec![],
        }]))
    }

    #[tokio::test]
    async fn get_status_returns_200_with_job_list() {
        let app = router(test_runner());
        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["jobs"][0]["name"], "a");
        assert_eq!(body["jobs"][0]["status"], "Pending");
    }

    #[tokio::test]
    async fn post_status_returns_405() {
        let app = router(test_runner());
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_path_returns_404() {
        let app = router(test_runner());
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
