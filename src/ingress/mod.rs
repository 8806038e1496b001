//! HTTP ingress for webhook deliveries.
//!
//! # Endpoints
//!
//! - `POST /webhooks/github` - version-control events (signature checked)
//! - `POST /webhooks/cicd` - CI/CD notifications
//! - `POST /webhooks/deploy` - deployment notifications
//! - `GET /health` - liveness, uptime and gateway state
//! - `GET /` - service descriptor
//!
//! Any other method on a webhook path gets 405, any other path 404, both
//! with a JSON `{error}` body. Bodies above [`MAX_BODY_BYTES`] get 413.

use crate::dispatch::Dispatcher;
use crate::gateway::Gateway;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

pub mod webhooks;


pub use webhooks::IngressError;

/// Largest accepted request body. GitHub caps deliveries at 25 MB.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Shared application state, handed to every handler via `State`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Empty disables signature verification
    github_secret: String,
    dispatcher: Dispatcher,
    gateway: Gateway,
    started: Instant,
}

impl AppState {
    pub fn new(github_secret: impl Into<String>, dispatcher: Dispatcher, gateway: Gateway) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                github_secret: github_secret.into(),
                dispatcher,
                gateway,
                started: Instant::now(),
            }),
        }
    }

    pub fn github_secret(&self) -> &str {
        &self.inner.github_secret
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    pub fn uptime_secs(&self) -> f64 {
        self.inner.started.elapsed().as_secs_f64()
    }
}

/// Build the axum router for the ingress service.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(
            "/webhooks/github",
            post(webhooks::github_webhook).fallback(method_not_allowed),
        )
        .route(
            "/webhooks/cicd",
            post(webhooks::cicd_webhook).fallback(method_not_allowed),
        )
        .route(
            "/webhooks/deploy",
            post(webhooks::deploy_webhook).fallback(method_not_allowed),
        )
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime": state.uptime_secs(),
        "timestamp": Utc::now().to_rfc3339(),
        "gateway": state.gateway().state(),
    }))
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "name": "hookrelay",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /webhooks/github": "GitHub webhook events",
            "POST /webhooks/cicd": "CI/CD notifications",
            "POST /webhooks/deploy": "Deployment status",
            "GET /health": "Health check"
        }
    }))
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
