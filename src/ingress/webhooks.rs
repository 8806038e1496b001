//! Webhook endpoint handlers.
//!
//! Each handler reads the raw body, classifies the delivery, parses the
//! JSON, normalizes it into an [`Event`] and dispatches that event to the
//! pending log, the gateway and the notification log. Only two things fail
//! a request: a bad GitHub signature (401) and a body that is not JSON
//! (500). A payload the mapper cannot make sense of still produces a
//! synthetic `error` event and a 200.

use super::AppState;
use crate::detect::{CI_DETECTOR, DEPLOY_DETECTOR};
use crate::event::Event;
use crate::normalize::github::{self, GithubEventKind};
use crate::normalize::{cicd, deploy, Normalized};
use crate::signature::{self, SIGNATURE_HEADER};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Header carrying GitHub's delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Caller-supplied correlation ID.
const HEADER_CORRELATION: &str = "x-correlation-id";

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("{0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl IntoResponse for IngressError {
    fn into_response(self) -> Response {
        let status = match &self {
            IngressError::InvalidSignature => StatusCode::UNAUTHORIZED,
            IngressError::InvalidJson(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn correlation_id(headers: &HeaderMap) -> String {
    header_str(headers, HEADER_DELIVERY)
        .or_else(|| header_str(headers, HEADER_CORRELATION))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Tag the event with its correlation ID and run it through every sink.
async fn deliver(state: &AppState, normalized: Normalized, headers: &HeaderMap) -> Event {
    if let Some(error) = normalized.error() {
        warn!(error = %error, "Payload could not be mapped, emitting error event");
    }

    let event = normalized.into_event().with_correlation_id(correlation_id(headers));
    let result = state.dispatcher().dispatch(&event).await;
    debug!(
        correlation_id = ?event.correlation_id,
        effects = result.effects_executed,
        failures = result.failure_count(),
        "Event delivered"
    );
    event
}

/// `POST /webhooks/github`
///
/// - 200 `{received, event, processed}`
/// - 401 `{error: "Invalid signature"}` when a secret is configured and the
///   `X-Hub-Signature-256` header is missing or wrong
/// - 500 `{error}` when the body is not JSON
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, IngressError> {
    // Verify the signature before parsing anything.
    let provided = header_str(&headers, SIGNATURE_HEADER);
    if !signature::verify(&body, provided, state.github_secret()) {
        warn!(
            has_signature = provided.is_some(),
            "GitHub webhook signature verification failed"
        );
        return Err(IngressError::InvalidSignature);
    }

    let event_name = header_str(&headers, github::EVENT_HEADER).unwrap_or("unknown");
    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "GitHub webhook body is not JSON");
        IngressError::from(e)
    })?;

    let kind = GithubEventKind::from_header(event_name);
    let event = deliver(&state, github::normalize(&kind, &payload, Utc::now()), &headers).await;

    info!(
        event = %event_name,
        event_type = %event.kind,
        title = %event.title,
        "GitHub event processed"
    );

    Ok(Json(json!({
        "received": true,
        "event": event_name,
        "processed": event.kind,
    })))
}

/// `POST /webhooks/cicd`. The provider is detected from the `User-Agent`.
pub async fn cicd_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, IngressError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "CI/CD webhook body is not JSON");
        IngressError::from(e)
    })?;

    let provider = CI_DETECTOR.detect(&headers, &String::from_utf8_lossy(&body));
    let event = deliver(&state, cicd::normalize(provider, &payload, Utc::now()), &headers).await;

    info!(
        provider = %provider,
        event_type = %event.kind,
        title = %event.title,
        "CI/CD event processed"
    );

    Ok(Json(json!({
        "received": true,
        "provider": provider,
        "processed": event.kind,
    })))
}

/// `POST /webhooks/deploy`. The platform is detected from the `User-Agent`
/// and body markers.
pub async fn deploy_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, IngressError> {
    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Deploy webhook body is not JSON");
        IngressError::from(e)
    })?;

    let platform = DEPLOY_DETECTOR.detect(&headers, &String::from_utf8_lossy(&body));
    let event = deliver(&state, deploy::normalize(platform, &payload, Utc::now()), &headers).await;

    info!(
        platform = %platform,
        event_type = %event.kind,
        title = %event.title,
        "Deploy event processed"
    );

    Ok(Json(json!({
        "received": true,
        "platform": platform,
        "processed": event.kind,
    })))
}
