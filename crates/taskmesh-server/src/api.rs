/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Relay HTTP Surface
//!
//! - `POST /api/v1/events` — publish an event envelope
//! - `GET  /api/v1/events/subscribe` — streaming subscription (SSE); the
//!   `kinds` query parameter is a comma-separated kind list, every other
//!   parameter becomes a filter (`source_service` matches the envelope
//!   source, the rest match metadata)
//! - `GET  /healthz` — liveness (allowlisted)
//! - `GET  /metrics` — Prometheus exposition (allowlisted)
//!
//! Every non-allowlisted route requires a bearer token; the middleware in
//! [`crate::auth_layer`] validates it and attaches the claims.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use taskmesh::models::event::Event;
use taskmesh::relay::{EventRelay, RelayError, SubscriptionFilter};

/// Shared state behind the router.
#[derive(Clone)]
pub struct AppState {
    /// The relay service
    pub relay: Arc<EventRelay>,
    /// The boundary authenticator
    pub authenticator: Arc<taskmesh::auth::Authenticator>,
    /// Prometheus render handle, when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
}

/// Publish acknowledgement.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// Whether the event was accepted
    pub ok: bool,
    /// Failure detail when not ok
    pub message: String,
}

/// Builds the relay router over `state`.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/events", post(publish))
        .route("/api/v1/events/subscribe", get(subscribe))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth_layer::require_bearer,
        ));

    Router::new()
        .merge(protected)
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn publish(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> (StatusCode, Json<PublishResponse>) {
    match state.relay.publish(event) {
        Ok(()) => (
            StatusCode::OK,
            Json(PublishResponse {
                ok: true,
                message: String::new(),
            }),
        ),
        Err(RelayError::Invalid(e)) => (
            StatusCode::BAD_REQUEST,
            Json(PublishResponse {
                ok: false,
                message: e.to_string(),
            }),
        ),
        Err(e @ RelayError::ShuttingDown) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(PublishResponse {
                ok: false,
                message: e.to_string(),
            }),
        ),
    }
}

async fn subscribe(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let mut params = params;
    let kinds: Vec<String> = params
        .remove("kinds")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let filter = SubscriptionFilter::new(kinds, params);
    let (id, rx) = state.relay.subscribe(filter);
    debug!(subscription_id = %id, "streaming subscription opened");

    let stream = ReceiverStream::new(rx).map(|event| {
        let sse = SseEvent::default()
            .event(event.kind.clone())
            .json_data(&event)
            .unwrap_or_else(|e| SseEvent::default().comment(format!("encode error: {e}")));
        Ok(sse)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}
