//! HTTP intake: route assembly, query/other classification, the query gate.
//!
//! Every `/v1/query/*` request becomes a [`Message`] handed to the
//! coordinator; the handler waits on the reply channel. Originator queries
//! pass through the query gate; forked requests bypass it so a node serving
//! its own fan-out cannot deadlock on its own cap.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::json;
use tokio::sync::OwnedSemaphorePermit;
use tower_http::cors::CorsLayer;

use crate::rpc;
use crate::state::AppState;
use crate::web::{Message, Reply};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/v1/query/{table}/event", post(event))
        .route("/v1/query/{table}/segment", post(segment))
        .route("/v1/query/{table}/column/{name}", get(column).post(column))
        .route("/v1/query/{table}/histogram/{name}", post(histogram))
        .route("/v1/query/{table}/person", get(person))
        .route("/v1/query/{table}/batch", post(batch))
        .fallback(unknown)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ping() -> impl IntoResponse {
    Json(json!({ "pong": true }))
}

async fn unknown() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "unknown request" })),
    )
}

/// Forked requests skip the gate; originator queries take a slot for their
/// full lifetime (compile through reply).
async fn gate(state: &Arc<AppState>, params: &HashMap<String, String>) -> Option<OwnedSemaphorePermit> {
    if matches!(params.get("fork").map(|s| s.as_str()), Some("true") | Some("1")) {
        return None;
    }
    state.query_gate.clone().acquire_owned().await.ok()
}

fn respond(reply: Result<Reply, tokio::sync::oneshot::error::RecvError>) -> Response {
    match reply {
        Ok(reply) => (
            reply.status,
            [(header::CONTENT_TYPE, reply.content_type)],
            reply.body,
        )
            .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "reply channel dropped" })),
        )
            .into_response(),
    }
}

async fn event(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let _permit = gate(&state, &params).await;
    let (message, rx) = Message::new("POST", format!("/v1/query/{table}/event"), params, body);
    rpc::event::event(&state, message, &table).await;
    respond(rx.await)
}

async fn segment(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let _permit = gate(&state, &params).await;
    let (message, rx) = Message::new("POST", format!("/v1/query/{table}/segment"), params, body);
    rpc::segment::segment(&state, message, &table).await;
    respond(rx.await)
}

async fn column(
    State(state): State<Arc<AppState>>,
    Path((table, name)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let _permit = gate(&state, &params).await;
    let (message, rx) = Message::new(
        "GET",
        format!("/v1/query/{table}/column/{name}"),
        params,
        body,
    );
    rpc::column::column(&state, message, &table, &name).await;
    respond(rx.await)
}

async fn histogram(
    State(state): State<Arc<AppState>>,
    Path((table, name)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let _permit = gate(&state, &params).await;
    let (message, rx) = Message::new(
        "POST",
        format!("/v1/query/{table}/histogram/{name}"),
        params,
        body,
    );
    rpc::histogram::histogram(&state, message, &table, &name).await;
    respond(rx.await)
}

async fn person(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let _permit = gate(&state, &params).await;
    let (message, rx) = Message::new(
        "GET",
        format!("/v1/query/{table}/person"),
        params,
        Bytes::new(),
    );
    rpc::person::person(&state, message, &table).await;
    respond(rx.await)
}

/// Batch coordinates other queries rather than computing; it detaches
/// immediately, so it takes no gate slot (its sub-queries each take one).
async fn batch(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let (message, rx) = Message::new("POST", format!("/v1/query/{table}/batch"), params, body);
    rpc::batch::batch(&state, message, &table).await;
    respond(rx.await)
}
