//! `POST /v1/query/{table}/batch` - mixed-section scripts.
//!
//! Segment sections run first (bounded concurrency, abort on failure), then
//! the remaining query sections; each section becomes an internal dispatch
//! to this node. The work runs on a detached task so the intake is freed
//! immediately, and the reply collects sub-query responses under `"_"`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::info;

use openset_core::QueryError;
use openset_query::{extract_sections, Section};

use crate::mapper::DataBlock;
use crate::state::AppState;
use crate::web::Message;

use super::rpc_error;

/// Maximum sub-queries in flight at once.
const DISPATCH_CONCURRENCY: usize = 4;

pub async fn batch(state: &Arc<AppState>, message: Message, table_name: &str) {
    info!("inbound batch query");

    if table_name.is_empty() {
        rpc_error(message, QueryError::query("missing or invalid table name"));
        return;
    }
    let code = message.body_text();
    if code.is_empty() {
        rpc_error(
            message,
            QueryError::query("missing query code (POST query as text)"),
        );
        return;
    }
    if state.db.get_table(table_name).is_none() {
        rpc_error(message, QueryError::query("table could not be found"));
        return;
    }

    let state = state.clone();
    let table_name = table_name.to_string();

    // Detached: the intake thread is free while sections dispatch.
    tokio::spawn(async move {
        let mut segment_sections = Vec::new();
        let mut query_sections = Vec::new();
        let mut use_segments: Vec<String> = Vec::new();

        for section in extract_sections(&code) {
            match section.section_type.as_str() {
                "segment" => segment_sections.push(section),
                "use" => {
                    use_segments = section
                        .name
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                _ => query_sections.push(section),
            }
        }

        if !segment_sections.is_empty() {
            let responses =
                dispatch_sections(&state, &table_name, &[], segment_sections).await;
            if let Err(error) = check_responses(&responses) {
                rpc_error(message, error);
                return;
            }
        }

        if query_sections.is_empty() {
            message.reply_json(StatusCode::OK, &json!({ "_": [] }));
            return;
        }

        let responses =
            dispatch_sections(&state, &table_name, &use_segments, query_sections).await;
        if let Err(error) = check_responses(&responses) {
            rpc_error(message, error);
            return;
        }

        let mut results = Vec::with_capacity(responses.len());
        for block in &responses {
            match serde_json::from_slice::<serde_json::Value>(&block.data) {
                Ok(value) => results.push(value),
                Err(_) => results.push(json!(null)),
            }
        }
        message.reply_json(StatusCode::OK, &json!({ "_": results }));
    });
}

/// Dispatch each section to this node as its own request, at most
/// `DISPATCH_CONCURRENCY` in flight. Responses come back in section order.
async fn dispatch_sections(
    state: &Arc<AppState>,
    table_name: &str,
    use_segments: &[String],
    sections: Vec<Section>,
) -> Vec<DataBlock> {
    let node = state.mapper.node_id();

    stream::iter(sections)
        .map(|section| {
            let state = state.clone();
            let table_name = table_name.to_string();
            let use_segments = use_segments.to_vec();
            async move {
                let mut params: HashMap<String, String> = section
                    .flags
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if !use_segments.is_empty() {
                    params.insert("segments".to_string(), use_segments.join(","));
                }

                let (method, path, payload) = match section.section_type.as_str() {
                    "segment" => {
                        // Re-wrap the section so the segment endpoint sees it.
                        let mut header = format!("@segment {}", section.name);
                        for (key, value) in &section.flags {
                            header.push_str(&format!(" {key}={value}"));
                        }
                        params.clear();
                        (
                            "POST",
                            format!("/v1/query/{table_name}/segment"),
                            format!("{header}\n{}", section.code),
                        )
                    }
                    "column" => (
                        "GET",
                        format!("/v1/query/{table_name}/column/{}", section.name),
                        section.code.clone(),
                    ),
                    "histogram" => (
                        "POST",
                        format!("/v1/query/{table_name}/histogram/{}", section.name),
                        section.code.clone(),
                    ),
                    _ => (
                        "POST",
                        format!("/v1/query/{table_name}/event"),
                        section.code.clone(),
                    ),
                };

                state
                    .mapper
                    .dispatch_single(node, method, &path, &params, Bytes::from(payload))
                    .await
                    .unwrap_or(DataBlock {
                        status: StatusCode::BAD_GATEWAY,
                        data: Bytes::new(),
                    })
            }
        })
        .buffered(DISPATCH_CONCURRENCY)
        .collect()
        .await
}

/// Relay a structured sub-query error; classify anything else non-OK as a
/// retriable route problem.
fn check_responses(responses: &[DataBlock]) -> Result<(), QueryError> {
    for block in responses {
        if block.status == StatusCode::OK {
            continue;
        }
        if let Some(error) = QueryError::from_json(&block.data) {
            return Err(error);
        }
        return Err(QueryError::route(
            "potential node failure - please re-issue the request",
        ));
    }
    Ok(())
}
