//! Originator side of the fork protocol.
//!
//! The originating node rewrites the request with `fork=true`, broadcasts
//! it to every routed node (itself included), demuxes the binary partials,
//! merges, shapes (histogram fill, sort, trim) and replies JSON. Peer
//! errors come back either as a 4xx JSON body with `/error` (relayed) or as
//! an empty/non-OK reply (a retriable route error).

use std::sync::Arc;

use axum::http::StatusCode;
use tracing::info;

use openset_core::QueryError;
use openset_db::Table;
use openset_result::{
    histogram_fill, internode_to_result_set, is_internode, result_set_to_json, sort_by_column,
    sort_by_group, trim_rows, unscale_columns, unscale_groups, ResultSet, SortOrder,
};

use crate::state::AppState;
use crate::web::Message;

use super::rpc_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    None,
    Key,
    Column,
}

/// How the merged JSON gets shaped before the reply.
pub struct ShapeSpec {
    pub sort_mode: SortMode,
    pub sort_order: SortOrder,
    pub sort_column: usize,
    pub trim: i64,
    /// Histogram bucket width in fixed-point units; fills when set.
    pub bucket: Option<i64>,
    pub force_min: Option<i64>,
    pub force_max: Option<i64>,
    /// Unscale fixed-point group keys (double column queries).
    pub unscale_keys: bool,
    /// Result columns whose cells are fixed-point and need unscaling.
    pub double_columns: Vec<usize>,
}

impl ShapeSpec {
    pub fn sorted(sort_mode: SortMode, sort_order: SortOrder, sort_column: usize, trim: i64) -> Self {
        Self {
            sort_mode,
            sort_order,
            sort_column,
            trim,
            bucket: None,
            force_min: None,
            force_max: None,
            unscale_keys: false,
            double_columns: Vec::new(),
        }
    }
}

/// Broadcast this request with `fork=true`, merge the partials, shape and
/// reply. All replies (success and error) go through `message`.
pub(crate) async fn fork_query(
    state: &Arc<AppState>,
    message: Message,
    table: &Arc<Table>,
    column_count: usize,
    shape: ShapeSpec,
) {
    let mut params = message.params.clone();
    params.insert("fork".to_string(), "true".to_string());

    let result = state
        .mapper
        .dispatch_cluster(&message.method, &message.path, &params, message.body.clone())
        .await;

    let mut route_error = result.route_error;
    let mut sets: Vec<ResultSet> = Vec::with_capacity(result.responses.len());

    for response in &result.responses {
        if is_internode(&response.data) {
            match internode_to_result_set(&response.data) {
                Ok(set) => sets.push(set),
                Err(_) => route_error = true,
            }
        } else if response.data.is_empty() {
            if response.status == StatusCode::OK {
                rpc_error(
                    message,
                    QueryError::internode("cluster error - node had empty reply"),
                );
                return;
            }
            route_error = true;
        } else if response.status != StatusCode::OK {
            // A structured error percolating up from a forked node is
            // relayed as-is; anything else is a transient routing problem.
            if let Some(error) = QueryError::from_json(&response.data) {
                message.reply_json(StatusCode::BAD_REQUEST, &error.to_json());
                return;
            }
            route_error = true;
        } else {
            route_error = true;
        }

        if route_error {
            rpc_error(
                message,
                QueryError::route("potential node failure - please re-issue the request"),
            );
            return;
        }
    }

    if route_error {
        rpc_error(
            message,
            QueryError::route("potential node failure - please re-issue the request"),
        );
        return;
    }

    let merged = ResultSet::merge_sets(column_count, &sets);
    let mut json = result_set_to_json(&merged);

    unscale_columns(&mut json, &shape.double_columns);
    if let Some(bucket) = shape.bucket {
        histogram_fill(&mut json, bucket, shape.force_min, shape.force_max);
    } else if shape.unscale_keys {
        unscale_groups(&mut json);
    }

    match shape.sort_mode {
        SortMode::Key => sort_by_group(&mut json, shape.sort_order),
        SortMode::Column => sort_by_column(&mut json, shape.sort_order, shape.sort_column),
        SortMode::None => {}
    }
    trim_rows(&mut json, shape.trim);

    info!("query on {}", table.name());
    message.reply_json(StatusCode::OK, &json);
}
