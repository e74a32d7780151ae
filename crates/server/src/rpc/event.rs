//! `POST /v1/query/{table}/event` - the script query endpoint.

use std::sync::Arc;

use tracing::info;

use openset_query::{disassemble, inline_params};
use openset_result::SortOrder;

use crate::oloops::OpenLoopQuery;
use crate::state::AppState;
use crate::web::Message;

use super::fork::{fork_query, ShapeSpec, SortMode};
use super::{apply_segments_param, rpc_error, run_fork};
use openset_core::QueryError;

pub async fn event(state: &Arc<AppState>, message: Message, table_name: &str) {
    let is_fork = message.param_bool("fork");
    let debug = message.param_bool("debug");
    let trim = message.param_i64("trim", -1);
    let sort_order = SortOrder::from_param(&message.param_str("order", "desc"));

    info!("inbound events query (fork: {is_fork})");

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
    let Some(table) = state.db.get_table(table_name) else {
        rpc_error(message, QueryError::query("table could not be found"));
        return;
    };

    // Session override if provided, table default otherwise.
    let session_time = message.param_i64("session_time", table.session_time());
    let params = inline_params(&message.params);

    let mut query = match state.compiler.compile(&code, &table.columns(), &params) {
        Ok(query) => query,
        Err(error) => {
            rpc_error(message, error);
            return;
        }
    };

    if let Err(error) = apply_segments_param(&message, &mut query.segments) {
        rpc_error(message, error);
        return;
    }
    query.session_time = session_time;

    if debug {
        message.reply_text(disassemble(&query));
        return;
    }

    // Sort resolution: `key`/`g` sorts by group, anything else must name a
    // column var from the script's aggregates.
    let mut sort_mode = SortMode::Column;
    let mut sort_column = 0;
    if let Some(sort_name) = message.param("sort") {
        if sort_name == "key" || sort_name == "g" {
            sort_mode = SortMode::Key;
        } else {
            let resolved = match sort_name {
                "person" | "people" => "__uuid",
                "stamp" => "__stamp",
                "session" => "__session",
                other => other,
            };
            match query.sort_column(resolved) {
                Some(index) => sort_column = index,
                None => {
                    rpc_error(
                        message,
                        QueryError::parse("sort column not found in query aggregates"),
                    );
                    return;
                }
            }
        }
    }

    let column_count = query.column_count();

    if !is_fork {
        let mut shape = ShapeSpec::sorted(sort_mode, sort_order, sort_column, trim);
        shape.double_columns = query.double_columns();
        fork_query(state, message, &table, column_count, shape).await;
        return;
    }

    // Acting as a fork: one loop per owned partition, worker-local results.
    let acc_types = query.acc_types();
    run_fork(
        state,
        message,
        &table,
        column_count,
        acc_types,
        |_, shuttle, result, instance| {
            Box::new(OpenLoopQuery::new(
                shuttle,
                table.clone(),
                query.clone(),
                result,
                instance,
            ))
        },
    );
}
