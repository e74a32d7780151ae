//! `POST /v1/query/{table}/histogram/{name}` - bucketed distribution of a
//! script-returned value.

use std::sync::Arc;

use tracing::info;

use openset_core::{QueryError, FIXED_POINT_SCALE};
use openset_query::{disassemble, inline_params};
use openset_result::{AccType, SortOrder};

use crate::oloops::OpenLoopHistogram;
use crate::state::AppState;
use crate::web::Message;

use super::fork::{fork_query, ShapeSpec, SortMode};
use super::{apply_segments_param, rpc_error, run_fork};

/// Scale a fractional parameter to fixed-point units.
fn scaled_param(message: &Message, name: &str) -> Option<i64> {
    message
        .param(name)
        .map(|raw| (raw.trim().parse::<f64>().unwrap_or(0.0) * FIXED_POINT_SCALE as f64) as i64)
}

pub async fn histogram(state: &Arc<AppState>, message: Message, table_name: &str, group_name: &str) {
    let is_fork = message.param_bool("fork");
    let debug = message.param_bool("debug");
    let trim = message.param_i64("trim", -1);
    let sort_order = SortOrder::from_param(&message.param_str("order", "desc"));

    info!("inbound histogram query (fork: {is_fork})");

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

    let session_time = message.param_i64("session_time", table.session_time());
    let params = inline_params(&message.params);

    let mut query = match state.compiler.compile(&code, &table.columns(), &params) {
        Ok(query) => query,
        Err(error) => {
            rpc_error(message, error);
            return;
        }
    };

    // Histograms bucket a returned value; tallying rows makes no sense here.
    if query.uses_tally {
        rpc_error(
            message,
            QueryError::parse(
                "histogram queries should not call 'tally' - they should 'return' the value to store",
            ),
        );
        return;
    }

    if let Err(error) = apply_segments_param(&message, &mut query.segments) {
        rpc_error(message, error);
        return;
    }
    query.session_time = session_time;

    if debug {
        message.reply_text(disassemble(&query));
        return;
    }

    let bucket = scaled_param(&message, "bucket").filter(|b| *b > 0);
    let force_min = scaled_param(&message, "min");
    let force_max = scaled_param(&message, "max");
    let foreach = message.param("foreach").map(|s| s.to_string());

    if !is_fork {
        let mut shape = ShapeSpec::sorted(SortMode::Key, sort_order, 0, trim);
        shape.bucket = bucket;
        shape.force_min = force_min;
        shape.force_max = force_max;
        // Exact-value histograms still carry fixed-point keys.
        shape.unscale_keys = bucket.is_none();
        fork_query(state, message, &table, 1, shape).await;
        return;
    }

    let group_name = group_name.to_string();
    run_fork(
        state,
        message,
        &table,
        1,
        vec![AccType::Count],
        |_, shuttle, result, instance| {
            Box::new(OpenLoopHistogram::new(
                shuttle,
                table.clone(),
                query.clone(),
                group_name.clone(),
                foreach.clone(),
                bucket,
                result,
                instance,
            ))
        },
    );
}
