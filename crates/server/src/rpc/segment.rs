//! `POST /v1/query/{table}/segment` - materialize `@segment` definitions.

use std::sync::Arc;

use tracing::info;

use openset_core::QueryError;
use openset_query::{disassemble, extract_sections, inline_params, CompiledQuery};
use openset_result::AccType;

use crate::oloops::OpenLoopSegment;
use crate::state::AppState;
use crate::web::Message;

use super::fork::{fork_query, ShapeSpec, SortMode};
use super::{rpc_error, run_fork};
use openset_result::SortOrder;

pub async fn segment(state: &Arc<AppState>, message: Message, table_name: &str) {
    let is_fork = message.param_bool("fork");
    let debug = message.param_bool("debug");

    info!("inbound counts query (fork: {is_fork})");

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

    let params = inline_params(&message.params);
    let columns = table.columns();

    // Compile each @segment section; ttl/refresh flags attach to both the
    // compiled macro and the table's segment metadata.
    let mut queries: Vec<(String, CompiledQuery)> = Vec::new();
    for section in extract_sections(&code) {
        if section.section_type != "segment" {
            continue;
        }
        let mut query = match state.compiler.compile(&section.code, &columns, &params) {
            Ok(query) => query,
            Err(error) => {
                rpc_error(message, error);
                return;
            }
        };

        if let Some(ttl) = section.flag_i64("ttl") {
            query.segment_ttl = Some(ttl);
            table.set_segment_ttl(&section.name, ttl);
        }
        if let Some(refresh) = section.flag_i64("refresh") {
            query.segment_refresh = Some(refresh);
            table.set_segment_refresh(&section.name, refresh);
        }
        query.is_segment = true;

        queries.push((section.name, query));
    }

    if queries.is_empty() {
        rpc_error(
            message,
            QueryError::query_syntax("no @segment sections could be found"),
        );
        return;
    }

    if debug {
        let mut out = String::new();
        for (name, query) in &queries {
            out.push_str(&format!("script: {name}\n"));
            out.push_str(&disassemble(query));
            out.push('\n');
        }
        message.reply_text(out);
        return;
    }

    if !is_fork {
        fork_query(
            state,
            message,
            &table,
            1,
            ShapeSpec::sorted(SortMode::Key, SortOrder::Asc, 0, -1),
        )
        .await;
        return;
    }

    run_fork(
        state,
        message,
        &table,
        1,
        vec![AccType::Sum],
        |_, shuttle, result, instance| {
            Box::new(OpenLoopSegment::new(
                shuttle,
                table.clone(),
                queries.clone(),
                result,
                instance,
            ))
        },
    );
}
