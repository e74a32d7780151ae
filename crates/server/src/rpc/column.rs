//! `GET|POST /v1/query/{table}/column/{name}` - distinct-value counts over
//! one property column, with comparison/regex/substring filters.

use std::sync::Arc;

use regex::Regex;

use openset_core::{QueryError, FIXED_POINT_SCALE};
use openset_db::{ColumnType, FieldValue};
use openset_result::{AccType, SortOrder};

use crate::oloops::{ColumnFilterMode, ColumnQuery, OpenLoopColumn};
use crate::state::AppState;
use crate::web::Message;

use super::fork::{fork_query, ShapeSpec, SortMode};
use super::{apply_segments_param, rpc_error, run_fork};

/// Pick the filter mode from whichever comparison parameter is present.
fn filter_mode(message: &Message) -> (ColumnFilterMode, Option<String>, Option<String>) {
    for (param, mode) in [
        ("gt", ColumnFilterMode::Gt),
        ("gte", ColumnFilterMode::Gte),
        ("lt", ColumnFilterMode::Lt),
        ("lte", ColumnFilterMode::Lte),
        ("eq", ColumnFilterMode::Eq),
        ("rx", ColumnFilterMode::Rx),
        ("sub", ColumnFilterMode::Sub),
    ] {
        if let Some(value) = message.param(param) {
            return (mode, Some(value.to_string()), None);
        }
    }
    if let Some(low) = message.param("between") {
        return (
            ColumnFilterMode::Between,
            Some(low.to_string()),
            message.param("and").map(|s| s.to_string()),
        );
    }
    (ColumnFilterMode::All, None, None)
}

/// Type a raw filter string for the column: raw ints for int columns,
/// fixed-point for doubles, bool/text as such.
fn type_filter(raw: &str, col_type: ColumnType) -> FieldValue {
    match col_type {
        ColumnType::Int => FieldValue::Int(raw.trim().parse().unwrap_or(0)),
        ColumnType::Double => FieldValue::Int(
            (raw.trim().parse::<f64>().unwrap_or(0.0) * FIXED_POINT_SCALE as f64) as i64,
        ),
        ColumnType::Bool => FieldValue::Bool(raw == "true" || raw == "1"),
        ColumnType::Text => FieldValue::Text(raw.to_string()),
    }
}

/// The filter/type compatibility matrix.
fn mode_allowed(mode: ColumnFilterMode, col_type: ColumnType) -> Result<(), QueryError> {
    use ColumnFilterMode::*;
    let allowed = match col_type {
        ColumnType::Int | ColumnType::Double => {
            matches!(mode, All | Eq | Between | Gt | Gte | Lt | Lte)
        }
        ColumnType::Text => matches!(mode, All | Eq | Rx | Sub),
        ColumnType::Bool => matches!(mode, All | Eq),
    };
    if allowed {
        return Ok(());
    }
    let what = match col_type {
        ColumnType::Int | ColumnType::Double => {
            "specified filter type not compatible with integer or double column"
        }
        ColumnType::Text => "specified filter type not compatible with string column",
        ColumnType::Bool => "specified filter type not compatible with bool column",
    };
    Err(QueryError::parse(what))
}

pub async fn column(state: &Arc<AppState>, message: Message, table_name: &str, column_name: &str) {
    let is_fork = message.param_bool("fork");
    let trim = message.param_i64("trim", -1);
    let sort_order = SortOrder::from_param(&message.param_str("order", "desc"));

    if table_name.is_empty() {
        rpc_error(message, QueryError::config("missing table name"));
        return;
    }
    let Some(table) = state.db.get_table(table_name) else {
        rpc_error(message, QueryError::config("table not found"));
        return;
    };
    if column_name.is_empty() {
        rpc_error(message, QueryError::config("invalid column name"));
        return;
    }
    let columns = table.columns();
    let Some(column) = columns.get(column_name).cloned() else {
        rpc_error(message, QueryError::config("column not found"));
        return;
    };

    let (mode, raw_low, raw_high) = filter_mode(&message);

    // Bad regex must fail cleanly, and only regex failures are caught here.
    let rx = if mode == ColumnFilterMode::Rx {
        let pattern = raw_low.as_deref().unwrap_or("");
        match Regex::new(pattern) {
            Ok(rx) => Some(rx),
            Err(_) => {
                rpc_error(
                    message,
                    QueryError::query_syntax(format!(
                        "could not compile regular expression: {pattern}"
                    )),
                );
                return;
            }
        }
    } else {
        None
    };

    if mode != ColumnFilterMode::All && raw_low.as_deref().unwrap_or("").is_empty() {
        rpc_error(
            message,
            QueryError::query_syntax("column filter requires a value"),
        );
        return;
    }
    if mode == ColumnFilterMode::Between && raw_high.as_deref().unwrap_or("").is_empty() {
        rpc_error(
            message,
            QueryError::query_syntax("column query using 'between' requires an 'and' param"),
        );
        return;
    }

    if let Err(error) = mode_allowed(mode, column.col_type) {
        rpc_error(message, error);
        return;
    }

    let bucket = message.param("bucket").map(|raw| match column.col_type {
        ColumnType::Double => {
            (raw.trim().parse::<f64>().unwrap_or(0.0) * FIXED_POINT_SCALE as f64) as i64
        }
        _ => raw.trim().parse::<i64>().unwrap_or(0),
    });

    let mut segments = Vec::new();
    if let Err(error) = apply_segments_param(&message, &mut segments) {
        rpc_error(message, error);
        return;
    }

    // Text filters stay text; numeric filters are typed into the column's
    // native units (fixed-point for doubles).
    let filter_low = raw_low.map(|raw| type_filter(&raw, column.col_type));
    let filter_high = raw_high.map(|raw| type_filter(&raw, column.col_type));

    if !is_fork {
        let mut shape = ShapeSpec::sorted(SortMode::Column, sort_order, 0, trim);
        shape.unscale_keys = column.col_type == ColumnType::Double;
        fork_query(state, message, &table, 1, shape).await;
        return;
    }

    let config = ColumnQuery {
        column,
        mode,
        filter_low,
        filter_high,
        rx,
        bucket,
        segments,
    };
    run_fork(
        state,
        message,
        &table,
        1,
        vec![AccType::Count],
        |_, shuttle, result, instance| {
            Box::new(OpenLoopColumn::new(
                shuttle,
                table.clone(),
                config.clone(),
                result,
                instance,
            ))
        },
    );
}
