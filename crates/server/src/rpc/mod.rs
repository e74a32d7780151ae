//! The query coordinator: one module per endpoint plus the shared fork
//! machinery.
//!
//! Every endpoint follows the same arc: validate, compile, then either
//! originate (broadcast with `fork=true`, merge, shape, reply JSON) or act
//! as a fork (spawn one open-loop per owned partition, merge worker-local
//! result sets, reply binary).

pub mod batch;
pub mod column;
pub mod event;
pub mod fork;
pub mod histogram;
pub mod person;
pub mod segment;

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use openset_async::{OpenLoop, PartitionLoop, Shuttle};
use openset_core::QueryError;
use openset_db::Table;
use openset_result::{multi_set_to_internode, AccType, ResultSet};

use crate::state::AppState;
use crate::web::Message;

/// Per-partition execution outcome reported through the shuttle. Errors
/// travel embedded here, never by panic.
#[derive(Debug, Clone)]
pub struct CellQueryResult {
    pub instance: usize,
    pub error: Option<QueryError>,
}

impl CellQueryResult {
    pub fn ok(instance: usize) -> Self {
        Self {
            instance,
            error: None,
        }
    }

    pub fn err(instance: usize, error: QueryError) -> Self {
        Self {
            instance,
            error: Some(error),
        }
    }
}

/// Log and reply a 4xx taxonomy error.
pub(crate) fn rpc_error(message: Message, error: QueryError) {
    warn!("{error}");
    message.reply_error(error);
}

/// Worker-local result set handle. Partitions sharing a worker run
/// serially, so the mutex is never contended; it exists to satisfy the
/// borrow rules across loop instances.
pub type SharedResultSet = Arc<Mutex<ResultSet>>;

/// Act-as-fork driver shared by the script endpoints.
///
/// Allocates one result set per worker thread (not per partition), creates
/// a shuttle expecting one response per owned partition, and queues one
/// open-loop per partition built by `factory`. With no owned partitions the
/// reply is an empty, well-formed wire buffer.
pub(crate) fn run_fork<F>(
    state: &Arc<AppState>,
    message: Message,
    table: &Arc<Table>,
    column_count: usize,
    acc_types: Vec<AccType>,
    mut factory: F,
) where
    F: FnMut(
        &PartitionLoop,
        Arc<Shuttle<CellQueryResult>>,
        SharedResultSet,
        usize,
    ) -> Box<dyn OpenLoop>,
{
    let active = state.owned_partitions();
    let result_sets: Vec<SharedResultSet> = (0..state.pool.worker_count())
        .map(|_| {
            let mut set = ResultSet::new(column_count);
            set.set_acc_types(&acc_types);
            Arc::new(Mutex::new(set))
        })
        .collect();

    if active.is_empty() {
        reply_merged(message, column_count, &result_sets, table.name());
        return;
    }

    let callback_sets = result_sets.clone();
    let table_name = table.name().to_string();
    let shuttle = Shuttle::new(active.len(), move |responses: Vec<CellQueryResult>| {
        // Any recorded error is a hard error for the whole fork.
        for response in &responses {
            if let Some(error) = &response.error {
                rpc_error(message, error.clone());
                return;
            }
        }
        reply_merged(message, column_count, &callback_sets, &table_name);
    });

    let mut instance = 0usize;
    state.pool.cell_factory(&active, |partition_loop| {
        instance += 1;
        factory(
            partition_loop,
            shuttle.clone(),
            result_sets[partition_loop.worker()].clone(),
            instance,
        )
    });
}

fn reply_merged(
    message: Message,
    column_count: usize,
    result_sets: &[SharedResultSet],
    table_name: &str,
) {
    let sets: Vec<ResultSet> = result_sets
        .iter()
        .map(|set| set.lock().unwrap().clone())
        .collect();
    match multi_set_to_internode(column_count, &sets) {
        Ok(buffer) => {
            info!("fork query on {table_name}");
            message.reply_binary(buffer);
        }
        Err(err) => rpc_error(message, QueryError::internode(err.to_string())),
    }
}

/// Parse the csv `segments` parameter into the compiled query, rejecting an
/// empty list.
pub(crate) fn apply_segments_param(
    message: &Message,
    segments: &mut Vec<String>,
) -> Result<(), QueryError> {
    if let Some(csv) = message.param("segments") {
        let parsed: Vec<String> = csv
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect();
        if parsed.is_empty() {
            return Err(QueryError::query_syntax("no segment names specified"));
        }
        *segments = parsed;
    }
    Ok(())
}
