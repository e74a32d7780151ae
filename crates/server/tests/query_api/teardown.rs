//! Deterministic teardown semantics, driven without live worker threads so
//! there is no race between submission and the notification under test.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use openset_async::{AsyncPool, Shuttle};
use openset_core::config::SchedulerConfig;
use openset_db::{ColumnType, Columns, Table};
use openset_query::{ParamVars, QueryCompiler, ScriptCompiler};
use openset_result::ResultSet;
use openset_server::oloops::OpenLoopQuery;
use openset_server::rpc::CellQueryResult;

fn quiet_pool() -> Arc<AsyncPool> {
    // Never started: ticks are driven by hand.
    AsyncPool::new(
        &SchedulerConfig {
            workers: 1,
            run_interval_ms: 100,
        },
        4,
    )
}

fn queued_query(
    pool: &Arc<AsyncPool>,
    table: &Arc<Table>,
) -> mpsc::Receiver<CellQueryResult> {
    let (tx, rx) = mpsc::channel();
    let shuttle = Shuttle::new(1, move |mut responses: Vec<CellQueryResult>| {
        let _ = tx.send(responses.pop().unwrap());
    });

    let query = ScriptCompiler
        .compile("count\n", &table.columns(), &ParamVars::new())
        .unwrap();
    let result = Arc::new(Mutex::new(ResultSet::new(1)));

    let partition_loop = pool.init_partition(0);
    partition_loop.queue_cell(Box::new(OpenLoopQuery::new(
        shuttle,
        table.clone(),
        query,
        result,
        1,
    )));
    rx
}

#[test]
fn table_drop_purge_delivers_terminal_error() {
    let pool = quiet_pool();
    let table = Table::new("orders", Columns::from_pairs(&[("a", ColumnType::Int)]));
    let rx = queued_query(&pool, &table);

    // Purge before the loop ever ran: the queued cell must still complete
    // its shuttle with an error rather than strand it.
    pool.purge_by_table("orders");

    let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let error = result.error.expect("purged loop must report an error");
    assert!(error.message.contains("table dropped"));
}

#[test]
fn partition_removal_delivers_retriable_error() {
    let pool = quiet_pool();
    let table = Table::new("orders", Columns::from_pairs(&[("a", ColumnType::Int)]));
    let rx = queued_query(&pool, &table);

    pool.drop_partition(0);

    let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    let error = result.error.expect("removed partition must report an error");
    assert_eq!(error.message, "please retry query");
}

#[test]
fn completed_query_reports_ok() {
    let pool = quiet_pool();
    let table = Table::new("orders", Columns::from_pairs(&[("a", ColumnType::Int)]));
    table.get_make_partition(0);
    let rx = queued_query(&pool, &table);

    // Drive the tick by hand until the loop completes.
    let partition_loop = pool.get_partition(0).unwrap();
    let mut next_run = -1;
    for _ in 0..10 {
        partition_loop.run(&mut next_run);
    }

    let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert!(result.error.is_none());
}
