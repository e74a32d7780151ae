//! Node bootstrap: mapper layout, scheduler pool, shared state.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::info;

use openset_async::AsyncPool;
use openset_core::Config;
use openset_db::Database;
use openset_query::ScriptCompiler;

use crate::mapper::{Mapper, NodeState};
use crate::oloops::OpenLoopSegmentRefresh;
use crate::state::AppState;

/// Build the shared state for one node.
///
/// The cluster membership service is an external collaborator; here a static
/// layout is installed from config: with no configured routes the node
/// routes to itself and owns every partition, otherwise partitions are
/// spread round-robin across the routed nodes by id order.
pub fn build_app_state(config: Config, bound_port: u16) -> Arc<AppState> {
    let mapper = Arc::new(Mapper::new(config.cluster.node_id));

    if config.cluster.routes.is_empty() {
        mapper.set_route(
            config.cluster.node_id,
            format!("http://127.0.0.1:{bound_port}"),
        );
    } else {
        for (node, url) in &config.cluster.routes {
            mapper.set_route(*node, url.clone());
        }
    }

    let nodes = mapper.node_ids();
    for partition in 0..config.cluster.partition_max as i32 {
        let owner = nodes[partition as usize % nodes.len()];
        mapper
            .partition_map
            .set_state(partition, owner, NodeState::ActiveOwner);
    }

    let pool = AsyncPool::new(&config.scheduler, config.cluster.partition_max);
    let owned = mapper
        .partition_map
        .partitions_by_node_and_state(mapper.node_id(), NodeState::ActiveOwner);
    for partition in &owned {
        pool.init_partition(*partition);
    }
    pool.start();
    info!(
        "node {} owns {} of {} partitions",
        mapper.node_id(),
        owned.len(),
        config.cluster.partition_max
    );

    let query_cap = config.server.query_cap.max(1);
    Arc::new(AppState {
        config,
        db: Database::new(),
        pool,
        mapper,
        compiler: Arc::new(ScriptCompiler),
        query_gate: Arc::new(Semaphore::new(query_cap)),
    })
}

/// Register a table and start its per-partition maintenance: each owned
/// partition gets a future-scheduled segment-refresh loop that expires
/// stale segments and reschedules itself for the table's lifetime.
pub fn attach_table(state: &Arc<AppState>, table: Arc<openset_db::Table>) {
    state.db.add_table(table.clone());
    for partition in state.owned_partitions() {
        table.get_make_partition(partition);
        if let Some(partition_loop) = state.pool.get_partition(partition) {
            partition_loop
                .queue_cell_future(Box::new(OpenLoopSegmentRefresh::new(table.clone())), 1_000);
        }
    }
}

/// Drop a table: purge its scheduler loops first (each delivers a terminal
/// error to any waiting shuttle), then remove it from the registry.
pub fn detach_table(state: &Arc<AppState>, name: &str) {
    state.pool.purge_by_table(name);
    state.db.drop_table(name);
}
