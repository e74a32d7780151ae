//! Shared application state.

use std::sync::Arc;

use tokio::sync::Semaphore;

use openset_async::AsyncPool;
use openset_core::Config;
use openset_db::Database;
use openset_query::QueryCompiler;

use crate::mapper::Mapper;

pub struct AppState {
    pub config: Config,
    pub db: Arc<Database>,
    pub pool: Arc<AsyncPool>,
    pub mapper: Arc<Mapper>,
    pub compiler: Arc<dyn QueryCompiler>,
    /// Concurrent originator-query gate; forked requests bypass it so a
    /// cluster under load cannot deadlock on its own fan-out.
    pub query_gate: Arc<Semaphore>,
}

impl AppState {
    /// Owned partitions of this node, in scheduler terms.
    pub fn owned_partitions(&self) -> Vec<i32> {
        self.mapper.partition_map.partitions_by_node_and_state(
            self.mapper.node_id(),
            crate::mapper::NodeState::ActiveOwner,
        )
    }
}
