//! Cluster mapping and inter-node dispatch.
//!
//! The partition map records which node owns each partition; the mapper
//! carries the node route table and fans requests out over HTTP. Membership
//! changes arrive from outside this crate (the cluster service is an
//! external collaborator); a static layout is installed at startup.

use std::collections::HashMap;
use std::sync::RwLock;

use axum::http::StatusCode;
use bytes::Bytes;
use futures::future::join_all;
use tracing::warn;

use openset_core::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Authoritative for the partition; the only state that executes queries.
    ActiveOwner,
    /// Receiving replicated data, not yet authoritative.
    ActiveClone,
}

/// partition -> node -> state.
#[derive(Default)]
pub struct PartitionMap {
    inner: RwLock<HashMap<i32, HashMap<i64, NodeState>>>,
}

impl PartitionMap {
    pub fn set_state(&self, partition: i32, node: i64, state: NodeState) {
        self.inner
            .write()
            .unwrap()
            .entry(partition)
            .or_default()
            .insert(node, state);
    }

    pub fn remove_node(&self, partition: i32, node: i64) {
        if let Some(nodes) = self.inner.write().unwrap().get_mut(&partition) {
            nodes.remove(&node);
        }
    }

    /// Partitions a node holds in the given state, ascending.
    pub fn partitions_by_node_and_state(&self, node: i64, state: NodeState) -> Vec<i32> {
        let mut partitions: Vec<i32> = self
            .inner
            .read()
            .unwrap()
            .iter()
            .filter(|(_, nodes)| nodes.get(&node) == Some(&state))
            .map(|(partition, _)| *partition)
            .collect();
        partitions.sort_unstable();
        partitions
    }

    pub fn nodes_by_partition(&self, partition: i32) -> Vec<i64> {
        self.inner
            .read()
            .unwrap()
            .get(&partition)
            .map(|nodes| nodes.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_owner(&self, partition: i32, node: i64) -> bool {
        self.inner
            .read()
            .unwrap()
            .get(&partition)
            .and_then(|nodes| nodes.get(&node))
            == Some(&NodeState::ActiveOwner)
    }

    pub fn owner_of(&self, partition: i32) -> Option<i64> {
        self.nodes_by_partition(partition)
            .into_iter()
            .find(|node| self.is_owner(partition, *node))
    }
}

/// One node's reply to a dispatched request. A transport failure shows up
/// as a non-OK status with an empty body, which the coordinator treats as a
/// retriable route error.
#[derive(Debug, Clone)]
pub struct DataBlock {
    pub status: StatusCode,
    pub data: Bytes,
}

#[derive(Debug, Default)]
pub struct ClusterResponses {
    pub responses: Vec<DataBlock>,
    pub route_error: bool,
}

pub struct Mapper {
    node_id: i64,
    pub partition_map: PartitionMap,
    routes: RwLock<HashMap<i64, String>>,
    client: reqwest::Client,
}

impl Mapper {
    pub fn new(node_id: i64) -> Self {
        Self {
            node_id,
            partition_map: PartitionMap::default(),
            routes: RwLock::new(HashMap::new()),
            client: reqwest::Client::new(),
        }
    }

    pub fn node_id(&self) -> i64 {
        self.node_id
    }

    pub fn set_route(&self, node: i64, base_url: impl Into<String>) {
        self.routes.write().unwrap().insert(node, base_url.into());
    }

    pub fn route(&self, node: i64) -> Option<String> {
        self.routes.read().unwrap().get(&node).cloned()
    }

    pub fn node_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.routes.read().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Send one request to one node and wait for its reply.
    pub async fn dispatch_single(
        &self,
        node: i64,
        method: &str,
        path: &str,
        params: &HashMap<String, String>,
        body: Bytes,
    ) -> Result<DataBlock, QueryError> {
        let base = self
            .route(node)
            .ok_or_else(|| QueryError::route("no route to node"))?;

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| QueryError::route("bad method"))?;
        let query: Vec<(&String, &String)> = params.iter().collect();

        let response = self
            .client
            .request(method, format!("{base}{path}"))
            .query(&query)
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status =
                    StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
                let data = response.bytes().await.unwrap_or_default();
                Ok(DataBlock { status, data })
            }
            Err(err) => {
                warn!("dispatch to node {node} failed: {err}");
                Ok(DataBlock {
                    status: StatusCode::BAD_GATEWAY,
                    data: Bytes::new(),
                })
            }
        }
    }

    /// Broadcast the same request to every routed node (this one included)
    /// and collect all replies. Reply order follows node id order.
    pub async fn dispatch_cluster(
        &self,
        method: &str,
        path: &str,
        params: &HashMap<String, String>,
        body: Bytes,
    ) -> ClusterResponses {
        let nodes = self.node_ids();
        let calls = nodes
            .iter()
            .map(|&node| self.dispatch_single(node, method, path, params, body.clone()));

        let mut out = ClusterResponses::default();
        for result in join_all(calls).await {
            match result {
                Ok(block) => out.responses.push(block),
                Err(_) => out.route_error = true,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_queries() {
        let map = PartitionMap::default();
        map.set_state(0, 1, NodeState::ActiveOwner);
        map.set_state(1, 1, NodeState::ActiveOwner);
        map.set_state(1, 2, NodeState::ActiveClone);
        map.set_state(2, 2, NodeState::ActiveOwner);

        assert_eq!(map.partitions_by_node_and_state(1, NodeState::ActiveOwner), vec![0, 1]);
        assert!(map.is_owner(1, 1));
        assert!(!map.is_owner(1, 2));
        assert_eq!(map.owner_of(2), Some(2));
        assert_eq!(map.owner_of(9), None);
    }

    #[test]
    fn routes_sorted_by_node_id() {
        let mapper = Mapper::new(1);
        mapper.set_route(2, "http://b");
        mapper.set_route(1, "http://a");
        assert_eq!(mapper.node_ids(), vec![1, 2]);
        assert_eq!(mapper.route(2).as_deref(), Some("http://b"));
        assert_eq!(mapper.route(9), None);
    }
}
