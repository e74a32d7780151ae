use std::sync::Arc;

use openset_core::config::{ClusterConfig, SchedulerConfig, ServerConfig};
use openset_core::Config;
use openset_db::{ColumnType, Columns, Event, FieldValue, Table};
use openset_server::state::AppState;
use openset_server::{router, startup};

pub struct TestNode {
    pub state: Arc<AppState>,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestNode {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Boot a single-node cluster on a loopback port. The node routes to
/// itself, so originator queries exercise the real fork protocol.
pub async fn spawn_node(partition_max: usize) -> TestNode {
    let config = Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            query_cap: 8,
        },
        cluster: ClusterConfig {
            node_id: 1,
            partition_max,
            routes: Vec::new(),
        },
        scheduler: SchedulerConfig {
            workers: 2,
            run_interval_ms: 20,
        },
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = startup::build_app_state(config, port);
    let app = router::build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestNode {
        state,
        base_url: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
    }
}

/// Strip this node of all partition ownership, as if every partition
/// migrated away.
pub fn disown_all(node: &TestNode) {
    let node_id = node.state.mapper.node_id();
    for partition in 0..node.state.pool.partition_max() as i32 {
        node.state.mapper.partition_map.remove_node(partition, node_id);
        node.state.pool.drop_partition(partition);
    }
}

/// The standard test table: 40 persons, one event each.
///
/// Person `id` lands on partition `id % partition_max` (matching the person
/// endpoint's routing); its event has `total = (id % 10) * 10.0` and
/// `country = US` for even ids, `DE` for odd.
pub fn seed_orders(node: &TestNode) -> Arc<Table> {
    let table = Table::new(
        "orders",
        Columns::from_pairs(&[
            ("total", ColumnType::Double),
            ("country", ColumnType::Text),
            ("visits", ColumnType::Int),
        ]),
    );
    startup::attach_table(&node.state, table.clone());

    let partition_max = node.state.pool.partition_max() as u64;
    for id in 1..=40i64 {
        let partition = (id.unsigned_abs() % partition_max) as i32;
        let data = table.get_make_partition(partition);
        let mut guard = data.write().unwrap();
        let person = guard.get_make_person(id);
        person.add_event(Event {
            stamp: 1_000 + id,
            values: vec![
                (0, FieldValue::Double((id % 10) as f64 * 10.0)),
                (
                    1,
                    FieldValue::Text(if id % 2 == 0 { "US" } else { "DE" }.to_string()),
                ),
            ],
        });
    }
    table
}

/// Rows of a reply as (group, cells) pairs.
pub fn rows_of(body: &serde_json::Value) -> Vec<(serde_json::Value, Vec<serde_json::Value>)> {
    body["_"]
        .as_array()
        .expect("reply should carry a '_' row array")
        .iter()
        .map(|row| {
            (
                row["g"].clone(),
                row["c"].as_array().cloned().unwrap_or_default(),
            )
        })
        .collect()
}
