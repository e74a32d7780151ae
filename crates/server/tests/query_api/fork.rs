use openset_result::{internode_to_result_set, is_internode, ResultSet};
use serde_json::Value;

use crate::helpers::{disown_all, rows_of, seed_orders, spawn_node};

#[tokio::test(flavor = "multi_thread")]
async fn forked_request_replies_binary_partial() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .post(node.url("/v1/query/orders/event?fork=true"))
        .body("group country\ncount\nsum total as revenue\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.bytes().await.unwrap();
    assert!(is_internode(&body));

    let set = internode_to_result_set(&body).unwrap();
    assert_eq!(set.row_count(), 2);

    // The binary partial carries the same aggregate the JSON path reports:
    // 40 events total, revenue still in fixed-point units.
    let mut count = 0;
    let mut revenue = 0;
    for (_, cells) in set.rows() {
        count += cells[0].value;
        revenue += cells[1].value;
    }
    assert_eq!(count, 40);
    assert_eq!(revenue, 1_800 * 10_000);
}

#[tokio::test(flavor = "multi_thread")]
async fn fork_and_nofork_agree_on_the_single_owner() {
    let node = spawn_node(4).await;
    seed_orders(&node);
    let script = "group country\ncount\nsum total as revenue\n";

    let json: Value = node
        .client
        .post(node.url("/v1/query/orders/event?sort=key&order=asc"))
        .body(script)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let binary = node
        .client
        .post(node.url("/v1/query/orders/event?fork=true"))
        .body(script)
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let set = internode_to_result_set(&binary).unwrap();

    // The single owner's binary partial aggregates to exactly the JSON rows.
    let rows = rows_of(&json);
    assert_eq!(set.row_count(), rows.len());
    for (_, cells) in rows_of(&json) {
        let count = cells[0].as_i64().unwrap();
        assert!(set
            .rows()
            .any(|(_, set_cells)| set_cells[0].value == count));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_owned_partitions_reply_empty_wire_buffer() {
    let node = spawn_node(4).await;
    seed_orders(&node);
    disown_all(&node);

    let response = node
        .client
        .post(node.url("/v1/query/orders/event?fork=true"))
        .body("count\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.bytes().await.unwrap();
    assert!(is_internode(&body));
    let set: ResultSet = internode_to_result_set(&body).unwrap();
    assert!(set.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn segment_compare_mode_prefixes_rows() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    // Materialize a segment, then query against it plus the population.
    node.client
        .post(node.url("/v1/query/orders/segment"))
        .body("@segment germans\nfilter country eq \"DE\"\n")
        .send()
        .await
        .unwrap();

    let response = node
        .client
        .post(node.url("/v1/query/orders/event?segments=germans,*"))
        .body("count as people\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let rows = rows_of(&response.json().await.unwrap());

    // One row per segment; group keys render the segment names.
    assert_eq!(rows.len(), 2);
    let count_of = |name: &str| {
        rows.iter()
            .find(|(g, _)| g[0] == name)
            .map(|(_, c)| c[0].as_i64().unwrap())
            .unwrap()
    };
    assert_eq!(count_of("germans"), 20);
    assert_eq!(count_of("*"), 40);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_segment_surfaces_through_the_shuttle() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .post(node.url("/v1/query/orders/event?segments=nope"))
        .body("count\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "item_not_found");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("nope"));
}
