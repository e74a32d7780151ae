use serde_json::Value;

use crate::helpers::{seed_orders, spawn_node};

#[tokio::test(flavor = "multi_thread")]
async fn batch_runs_segments_then_queries() {
    let node = spawn_node(4).await;
    let table = seed_orders(&node);

    let script = "\
@use germans
@segment germans ttl=3600
filter country eq \"DE\"

@event by_country
group country
count as people
";
    let response = node
        .client
        .post(node.url("/v1/query/orders/batch"))
        .body(script)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();

    // One collected sub-query response.
    let results = body["_"].as_array().unwrap();
    assert_eq!(results.len(), 1);

    // The event section ran in segment-compare mode against the segment the
    // first phase materialized: rows keyed [segment, country].
    let rows = results[0]["_"].as_array().unwrap();
    assert!(!rows.is_empty());
    for row in rows {
        assert_eq!(row["g"][0], "germans");
    }
    let total: i64 = rows.iter().map(|r| r["c"][0].as_i64().unwrap()).sum();
    assert_eq!(total, 20);

    // The segment phase also applied its ttl flag.
    assert_eq!(table.segment_meta("germans").unwrap().ttl, Some(3600));
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_aborts_on_segment_failure() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    // The segment script references an unknown column; the query section
    // must never run.
    let script = "\
@segment broken
filter no_such_column eq 1

@event by_country
group country
count
";
    let response = node
        .client
        .post(node.url("/v1/query/orders/batch"))
        .body(script)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["class"], "parse");
}
