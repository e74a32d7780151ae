use serde_json::Value;

use crate::helpers::{rows_of, seed_orders, spawn_node};

#[tokio::test(flavor = "multi_thread")]
async fn ping_pongs() {
    let node = spawn_node(4).await;
    let response = node.client.get(node.url("/ping")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), r#"{"pong":true}"#);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_routes_reply_structured() {
    let node = spawn_node(4).await;
    let response = node
        .client
        .get(node.url("/v1/nothing/here"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "unknown request");
}

#[tokio::test(flavor = "multi_thread")]
async fn person_lookup_routes_to_owning_partition() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .get(node.url("/v1/query/orders/person?id=14"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], 14);
    assert_eq!(body["props"]["country"], "US");
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn person_lookup_misses_cleanly() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .get(node.url("/v1/query/orders/person?id=9999"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "item_not_found");
}

#[tokio::test(flavor = "multi_thread")]
async fn person_query_requires_an_id() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .get(node.url("/v1/query/orders/person?id=0"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["class"], "query");
    assert_eq!(body["error"]["code"], "general_error");
}

#[tokio::test(flavor = "multi_thread")]
async fn event_query_merges_sorts_and_trims() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .post(node.url("/v1/query/orders/event?sort=revenue&order=desc&trim=10"))
        .body("group country\ncount as orders\nsum total as revenue\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let rows = rows_of(&body);

    // Two countries, both within the trim.
    assert_eq!(rows.len(), 2);
    let groups: Vec<&str> = rows.iter().map(|(g, _)| g.as_str().unwrap()).collect();
    assert!(groups.contains(&"US") && groups.contains(&"DE"));

    // 20 events per country; revenue sorted descending and unscaled.
    for (_, cells) in &rows {
        assert_eq!(cells[0], 20);
    }
    // Totals are (id % 10) * 10 summed per parity: odd ids (DE) hit
    // residues 1,3,5,7,9 for 1000 total, even ids (US) 2,4,6,8,0 for 800.
    let revenue: Vec<f64> = rows.iter().map(|(_, c)| c[1].as_f64().unwrap()).collect();
    assert_eq!(revenue, vec![1000.0, 800.0]);
    assert_eq!(rows[0].0, "DE");
}

#[tokio::test(flavor = "multi_thread")]
async fn debug_replies_with_disassembly() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .post(node.url("/v1/query/orders/event?debug=true"))
        .body("group country\ncount\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    assert!(text.contains("group"));
    assert!(text.contains("Count"));
}

#[tokio::test(flavor = "multi_thread")]
async fn segment_endpoint_materializes_and_counts() {
    let node = spawn_node(4).await;
    let table = seed_orders(&node);

    let script = "\
@segment high_value ttl=3600
filter total gte 50

@segment everyone

@segment germans
filter country eq \"DE\"
";
    let response = node
        .client
        .post(node.url("/v1/query/orders/segment"))
        .body(script)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // ttl flag reached the table metadata on the fork node.
    assert_eq!(table.segment_meta("high_value").unwrap().ttl, Some(3600));

    let body: Value = response.json().await.unwrap();
    let rows = rows_of(&body);
    assert_eq!(rows.len(), 3);
    let count_of = |name: &str| {
        rows.iter()
            .find(|(g, _)| g == name)
            .map(|(_, c)| c[0].as_i64().unwrap())
            .unwrap()
    };
    assert_eq!(count_of("everyone"), 40);
    assert_eq!(count_of("germans"), 20);
    assert_eq!(count_of("high_value"), 20);

    // Membership is resident on the partitions afterwards.
    let data = table.get_partition(1).unwrap();
    assert!(data.read().unwrap().has_segment("high_value"));
}

#[tokio::test(flavor = "multi_thread")]
async fn column_counts_values() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .get(node.url("/v1/query/orders/column/country?order=desc"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let rows = rows_of(&body);
    assert_eq!(rows.len(), 2);
    for (_, cells) in &rows {
        assert_eq!(cells[0], 20);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn column_regex_filters_text() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .get(node.url("/v1/query/orders/column/country?rx=%5EUS"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let rows = rows_of(&response.json().await.unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "US");
    assert_eq!(rows[0].1[0], 20);
}

#[tokio::test(flavor = "multi_thread")]
async fn histogram_fills_contiguous_buckets() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .post(node.url(
            "/v1/query/orders/histogram/revenue?bucket=10&min=0&max=100&order=asc",
        ))
        .body("return total\n")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let rows = rows_of(&response.json().await.unwrap());

    // Buckets 0,10,...,100 inclusive, ascending.
    let groups: Vec<i64> = rows.iter().map(|(g, _)| g.as_i64().unwrap()).collect();
    assert_eq!(groups, (0..=10).map(|b| b * 10).collect::<Vec<i64>>());

    // Four persons per populated decade; the forced tail bucket zero-fills.
    for (group, cells) in &rows {
        let expected = if group.as_i64().unwrap() == 100 { 0 } else { 4 };
        assert_eq!(cells[0].as_i64().unwrap(), expected, "bucket {group}");
    }
}
