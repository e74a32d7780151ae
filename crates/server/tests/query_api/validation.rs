use serde_json::Value;

use crate::helpers::{seed_orders, spawn_node};

async fn post_event(node: &crate::helpers::TestNode, path: &str, body: &'static str) -> (u16, Value) {
    let response = node
        .client
        .post(node.url(path))
        .body(body)
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_table_is_a_general_error() {
    let node = spawn_node(4).await;
    let (status, body) = post_event(&node, "/v1/query/nope/event", "count\n").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["class"], "query");
    assert_eq!(body["error"]["code"], "general_error");
    assert_eq!(body["error"]["message"], "table could not be found");
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_script_is_rejected() {
    let node = spawn_node(4).await;
    seed_orders(&node);
    let (status, body) = post_event(&node, "/v1/query/orders/event", "").await;
    assert_eq!(status, 400);
    assert_eq!(
        body["error"]["message"],
        "missing query code (POST query as text)"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn compile_failures_are_parse_errors() {
    let node = spawn_node(4).await;
    seed_orders(&node);
    let (status, body) = post_event(&node, "/v1/query/orders/event", "frobnicate\n").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["class"], "parse");
    assert_eq!(body["error"]["code"], "syntax_error");
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolvable_sort_column_is_rejected() {
    let node = spawn_node(4).await;
    seed_orders(&node);
    let (status, body) =
        post_event(&node, "/v1/query/orders/event?sort=nothing", "count\n").await;
    assert_eq!(status, 400);
    assert_eq!(
        body["error"]["message"],
        "sort column not found in query aggregates"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_segment_list_is_rejected() {
    let node = spawn_node(4).await;
    seed_orders(&node);
    let (status, body) =
        post_event(&node, "/v1/query/orders/event?segments=%2C", "count\n").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "syntax_error");
    assert_eq!(body["error"]["message"], "no segment names specified");
}

#[tokio::test(flavor = "multi_thread")]
async fn incompatible_filter_mode_for_numeric_column() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    // `visits` is an int column; regex filters are text-only.
    let response = node
        .client
        .get(node.url("/v1/query/orders/column/visits?rx=%5EUS"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["class"], "parse");
    assert_eq!(body["error"]["code"], "syntax_error");
    assert_eq!(
        body["error"]["message"],
        "specified filter type not compatible with integer or double column"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn incompatible_filter_mode_for_text_column() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .get(node.url("/v1/query/orders/column/country?gt=5"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"]["message"],
        "specified filter type not compatible with string column"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_regex_fails_without_crashing() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .get(node.url("/v1/query/orders/column/country?rx=%28unclosed"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["class"], "query");
    assert_eq!(body["error"]["code"], "syntax_error");

    // The node is still healthy afterwards.
    let ping = node.client.get(node.url("/ping")).send().await.unwrap();
    assert_eq!(ping.status(), 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn between_requires_an_and_param() {
    let node = spawn_node(4).await;
    seed_orders(&node);

    let response = node
        .client
        .get(node.url("/v1/query/orders/column/total?between=10"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["error"]["message"],
        "column query using 'between' requires an 'and' param"
    );
}
