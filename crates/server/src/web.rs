//! Request/reply plumbing between the HTTP intake and the coordinator.
//!
//! A [`Message`] decouples the axum handler from whoever eventually replies:
//! the coordinator on validation errors, a shuttle completion closure on the
//! fork path. The reply handle is single-use by construction; if the client
//! went away the send fails and the result is discarded, which is the
//! accepted cancellation model.

use std::collections::HashMap;

use axum::http::StatusCode;
use bytes::Bytes;
use tokio::sync::oneshot;

use openset_core::QueryError;

#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
    pub content_type: &'static str,
}

impl Reply {
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self {
            status,
            body: Bytes::from(serde_json::to_vec(value).unwrap_or_default()),
            content_type: "application/json",
        }
    }
}

pub struct Message {
    pub method: String,
    pub path: String,
    pub params: HashMap<String, String>,
    pub body: Bytes,
    reply_tx: oneshot::Sender<Reply>,
}

impl Message {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        params: HashMap<String, String>,
        body: Bytes,
    ) -> (Self, oneshot::Receiver<Reply>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        (
            Self {
                method: method.into(),
                path: path.into(),
                params,
                body,
                reply_tx,
            },
            reply_rx,
        )
    }

    pub fn is_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }

    pub fn param_str(&self, name: &str, default: &str) -> String {
        self.param(name).unwrap_or(default).to_string()
    }

    pub fn param_bool(&self, name: &str) -> bool {
        matches!(self.param(name), Some("true") | Some("1"))
    }

    pub fn param_i64(&self, name: &str, default: i64) -> i64 {
        self.param(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn param_f64(&self, name: &str, default: f64) -> f64 {
        self.param(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Reply and consume the handle. A dropped client is not an error.
    pub fn reply(self, status: StatusCode, body: impl Into<Bytes>, content_type: &'static str) {
        let _ = self.reply_tx.send(Reply {
            status,
            body: body.into(),
            content_type,
        });
    }

    pub fn reply_json(self, status: StatusCode, value: &serde_json::Value) {
        let _ = self.reply_tx.send(Reply::json(status, value));
    }

    pub fn reply_binary(self, body: Bytes) {
        self.reply(StatusCode::OK, body, "application/octet-stream")
    }

    pub fn reply_text(self, body: String) {
        self.reply(StatusCode::OK, body, "text/plain")
    }

    /// The 4xx error reply every endpoint funnels through.
    pub fn reply_error(self, error: QueryError) {
        self.reply_json(StatusCode::BAD_REQUEST, &error.to_json());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(params: &[(&str, &str)]) -> (Message, oneshot::Receiver<Reply>) {
        Message::new(
            "POST",
            "/v1/query/orders/event",
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Bytes::new(),
        )
    }

    #[test]
    fn params_coerce_with_defaults() {
        let (msg, _rx) = message(&[("trim", "10"), ("fork", "true"), ("order", "asc")]);
        assert_eq!(msg.param_i64("trim", -1), 10);
        assert_eq!(msg.param_i64("missing", -1), -1);
        assert!(msg.param_bool("fork"));
        assert!(!msg.param_bool("debug"));
        assert_eq!(msg.param_str("order", "desc"), "asc");
    }

    #[tokio::test]
    async fn reply_travels_the_channel() {
        let (msg, rx) = message(&[]);
        msg.reply_error(QueryError::query("missing or invalid table name"));
        let reply = rx.await.unwrap();
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        let parsed = QueryError::from_json(&reply.body).unwrap();
        assert_eq!(parsed.message, "missing or invalid table name");
    }
}
