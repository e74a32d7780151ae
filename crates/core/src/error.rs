//! Query error taxonomy.
//!
//! These are the errors that travel over the wire to clients and between
//! nodes, as opposed to infrastructure errors. The class/code pair is stable
//! protocol surface; the message is free text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Parse,
    Query,
    Config,
    Internode,
    RunTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SyntaxError,
    GeneralError,
    GeneralConfigError,
    RouteError,
    InternodeError,
    ItemNotFound,
    PartitionMigrated,
}

/// A client-visible query error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{class:?}/{code:?}: {message}")]
pub struct QueryError {
    pub class: ErrorClass,
    pub code: ErrorCode,
    pub message: String,
}

impl QueryError {
    pub fn new(class: ErrorClass, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            class,
            code,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Parse, ErrorCode::SyntaxError, message)
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Query, ErrorCode::GeneralError, message)
    }

    pub fn query_syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Query, ErrorCode::SyntaxError, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Config, ErrorCode::GeneralConfigError, message)
    }

    pub fn route(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Config, ErrorCode::RouteError, message)
    }

    pub fn internode(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internode, ErrorCode::InternodeError, message)
    }

    /// Route errors are safe for the client to retry; everything else is not.
    pub fn is_retriable(&self) -> bool {
        self.code == ErrorCode::RouteError
    }

    /// The wire shape: `{"error":{"class":...,"code":...,"message":...}}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut inner = serde_json::json!({
            "class": self.class,
            "code": self.code,
            "message": self.message,
        });
        if self.is_retriable() {
            inner["retriable"] = serde_json::Value::Bool(true);
        }
        serde_json::json!({ "error": inner })
    }

    /// Parse an error out of a reply body, if one is embedded.
    pub fn from_json(body: &[u8]) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        serde_json::from_value(value.get("error")?.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let err = QueryError::route("potential node failure - please re-issue the request");
        let body = serde_json::to_vec(&err.to_json()).unwrap();
        let back = QueryError::from_json(&body).unwrap();
        assert_eq!(back, err);
        assert!(back.is_retriable());
    }

    #[test]
    fn class_and_code_render_snake_case() {
        let err = QueryError::config("unknown column");
        let json = err.to_json();
        assert_eq!(json["error"]["class"], "config");
        assert_eq!(json["error"]["code"], "general_config_error");
        assert!(json["error"].get("retriable").is_none());
    }

    #[test]
    fn from_json_rejects_plain_bodies() {
        assert!(QueryError::from_json(b"{\"pong\":true}").is_none());
        assert!(QueryError::from_json(b"not json").is_none());
    }
}
