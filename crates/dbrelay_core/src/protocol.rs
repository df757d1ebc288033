use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ErrorCode;

/// One JSON-RPC request frame (§6). `params` is always an object; `id` is
/// always present on the wire — the client fills it in before sending if
/// the caller didn't supply one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RPCRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: JsonValue,
    pub id: String,
}

impl RPCRequest {
    pub fn new(method: impl Into<String>, params: JsonValue, id: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }
}

/// Wire-level error object (§6). Distinct from [`crate::result::Result`]'s
/// `Error` variant: this is what actually travels in `RPCResponse.error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RPCError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl RPCError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

/// One JSON-RPC response frame. Exactly one of `result`/`error` is set —
/// enforced by construction, not by runtime assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RPCResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RPCError>,
}

impl RPCResponse {
    pub fn success(id: impl Into<String>, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: RPCError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
