use serde_json::Value as JsonValue;

use crate::error::ErrorCode;
use crate::protocol::{RPCError, RPCResponse};

/// The three-variant handler result (§3). Every handler returns exactly one
/// of these; the dispatcher never has to inspect payload shape to decide
/// which wire envelope to build — the variant tag decides it.
#[derive(Debug, Clone)]
pub enum OpResult {
    /// A structured return value, e.g. `{affected_rows, lastrowid}`.
    Success { data: JsonValue },
    /// An ordered sequence of row-mappings, e.g. the output of `select`.
    Data { rows: Vec<JsonValue> },
    Error {
        code: ErrorCode,
        description: String,
        details: Option<JsonValue>,
    },
}

impl OpResult {
    pub fn success(data: JsonValue) -> Self {
        OpResult::Success { data }
    }

    pub fn data(rows: Vec<JsonValue>) -> Self {
        OpResult::Data { rows }
    }

    pub fn error(code: ErrorCode, description: impl Into<String>) -> Self {
        OpResult::Error {
            code,
            description: description.into(),
            details: None,
        }
    }

    pub fn error_with_details(
        code: ErrorCode,
        description: impl Into<String>,
        details: JsonValue,
    ) -> Self {
        OpResult::Error {
            code,
            description: description.into(),
            details: Some(details),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OpResult::Error { .. })
    }

    /// Convert into the wire-level response for the given request id.
    pub fn into_response(self, request_id: impl Into<String>) -> RPCResponse {
        match self {
            OpResult::Success { data } => {
                let body = serde_json::json!({ "success": true, "data": data });
                RPCResponse::success(request_id, body)
            }
            OpResult::Data { rows } => {
                let body = serde_json::json!({ "success": true, "data": rows });
                RPCResponse::success(request_id, body)
            }
            OpResult::Error {
                code,
                description,
                details,
            } => {
                let mut err = RPCError::new(code, description);
                if let Some(details) = details {
                    err = err.with_data(details);
                }
                RPCResponse::failure(request_id, err)
            }
        }
    }
}

impl From<crate::error::DbError> for OpResult {
    fn from(err: crate::error::DbError) -> Self {
        OpResult::error(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_and_data_both_serialize_data_key() {
        let success = OpResult::success(serde_json::json!({"affected_rows": 1}));
        let response = success.into_response("req-1");
        assert!(!response.is_error());
        assert_eq!(
            response.result.unwrap()["data"]["affected_rows"],
            serde_json::json!(1)
        );

        let data = OpResult::data(vec![serde_json::json!({"id": 1})]);
        let response = data.into_response("req-2");
        assert!(response.result.unwrap()["data"].is_array());
    }

    #[test]
    fn error_carries_code_and_description() {
        let result = OpResult::error(ErrorCode::ValidationError, "bad params");
        let response = result.into_response("req-3");
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::ValidationError);
        assert_eq!(error.message, "bad params");
    }
}
