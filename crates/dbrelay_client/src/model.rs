//! Row shapes returned by the high-level project/file API (§4.8).

use serde_json::Value as JsonValue;

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub root_path: String,
    pub name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Project {
    pub(crate) fn from_row(row: &JsonValue) -> Result<Self, ClientError> {
        Ok(Self {
            id: field_str(row, "id")?,
            root_path: field_str(row, "root_path")?,
            name: row.get("name").and_then(JsonValue::as_str).map(str::to_string),
            created_at: field_timestamp(row, "created_at")?,
            updated_at: field_timestamp(row, "updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub project_id: String,
    pub path: String,
    pub needs_chunking: bool,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FileRecord {
    pub(crate) fn from_row(row: &JsonValue) -> Result<Self, ClientError> {
        Ok(Self {
            id: row
                .get("id")
                .and_then(JsonValue::as_i64)
                .ok_or_else(|| ClientError::Protocol("file row missing id".into()))?,
            project_id: field_str(row, "project_id")?,
            path: field_str(row, "path")?,
            needs_chunking: row.get("needs_chunking").and_then(JsonValue::as_i64).unwrap_or(0) != 0,
            deleted: row.get("deleted").and_then(JsonValue::as_i64).unwrap_or(0) != 0,
            created_at: field_timestamp(row, "created_at")?,
            updated_at: field_timestamp(row, "updated_at")?,
        })
    }
}

fn field_str(row: &JsonValue, field: &str) -> Result<String, ClientError> {
    row.get(field)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClientError::Protocol(format!("row missing field {field}")))
}

/// `strftime('%s', 'now')` comes back over the wire as a numeric-looking
/// string, not a JSON number.
fn field_timestamp(row: &JsonValue, field: &str) -> Result<i64, ClientError> {
    match row.get(field) {
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ClientError::Protocol(format!("{field} is not an integer timestamp"))),
        Some(JsonValue::String(s)) => s
            .parse()
            .map_err(|_| ClientError::Protocol(format!("{field} is not a parseable timestamp"))),
        _ => Err(ClientError::Protocol(format!("row missing field {field}"))),
    }
}
