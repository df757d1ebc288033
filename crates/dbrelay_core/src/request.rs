use serde_json::{Map, Value as JsonValue};

use crate::error::DbError;

fn obj(params: &JsonValue) -> Result<&Map<String, JsonValue>, DbError> {
    params
        .as_object()
        .ok_or_else(|| DbError::Validation("params must be an object".to_string()))
}

fn require_string(map: &Map<String, JsonValue>, key: &str) -> Result<String, DbError> {
    map.get(key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DbError::Validation(format!("{key} must be a non-empty string")))
}

fn require_object(map: &Map<String, JsonValue>, key: &str) -> Result<Map<String, JsonValue>, DbError> {
    let value = map
        .get(key)
        .and_then(JsonValue::as_object)
        .ok_or_else(|| DbError::Validation(format!("{key} must be an object")))?;
    if value.is_empty() {
        return Err(DbError::Validation(format!("{key} cannot be empty")));
    }
    Ok(value.clone())
}

fn optional_non_negative(map: &Map<String, JsonValue>, key: &str) -> Result<Option<i64>, DbError> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(v) => {
            let n = v
                .as_i64()
                .ok_or_else(|| DbError::Validation(format!("{key} must be a non-negative integer")))?;
            if n < 0 {
                return Err(DbError::Validation(format!("{key} must be a non-negative integer")));
            }
            Ok(Some(n))
        }
    }
}

fn optional_string_list(map: &Map<String, JsonValue>, key: &str) -> Result<Option<Vec<String>>, DbError> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Array(items)) => {
            let strings = items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| DbError::Validation(format!("{key} entries must be strings")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(strings))
        }
        Some(_) => Err(DbError::Validation(format!("{key} must be a list or null"))),
    }
}

/// `create_table` (§4.2): non-empty table name, at least one column.
pub struct CreateTableRequest {
    pub schema: Map<String, JsonValue>,
}

impl CreateTableRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        let schema = require_object(map, "schema")?;
        let name = schema
            .get("name")
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DbError::Validation("schema.name must be a non-empty string".to_string()))?;
        let columns = schema
            .get("columns")
            .and_then(JsonValue::as_array)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| DbError::Validation("schema.columns must be a non-empty list".to_string()))?;
        let _ = (name, columns);
        Ok(Self { schema })
    }
}

/// `drop_table` / `get_table_info`: a bare non-empty table name.
pub struct TableNameRequest {
    pub table_name: String,
}

impl TableNameRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        Ok(Self {
            table_name: require_string(map, "table_name")?,
        })
    }
}

pub struct InsertRequest {
    pub table_name: String,
    pub data: Map<String, JsonValue>,
}

impl InsertRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        Ok(Self {
            table_name: require_string(map, "table_name")?,
            data: require_object(map, "data")?,
        })
    }
}

pub struct SelectRequest {
    pub table_name: String,
    pub where_: Option<Map<String, JsonValue>>,
    pub columns: Option<Vec<String>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub order_by: Option<Vec<String>>,
}

impl SelectRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        let where_ = match map.get("where") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Object(o)) => Some(o.clone()),
            Some(_) => return Err(DbError::Validation("where must be an object or null".to_string())),
        };
        Ok(Self {
            table_name: require_string(map, "table_name")?,
            where_,
            columns: optional_string_list(map, "columns")?,
            limit: optional_non_negative(map, "limit")?,
            offset: optional_non_negative(map, "offset")?,
            order_by: optional_string_list(map, "order_by")?,
        })
    }
}

pub struct UpdateRequest {
    pub table_name: String,
    pub where_: Map<String, JsonValue>,
    pub data: Map<String, JsonValue>,
}

impl UpdateRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        Ok(Self {
            table_name: require_string(map, "table_name")?,
            where_: require_object(map, "where")?,
            data: require_object(map, "data")?,
        })
    }
}

pub struct DeleteRequest {
    pub table_name: String,
    pub where_: Map<String, JsonValue>,
}

impl DeleteRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        Ok(Self {
            table_name: require_string(map, "table_name")?,
            where_: require_object(map, "where")?,
        })
    }
}

/// `execute` / one operation inside `execute_batch`.
pub struct ExecuteRequest {
    pub sql: String,
    pub params: JsonValue,
    pub transaction_id: Option<String>,
}

impl ExecuteRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        let sql = require_string(map, "sql")?;
        let sql_params = map.get("params").cloned().unwrap_or(JsonValue::Null);
        match &sql_params {
            JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => {}
            _ => return Err(DbError::Validation("params must be a list, object, or null".to_string())),
        }
        let transaction_id = match map.get("transaction_id") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(_) => return Err(DbError::Validation("transaction_id must be a string".to_string())),
        };
        Ok(Self {
            sql,
            params: sql_params,
            transaction_id,
        })
    }
}

pub struct ExecuteBatchRequest {
    pub operations: Vec<(String, JsonValue)>,
    pub transaction_id: Option<String>,
}

impl ExecuteBatchRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        let ops_value = map
            .get("operations")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| DbError::Validation("operations must be a list".to_string()))?;
        let mut operations = Vec::with_capacity(ops_value.len());
        for op in ops_value {
            let op_obj = op
                .as_object()
                .ok_or_else(|| DbError::Validation("each operation must be an object".to_string()))?;
            let sql = require_string(op_obj, "sql")?;
            let op_params = op_obj.get("params").cloned().unwrap_or(JsonValue::Null);
            operations.push((sql, op_params));
        }
        let transaction_id = match map.get("transaction_id") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(_) => return Err(DbError::Validation("transaction_id must be a string".to_string())),
        };
        Ok(Self {
            operations,
            transaction_id,
        })
    }
}

pub struct TransactionIdRequest {
    pub transaction_id: String,
}

impl TransactionIdRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        Ok(Self {
            transaction_id: require_string(map, "transaction_id")?,
        })
    }
}

pub struct SyncSchemaRequest {
    pub schema_definition: Map<String, JsonValue>,
    pub backup_dir: Option<String>,
}

impl SyncSchemaRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        let schema_definition = map
            .get("schema_definition")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| DbError::Validation("schema_definition must be an object".to_string()))?
            .clone();
        let backup_dir = match map.get("backup_dir") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(_) => return Err(DbError::Validation("backup_dir must be a string".to_string())),
        };
        Ok(Self {
            schema_definition,
            backup_dir,
        })
    }
}

/// `index_file` (§4.6): both fields required, `file_path` must be absolute.
pub struct IndexFileRequest {
    pub file_path: String,
    pub project_id: String,
}

impl IndexFileRequest {
    pub fn parse(params: &JsonValue) -> Result<Self, DbError> {
        let map = obj(params)?;
        let file_path = require_string(map, "file_path")?;
        let project_id = require_string(map, "project_id")?;
        if !file_path.starts_with('/') {
            return Err(DbError::Validation("file_path must be absolute".to_string()));
        }
        Ok(Self {
            file_path,
            project_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_requires_non_empty_table_and_data() {
        assert!(InsertRequest::parse(&serde_json::json!({"table_name": "", "data": {"a": 1}})).is_err());
        assert!(InsertRequest::parse(&serde_json::json!({"table_name": "t", "data": {}})).is_err());
        assert!(InsertRequest::parse(&serde_json::json!({"table_name": "t", "data": {"a": 1}})).is_ok());
    }

    #[test]
    fn select_limit_offset_must_be_non_negative() {
        assert!(SelectRequest::parse(&serde_json::json!({"table_name": "t", "limit": -1})).is_err());
        assert!(SelectRequest::parse(&serde_json::json!({"table_name": "t", "limit": 5})).is_ok());
    }

    #[test]
    fn index_file_requires_absolute_path() {
        assert!(IndexFileRequest::parse(
            &serde_json::json!({"file_path": "rel/path.py", "project_id": "p1"})
        )
        .is_err());
        assert!(IndexFileRequest::parse(
            &serde_json::json!({"file_path": "/abs/path.py", "project_id": "p1"})
        )
        .is_ok());
    }
}
