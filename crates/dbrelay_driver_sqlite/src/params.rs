//! Binding of the wire-level `params` value (§4.2: list, mapping, or null) onto
//! a `rusqlite` statement, and decoding rows back into JSON mappings.

use dbrelay_core::{DbError, SqlValue, rusqlite_value_to_json};
use rusqlite::{Connection, Row};
use serde_json::{Map, Value as JsonValue};

/// Runs `sql` against `conn` with positional (`?`) or named (`:key`) params
/// depending on the JSON shape, returning `(affected_rows, last_insert_rowid)`.
pub fn execute(conn: &Connection, sql: &str, params: &JsonValue) -> Result<(usize, i64), DbError> {
    let affected = match params {
        JsonValue::Null => conn.execute(sql, [])?,
        JsonValue::Array(items) => {
            let values = items
                .iter()
                .map(SqlValue::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DbError::Validation(e.to_string()))?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|v| v as &dyn rusqlite::types::ToSql).collect();
            conn.execute(sql, refs.as_slice())?
        }
        JsonValue::Object(map) => {
            let named = named_params(map)?;
            let refs: Vec<(&str, &dyn rusqlite::types::ToSql)> = named
                .iter()
                .map(|(k, v)| (k.as_str(), v as &dyn rusqlite::types::ToSql))
                .collect();
            conn.execute(sql, refs.as_slice())?
        }
        _ => return Err(DbError::Validation("params must be a list, object, or null".to_string())),
    };
    Ok((affected, conn.last_insert_rowid()))
}

fn named_params(map: &Map<String, JsonValue>) -> Result<Vec<(String, SqlValue)>, DbError> {
    map.iter()
        .map(|(k, v)| {
            let value = SqlValue::from_json(v).map_err(|e| DbError::Validation(e.to_string()))?;
            Ok((format!(":{k}"), value))
        })
        .collect()
}

/// Runs a `SELECT`-shaped query and decodes every row into a JSON object
/// keyed by column name.
pub fn query_rows(conn: &Connection, sql: &str, params: &JsonValue) -> Result<Vec<JsonValue>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

    let to_row_json = |row: &Row| -> rusqlite::Result<JsonValue> {
        let mut obj = Map::with_capacity(column_names.len());
        for (i, name) in column_names.iter().enumerate() {
            obj.insert(name.clone(), rusqlite_value_to_json(row.get_ref(i)?));
        }
        Ok(JsonValue::Object(obj))
    };

    let rows: Vec<JsonValue> = match params {
        JsonValue::Null => stmt
            .query_map([], to_row_json)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        JsonValue::Array(items) => {
            let values = items
                .iter()
                .map(SqlValue::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DbError::Validation(e.to_string()))?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|v| v as &dyn rusqlite::types::ToSql).collect();
            stmt.query_map(refs.as_slice(), to_row_json)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
        JsonValue::Object(map) => {
            let named = named_params(map)?;
            let refs: Vec<(&str, &dyn rusqlite::types::ToSql)> = named
                .iter()
                .map(|(k, v)| (k.as_str(), v as &dyn rusqlite::types::ToSql))
                .collect();
            stmt.query_map(refs.as_slice(), to_row_json)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
        _ => return Err(DbError::Validation("params must be a list, object, or null".to_string())),
    };
    Ok(rows)
}

/// Binds plain positional values built internally by the CRUD helpers (never
/// user-supplied raw SQL), e.g. the values half of an `UPDATE ... SET`.
pub fn positional(conn: &Connection, sql: &str, values: &[SqlValue]) -> Result<usize, DbError> {
    let refs: Vec<&dyn rusqlite::types::ToSql> =
        values.iter().map(|v| v as &dyn rusqlite::types::ToSql).collect();
    Ok(conn.execute(sql, refs.as_slice())?)
}
