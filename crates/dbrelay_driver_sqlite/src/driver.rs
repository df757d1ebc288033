use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dbrelay_core::{DbError, SqlValue};
use rusqlite::Connection;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::params;

/// SQLite implementation of the driver abstraction (§4.4): table-level CRUD,
/// raw execute, batch execute, a transaction registry, and schema inspection.
///
/// The shared connection runs every non-transactional statement in autocommit
/// mode; each `begin_transaction` opens a dedicated connection to the same
/// file so transactional writers never block the shared connection.
pub struct SqliteDriver {
    db_path: PathBuf,
    conn: Mutex<Connection>,
    transactions: Mutex<std::collections::HashMap<Uuid, Connection>>,
}

fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DbError::Internal(e.to_string()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    // WAL isn't supported on every filesystem (e.g. some network mounts); a
    // failure here is not fatal, matching the source driver's behavior.
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");
    Ok(conn)
}

impl SqliteDriver {
    /// Establishes the shared connection (§4.4 `connect`).
    pub fn connect(path: impl Into<PathBuf>) -> Result<Self, DbError> {
        let db_path = path.into();
        let conn = open(&db_path)?;
        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
            transactions: Mutex::new(std::collections::HashMap::new()),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn transactions(&self) -> &Mutex<std::collections::HashMap<Uuid, Connection>> {
        &self.transactions
    }

    /// Rolls back and closes every open transaction, then the shared
    /// connection (§4.4 `disconnect`). Idempotent in spirit: dropping the
    /// driver again is a no-op since the connections are already gone.
    pub fn disconnect(&self) -> Result<(), DbError> {
        let mut transactions = self.transactions.lock().expect("transactions mutex poisoned");
        for (_, conn) in transactions.drain() {
            let _ = conn.execute_batch("ROLLBACK;");
        }
        Ok(())
    }

    pub(crate) fn shared(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite connection mutex poisoned")
    }

    pub(crate) fn connection_for(&self, transaction_id: Option<&str>) -> Result<ConnectionRef<'_>, DbError> {
        match transaction_id {
            None => Ok(ConnectionRef::Shared(self.shared())),
            Some(id) => {
                let uuid = Uuid::parse_str(id)
                    .map_err(|_| DbError::Transaction(format!("unknown transaction: {id}")))?;
                let guard = self.transactions.lock().expect("transactions mutex poisoned");
                if !guard.contains_key(&uuid) {
                    return Err(DbError::Transaction(format!("unknown transaction: {id}")));
                }
                Ok(ConnectionRef::Transaction(guard, uuid))
            }
        }
    }

    pub fn create_table(&self, schema: &Map<String, JsonValue>) -> Result<bool, DbError> {
        let name = schema
            .get("name")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DbError::Validation("schema.name is required".to_string()))?;
        let columns = schema
            .get("columns")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| DbError::Validation("schema.columns is required".to_string()))?;

        let mut column_defs: Vec<String> = Vec::with_capacity(columns.len());
        for col in columns {
            let col_name = col
                .get("name")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| DbError::Validation("column.name is required".to_string()))?;
            let col_type = col.get("type").and_then(JsonValue::as_str).unwrap_or("TEXT");
            let nullable = col.get("nullable").and_then(JsonValue::as_bool).unwrap_or(true);
            let primary_key = col.get("primary_key").and_then(JsonValue::as_bool).unwrap_or(false);

            let mut def = format!("{col_name} {col_type}");
            if !nullable {
                def.push_str(" NOT NULL");
            }
            match col.get("default") {
                None | Some(JsonValue::Null) => {}
                Some(JsonValue::String(s)) => def.push_str(&format!(" DEFAULT '{s}'")),
                Some(v) => def.push_str(&format!(" DEFAULT {v}")),
            }
            if primary_key {
                def.push_str(" PRIMARY KEY");
            }
            column_defs.push(def);
        }

        if let Some(constraints) = schema.get("constraints").and_then(JsonValue::as_array) {
            for constraint in constraints {
                match constraint.get("type").and_then(JsonValue::as_str) {
                    Some("primary_key") => {
                        if let Some(cols) = constraint.get("columns").and_then(JsonValue::as_array) {
                            let cols: Vec<&str> = cols.iter().filter_map(JsonValue::as_str).collect();
                            if !cols.is_empty() {
                                column_defs.push(format!("PRIMARY KEY ({})", cols.join(", ")));
                            }
                        }
                    }
                    Some("foreign_key") => {
                        if let (Some(cols), Some(ref_table), Some(ref_cols)) = (
                            constraint.get("columns").and_then(JsonValue::as_array),
                            constraint.get("references_table").and_then(JsonValue::as_str),
                            constraint.get("references_columns").and_then(JsonValue::as_array),
                        ) {
                            let cols: Vec<&str> = cols.iter().filter_map(JsonValue::as_str).collect();
                            let ref_cols: Vec<&str> = ref_cols.iter().filter_map(JsonValue::as_str).collect();
                            if !cols.is_empty() && !ref_cols.is_empty() {
                                column_defs.push(format!(
                                    "FOREIGN KEY ({}) REFERENCES {} ({})",
                                    cols.join(", "),
                                    ref_table,
                                    ref_cols.join(", ")
                                ));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let sql = format!("CREATE TABLE IF NOT EXISTS {name} ({})", column_defs.join(", "));
        self.shared().execute_batch(&sql)?;
        Ok(true)
    }

    pub fn drop_table(&self, table_name: &str) -> Result<bool, DbError> {
        self.shared()
            .execute_batch(&format!("DROP TABLE IF EXISTS {table_name}"))?;
        Ok(true)
    }

    pub fn insert(&self, table_name: &str, data: &Map<String, JsonValue>) -> Result<i64, DbError> {
        let columns: Vec<&str> = data.keys().map(String::as_str).collect();
        let values = data
            .values()
            .map(SqlValue::from_json)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DbError::Validation(e.to_string()))?;
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {table_name} ({}) VALUES ({placeholders})",
            columns.join(", ")
        );

        let conn = self.shared();
        match params::positional(&conn, &sql, &values) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }

    pub fn update(
        &self,
        table_name: &str,
        where_: &Map<String, JsonValue>,
        data: &Map<String, JsonValue>,
    ) -> Result<usize, DbError> {
        let set_clause = data.keys().map(|k| format!("{k} = ?")).collect::<Vec<_>>().join(", ");
        let where_clause = where_
            .keys()
            .map(|k| format!("{k} = ?"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("UPDATE {table_name} SET {set_clause} WHERE {where_clause}");

        let mut values = data
            .values()
            .map(SqlValue::from_json)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DbError::Validation(e.to_string()))?;
        let where_values = where_
            .values()
            .map(SqlValue::from_json)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DbError::Validation(e.to_string()))?;
        values.extend(where_values);

        let conn = self.shared();
        match params::positional(&conn, &sql, &values) {
            Ok(n) => Ok(n),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }

    pub fn delete(&self, table_name: &str, where_: &Map<String, JsonValue>) -> Result<usize, DbError> {
        let where_clause = where_
            .keys()
            .map(|k| format!("{k} = ?"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("DELETE FROM {table_name} WHERE {where_clause}");
        let values = where_
            .values()
            .map(SqlValue::from_json)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DbError::Validation(e.to_string()))?;

        let conn = self.shared();
        match params::positional(&conn, &sql, &values) {
            Ok(n) => Ok(n),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }

    pub fn select(
        &self,
        table_name: &str,
        where_: Option<&Map<String, JsonValue>>,
        columns: Option<&[String]>,
        limit: Option<i64>,
        offset: Option<i64>,
        order_by: Option<&[String]>,
    ) -> Result<Vec<JsonValue>, DbError> {
        let select_clause = match columns {
            Some(cols) if !cols.is_empty() => cols.join(", "),
            _ => "*".to_string(),
        };
        let mut sql = format!("SELECT {select_clause} FROM {table_name}");

        let mut values = Vec::new();
        if let Some(where_) = where_ {
            if !where_.is_empty() {
                let clause = where_
                    .keys()
                    .map(|k| format!("{k} = ?"))
                    .collect::<Vec<_>>()
                    .join(" AND ");
                sql.push_str(&format!(" WHERE {clause}"));
                values = where_
                    .values()
                    .map(SqlValue::from_json)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| DbError::Validation(e.to_string()))?;
            }
        }
        if let Some(order_by) = order_by {
            if !order_by.is_empty() {
                sql.push_str(&format!(" ORDER BY {}", order_by.join(", ")));
            }
        }
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        } else if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let conn = self.shared();
        let array = JsonValue::Array(values.iter().map(SqlValue::to_json).collect());
        params::query_rows(&conn, &sql, &array)
    }

    /// `execute` (§4.2/§4.4): raw SQL, optionally scoped to a transaction.
    /// Returns `{affected_rows, lastrowid, data?}`.
    pub fn execute(
        &self,
        sql: &str,
        sql_params: &JsonValue,
        transaction_id: Option<&str>,
    ) -> Result<JsonValue, DbError> {
        let conn_ref = self.connection_for(transaction_id)?;
        let conn = conn_ref.as_connection();

        let is_select = sql.trim_start().to_ascii_uppercase().starts_with("SELECT");
        let result = if is_select {
            params::query_rows(conn, sql, sql_params).map(|rows| (rows.len(), 0, Some(rows)))
        } else {
            params::execute(conn, sql, sql_params).map(|(n, rowid)| (n, rowid, None))
        };

        match result {
            Ok((affected, lastrowid, data)) => {
                let mut obj = Map::new();
                obj.insert("affected_rows".into(), JsonValue::from(affected));
                obj.insert("lastrowid".into(), JsonValue::from(lastrowid));
                if let Some(data) = data {
                    obj.insert("data".into(), JsonValue::Array(data));
                }
                Ok(JsonValue::Object(obj))
            }
            Err(e) => {
                if transaction_id.is_none() {
                    let _ = conn.execute_batch("ROLLBACK;");
                }
                Err(e)
            }
        }
    }

    /// `execute_batch` (§4.2): iterates `execute` by default; SQLite has no
    /// faster batched path here since every statement may differ.
    pub fn execute_batch(
        &self,
        operations: &[(String, JsonValue)],
        transaction_id: Option<&str>,
    ) -> Result<Vec<JsonValue>, DbError> {
        operations
            .iter()
            .map(|(sql, params)| self.execute(sql, params, transaction_id))
            .collect()
    }
}

/// Either the shared connection's guard, or a held lock on the transaction
/// map plus the transaction's id — looked up fresh on every access since
/// `HashMap<Uuid, Connection>` entries can't be borrowed across a `MutexGuard`
/// boundary returned by value.
pub(crate) enum ConnectionRef<'a> {
    Shared(std::sync::MutexGuard<'a, Connection>),
    Transaction(std::sync::MutexGuard<'a, std::collections::HashMap<Uuid, Connection>>, Uuid),
}

impl<'a> ConnectionRef<'a> {
    pub(crate) fn as_connection(&self) -> &Connection {
        match self {
            ConnectionRef::Shared(guard) => guard,
            ConnectionRef::Transaction(guard, id) => guard.get(id).expect("transaction checked present"),
        }
    }
}
