use dbrelay_core::DbError;
use serde_json::{Map, Value as JsonValue};

use crate::driver::SqliteDriver;

impl SqliteDriver {
    /// `PRAGMA table_info` returns zero rows for a non-existent table, so the
    /// "non-existent table → empty sequence" contract (§9) holds without any
    /// special-casing.
    pub fn get_table_info(&self, table_name: &str) -> Result<Vec<JsonValue>, DbError> {
        let conn = self.shared();
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table_name})"))?;
        let rows = stmt
            .query_map([], |row| {
                let notnull: i64 = row.get(3)?;
                let pk: i64 = row.get(5)?;
                let mut obj = Map::new();
                obj.insert("name".into(), JsonValue::from(row.get::<_, String>(1)?));
                obj.insert("type".into(), JsonValue::from(row.get::<_, String>(2)?));
                obj.insert("nullable".into(), JsonValue::from(notnull == 0));
                obj.insert(
                    "default".into(),
                    row.get::<_, Option<String>>(4)?.map(JsonValue::from).unwrap_or(JsonValue::Null),
                );
                obj.insert("primary_key".into(), JsonValue::from(pk != 0));
                Ok(JsonValue::Object(obj))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// `sync_schema` (§4.4): create tables that don't exist yet, note the
    /// ones that do as "modified" without altering them — a full
    /// column-level diff is out of scope (§1, "SQL table schemas" non-goal).
    pub fn sync_schema(
        &self,
        schema_definition: &Map<String, JsonValue>,
        _backup_dir: Option<&str>,
    ) -> Result<JsonValue, DbError> {
        let mut created = Vec::new();
        let mut modified = Vec::new();
        let mut errors = Vec::new();

        let tables = schema_definition.get("tables").and_then(JsonValue::as_array).cloned().unwrap_or_default();
        for table_schema in tables {
            let Some(table_name) = table_schema.get("name").and_then(JsonValue::as_str).map(str::to_string) else {
                continue;
            };
            let exists = {
                let conn = self.shared();
                conn.query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?1",
                    [table_name.as_str()],
                    |_| Ok(()),
                )
                .is_ok()
            };
            if exists {
                modified.push(table_name);
                continue;
            }
            let Some(schema_obj) = table_schema.as_object() else {
                errors.push(format!("invalid schema for table {table_name}"));
                continue;
            };
            match self.create_table(schema_obj) {
                Ok(_) => created.push(table_name),
                Err(e) => errors.push(format!("error processing table {table_name}: {e}")),
            }
        }

        let mut obj = Map::new();
        obj.insert("created_tables".into(), JsonValue::from(created));
        obj.insert("modified_tables".into(), JsonValue::from(modified));
        obj.insert("errors".into(), JsonValue::from(errors));
        Ok(JsonValue::Object(obj))
    }
}
