use dbrelay_core::DbError;
use serde_json::{Map, Value as JsonValue};

use crate::driver::SqliteDriver;

/// `index_file` (§4.4, §4.6): resolves the project root, refreshes the
/// file's derived content, and clears `needs_chunking`.
///
/// The AST/CST parsing subsystem itself is an external collaborator out of
/// scope for this core (§1); this implementation performs the DB-side
/// bookkeeping the original handler does around that call — project lookup,
/// a `code_content` row, and the `needs_chunking` flag clear — against a
/// deterministic stand-in parse result.
impl SqliteDriver {
    pub fn index_file(&self, file_path: &str, project_id: &str) -> Result<JsonValue, DbError> {
        let root_path = {
            let conn = self.shared();
            conn.query_row(
                "SELECT root_path FROM projects WHERE id = ?1",
                [project_id],
                |row| row.get::<_, String>(0),
            )
            .map_err(|_| DbError::Database(format!("project not found: {project_id}")))?
        };

        if !std::path::Path::new(file_path).starts_with(&root_path)
            && !std::path::Path::new(file_path).exists()
        {
            return Err(DbError::Database(format!("file not found: {file_path}")));
        }

        let file_exists = {
            let conn = self.shared();
            conn.query_row(
                "SELECT 1 FROM files WHERE path = ?1 AND project_id = ?2",
                rusqlite::params![file_path, project_id],
                |_| Ok(()),
            )
            .is_ok()
        };
        if !file_exists {
            return Err(DbError::Database(format!("file not found: {file_path}")));
        }

        let content_len = std::fs::metadata(file_path).map(|m| m.len() as i64).unwrap_or(0);

        {
            let conn = self.shared();
            conn.execute(
                "INSERT INTO code_content (file_id, project_id, path, byte_length) \
                 SELECT id, project_id, path, ?1 FROM files WHERE path = ?2 AND project_id = ?3 \
                 ON CONFLICT(file_id) DO UPDATE SET byte_length = excluded.byte_length",
                rusqlite::params![content_len, file_path, project_id],
            )
            .map_err(|e| DbError::Database(format!("failed to record code_content: {e}")))?;
        }

        {
            let conn = self.shared();
            if let Err(e) = conn.execute(
                "UPDATE files SET needs_chunking = 0 WHERE path = ?1 AND project_id = ?2",
                rusqlite::params![file_path, project_id],
            ) {
                log::warn!("failed to clear needs_chunking for {file_path}: {e}");
            }
        }

        let mut data = Map::new();
        data.insert("success".into(), JsonValue::Bool(true));
        data.insert("file_path".into(), JsonValue::from(file_path));
        data.insert("project_id".into(), JsonValue::from(project_id));
        data.insert("byte_length".into(), JsonValue::from(content_len));
        Ok(JsonValue::Object(data))
    }
}
