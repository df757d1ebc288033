//! High-level project/file/tree API (§4.8): every method is one or two RPC
//! calls — a raw `insert`/`update`/`delete` (or a one-off `execute` when the
//! server, not the caller, must stamp `updated_at`), optionally followed by
//! a `select` to return the row with its server-assigned fields populated.
//! Built on [`Operations`], the same raw-CRUD layer the reference client's
//! `execute`/`insert`/`update`/`select` wrappers expose.

use serde_json::{Map, Value as JsonValue, json};

use crate::error::ClientError;
use crate::model::{FileRecord, Project};
use crate::operations::Operations;
use crate::rpc::RpcClient;

pub struct ClientApi<'a> {
    ops: Operations<'a>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub root_path: Option<String>,
    pub name: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub needs_chunking: Option<bool>,
    pub deleted: Option<bool>,
}

impl<'a> ClientApi<'a> {
    pub fn new(rpc: &'a RpcClient) -> Self {
        Self { ops: Operations::new(rpc) }
    }

    // === Projects ===

    pub fn create_project(
        &self,
        id: &str,
        root_path: &str,
        name: Option<&str>,
    ) -> Result<Project, ClientError> {
        self.ops.execute(
            "INSERT INTO projects (id, root_path, name, created_at, updated_at) \
             VALUES (?, ?, ?, strftime('%s','now'), strftime('%s','now'))",
            Some(vec![json!(id), json!(root_path), json!(name)]),
            None,
        )?;
        self.get_project(id)?
            .ok_or_else(|| ClientError::Protocol(format!("project {id} missing after insert")))
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>, ClientError> {
        let rows = self.ops.select("projects", Some(json!({"id": id})), None, Some(1), None, None)?;
        rows.first().map(Project::from_row).transpose()
    }

    pub fn update_project(&self, id: &str, update: ProjectUpdate) -> Result<Project, ClientError> {
        let mut set_clauses = vec!["updated_at = strftime('%s','now')".to_string()];
        let mut params = Vec::new();
        if let Some(root_path) = update.root_path {
            set_clauses.push("root_path = ?".to_string());
            params.push(json!(root_path));
        }
        if let Some(name) = update.name {
            set_clauses.push("name = ?".to_string());
            params.push(json!(name));
        }
        if params.is_empty() {
            return self
                .get_project(id)?
                .ok_or_else(|| ClientError::Protocol(format!("project {id} not found")));
        }
        params.push(json!(id));
        let sql = format!("UPDATE projects SET {} WHERE id = ?", set_clauses.join(", "));
        self.ops.execute(&sql, Some(params), None)?;
        self.get_project(id)?
            .ok_or_else(|| ClientError::Protocol(format!("project {id} not found")))
    }

    pub fn delete_project(&self, id: &str) -> Result<bool, ClientError> {
        Ok(self.ops.delete("projects", json!({"id": id}))? > 0)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        let rows = self.ops.select(
            "projects",
            None,
            None,
            None,
            None,
            Some(vec!["created_at".to_string()]),
        )?;
        rows.iter().map(Project::from_row).collect()
    }

    // === Files ===

    pub fn create_file(&self, project_id: &str, path: &str) -> Result<FileRecord, ClientError> {
        let lastrowid = self.ops.insert(
            "files",
            json!({
                "project_id": project_id,
                "path": path,
                "needs_chunking": 1,
                "deleted": 0,
            }),
        )?;
        self.get_file(lastrowid)?
            .ok_or_else(|| ClientError::Protocol(format!("file {lastrowid} missing after insert")))
    }

    pub fn get_file(&self, id: i64) -> Result<Option<FileRecord>, ClientError> {
        let rows = self.ops.select("files", Some(json!({"id": id})), None, Some(1), None, None)?;
        rows.first().map(FileRecord::from_row).transpose()
    }

    pub fn update_file(&self, id: i64, update: FileUpdate) -> Result<FileRecord, ClientError> {
        let mut data = Map::new();
        if let Some(needs_chunking) = update.needs_chunking {
            data.insert("needs_chunking".to_string(), json!(needs_chunking as i64));
        }
        if let Some(deleted) = update.deleted {
            data.insert("deleted".to_string(), json!(deleted as i64));
        }
        if !data.is_empty() {
            self.ops.update("files", json!({"id": id}), JsonValue::Object(data))?;
        }
        self.get_file(id)?
            .ok_or_else(|| ClientError::Protocol(format!("file {id} not found")))
    }

    /// Soft-delete: marks the row `deleted`, matching `get_project_files`'s
    /// `include_deleted` filter rather than removing history.
    pub fn delete_file(&self, id: i64) -> Result<bool, ClientError> {
        let affected = self
            .ops
            .update("files", json!({"id": id}), json!({"deleted": 1}))?;
        Ok(affected > 0)
    }

    pub fn get_project_files(
        &self,
        project_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<FileRecord>, ClientError> {
        let where_ = if include_deleted {
            json!({"project_id": project_id})
        } else {
            json!({"project_id": project_id, "deleted": 0})
        };
        let rows = self.ops.select("files", Some(where_), None, None, None, Some(vec!["path".to_string()]))?;
        rows.iter().map(FileRecord::from_row).collect()
    }

    // === AST / CST / vector trees ===

    pub fn save_ast(&self, file_id: i64, tree_json: &str) -> Result<(), ClientError> {
        self.save_tree("ast_trees", file_id, tree_json)
    }

    pub fn get_ast(&self, file_id: i64) -> Result<Option<String>, ClientError> {
        self.get_tree("ast_trees", file_id)
    }

    pub fn save_cst(&self, file_id: i64, tree_json: &str) -> Result<(), ClientError> {
        self.save_tree("cst_trees", file_id, tree_json)
    }

    pub fn get_cst(&self, file_id: i64) -> Result<Option<String>, ClientError> {
        self.get_tree("cst_trees", file_id)
    }

    pub fn save_vectors(&self, file_id: i64, vectors_json: &str) -> Result<(), ClientError> {
        self.save_tree("vector_index", file_id, vectors_json)
    }

    pub fn get_vectors(&self, file_id: i64) -> Result<Option<String>, ClientError> {
        self.get_tree("vector_index", file_id)
    }

    fn save_tree(&self, table: &str, file_id: i64, payload: &str) -> Result<(), ClientError> {
        let sql = format!(
            "INSERT OR REPLACE INTO {table} (file_id, tree_json, updated_at) \
             VALUES (?, ?, strftime('%s','now'))"
        );
        self.ops.execute(&sql, Some(vec![json!(file_id), json!(payload)]), None)?;
        Ok(())
    }

    fn get_tree(&self, table: &str, file_id: i64) -> Result<Option<String>, ClientError> {
        let rows = self.ops.select(table, Some(json!({"file_id": file_id})), None, Some(1), None, None)?;
        Ok(rows.first().and_then(|row| row.get("tree_json")).and_then(JsonValue::as_str).map(str::to_string))
    }
}
