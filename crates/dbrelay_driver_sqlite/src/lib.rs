mod driver;
mod index_file;
mod params;
mod schema;
mod transactions;

pub use driver::SqliteDriver;

#[cfg(test)]
mod tests {
    use super::SqliteDriver;
    use serde_json::json;

    fn driver() -> SqliteDriver {
        let dir = tempfile::tempdir().unwrap();
        SqliteDriver::connect(dir.path().join("test.db")).unwrap()
    }

    fn create_t_table(driver: &SqliteDriver) {
        driver
            .create_table(
                json!({
                    "name": "t",
                    "columns": [
                        {"name": "id", "type": "INTEGER", "primary_key": true},
                        {"name": "v", "type": "INTEGER"},
                    ],
                })
                .as_object()
                .unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn insert_then_select_round_trips() {
        let driver = driver();
        create_t_table(&driver);
        driver
            .insert("t", json!({"v": 42}).as_object().unwrap())
            .unwrap();
        let rows = driver.select("t", None, None, None, None, None).unwrap();
        assert_eq!(rows, vec![json!({"id": 1, "v": 42})]);
    }

    #[test]
    fn get_table_info_on_missing_table_is_empty_not_error() {
        let driver = driver();
        let info = driver.get_table_info("does_not_exist").unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn rollback_hides_uncommitted_insert() {
        let driver = driver();
        create_t_table(&driver);

        let tx = driver.begin_transaction().unwrap();
        driver
            .execute("INSERT INTO t(v) VALUES(1)", &json!(null), Some(&tx))
            .unwrap();
        driver.rollback_transaction(&tx).unwrap();

        let rows = driver.select("t", None, None, None, None, None).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn commit_makes_batch_writes_visible() {
        let driver = driver();
        create_t_table(&driver);

        let tx = driver.begin_transaction().unwrap();
        driver
            .execute_batch(
                &[
                    ("INSERT INTO t(v) VALUES(?)".to_string(), json!([1])),
                    ("INSERT INTO t(v) VALUES(?)".to_string(), json!([2])),
                ],
                Some(&tx),
            )
            .unwrap();
        driver.commit_transaction(&tx).unwrap();

        let rows = driver
            .select("t", None, Some(&["v".to_string()]), None, None, Some(&["v".to_string()]))
            .unwrap();
        assert_eq!(rows, vec![json!({"v": 1}), json!({"v": 2})]);
    }

    #[test]
    fn unknown_transaction_id_is_a_transaction_error() {
        let driver = driver();
        let err = driver.commit_transaction("not-a-real-id").unwrap_err();
        assert!(matches!(err, dbrelay_core::DbError::Transaction(_)));
    }

    fn create_project_files_tables(driver: &SqliteDriver) {
        driver
            .create_table(
                json!({
                    "name": "projects",
                    "columns": [
                        {"name": "id", "type": "TEXT", "primary_key": true},
                        {"name": "root_path", "type": "TEXT"},
                    ],
                })
                .as_object()
                .unwrap(),
            )
            .unwrap();
        driver
            .create_table(
                json!({
                    "name": "files",
                    "columns": [
                        {"name": "id", "type": "INTEGER", "primary_key": true},
                        {"name": "project_id", "type": "TEXT"},
                        {"name": "path", "type": "TEXT"},
                        {"name": "needs_chunking", "type": "INTEGER"},
                    ],
                })
                .as_object()
                .unwrap(),
            )
            .unwrap();
        driver
            .create_table(
                json!({
                    "name": "code_content",
                    "columns": [
                        {"name": "file_id", "type": "INTEGER", "primary_key": true},
                        {"name": "project_id", "type": "TEXT"},
                        {"name": "path", "type": "TEXT"},
                        {"name": "byte_length", "type": "INTEGER"},
                    ],
                })
                .as_object()
                .unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn index_file_clears_needs_chunking_and_records_content() {
        let driver = driver();
        create_project_files_tables(&driver);
        driver
            .insert("projects", json!({"id": "p1", "root_path": "/tmp"}).as_object().unwrap())
            .unwrap();
        driver
            .insert(
                "files",
                json!({"project_id": "p1", "path": "/tmp/a.rs", "needs_chunking": 1}).as_object().unwrap(),
            )
            .unwrap();

        let report = driver.index_file("/tmp/a.rs", "p1").unwrap();
        assert_eq!(report["success"], json!(true));

        let rows = driver.select("files", None, None, None, None, None).unwrap();
        assert_eq!(rows[0]["needs_chunking"], json!(0));
    }

    #[test]
    fn index_file_on_unknown_project_is_a_database_error() {
        let driver = driver();
        create_project_files_tables(&driver);
        let err = driver.index_file("/tmp/a.rs", "missing").unwrap_err();
        assert!(matches!(err, dbrelay_core::DbError::Database(_)));
    }

    #[test]
    fn index_file_on_unknown_file_is_a_database_error() {
        let driver = driver();
        create_project_files_tables(&driver);
        driver
            .insert("projects", json!({"id": "p1", "root_path": "/tmp"}).as_object().unwrap())
            .unwrap();
        let err = driver.index_file("/tmp/does_not_exist.rs", "p1").unwrap_err();
        assert!(matches!(err, dbrelay_core::DbError::Database(_)));
    }

    #[test]
    fn sync_schema_reports_created_then_modified() {
        let driver = driver();
        let schema = json!({
            "tables": [
                {"name": "u", "columns": [{"name": "id", "type": "INTEGER", "primary_key": true}]},
            ]
        });
        let schema_obj = schema.as_object().unwrap();

        let first = driver.sync_schema(schema_obj, None).unwrap();
        assert_eq!(first["created_tables"], json!(["u"]));

        let second = driver.sync_schema(schema_obj, None).unwrap();
        assert_eq!(second["modified_tables"], json!(["u"]));
    }
}
