//! Routes one `RPCRequest` to a driver call and converts the outcome into an
//! `OpResult` (§4.2, §4.6). Successful/failed `execute`/`execute_batch`
//! statements are journaled before the `?` propagates the error onward.

use dbrelay_core::{
    CreateTableRequest, DbError, DeleteRequest, ErrorCode, ExecuteBatchRequest, ExecuteRequest,
    IndexFileRequest, InsertRequest, OpResult, SelectRequest, SyncSchemaRequest, TableNameRequest,
    TransactionIdRequest, UpdateRequest,
};
use dbrelay_core::RPCRequest;
use dbrelay_driver_sqlite::SqliteDriver;
use dbrelay_journal::QueryJournal;
use serde_json::{Value as JsonValue, json};

pub fn dispatch(driver: &SqliteDriver, journal: Option<&QueryJournal>, request: &RPCRequest) -> OpResult {
    let outcome: Result<OpResult, DbError> = (|| {
        match request.method.as_str() {
            "create_table" => {
                let req = CreateTableRequest::parse(&request.params)?;
                let created = driver.create_table(&req.schema)?;
                Ok(OpResult::success(json!({ "created": created })))
            }
            "drop_table" => {
                let req = TableNameRequest::parse(&request.params)?;
                let dropped = driver.drop_table(&req.table_name)?;
                Ok(OpResult::success(json!({ "dropped": dropped })))
            }
            "insert" => {
                let req = InsertRequest::parse(&request.params)?;
                let lastrowid = driver.insert(&req.table_name, &req.data)?;
                Ok(OpResult::success(json!({ "lastrowid": lastrowid })))
            }
            "update" => {
                let req = UpdateRequest::parse(&request.params)?;
                let affected = driver.update(&req.table_name, &req.where_, &req.data)?;
                Ok(OpResult::success(json!({ "affected_rows": affected })))
            }
            "delete" => {
                let req = DeleteRequest::parse(&request.params)?;
                let affected = driver.delete(&req.table_name, &req.where_)?;
                Ok(OpResult::success(json!({ "affected_rows": affected })))
            }
            "select" => {
                let req = SelectRequest::parse(&request.params)?;
                let rows = driver.select(
                    &req.table_name,
                    req.where_.as_ref(),
                    req.columns.as_deref(),
                    req.limit,
                    req.offset,
                    req.order_by.as_deref(),
                )?;
                Ok(OpResult::data(rows))
            }
            "execute" => execute_and_journal(driver, journal, &request.params),
            "execute_batch" => execute_batch_and_journal(driver, journal, &request.params),
            "begin_transaction" => {
                let id = driver.begin_transaction()?;
                Ok(OpResult::success(json!({ "transaction_id": id })))
            }
            "commit_transaction" => {
                let req = TransactionIdRequest::parse(&request.params)?;
                let committed = driver.commit_transaction(&req.transaction_id)?;
                Ok(OpResult::success(json!({ "committed": committed })))
            }
            "rollback_transaction" => {
                let req = TransactionIdRequest::parse(&request.params)?;
                let rolled_back = driver.rollback_transaction(&req.transaction_id)?;
                Ok(OpResult::success(json!({ "rolled_back": rolled_back })))
            }
            "get_table_info" => {
                let req = TableNameRequest::parse(&request.params)?;
                let columns = driver.get_table_info(&req.table_name)?;
                Ok(OpResult::data(columns))
            }
            "sync_schema" => {
                let req = SyncSchemaRequest::parse(&request.params)?;
                let report = driver.sync_schema(&req.schema_definition, req.backup_dir.as_deref())?;
                Ok(OpResult::success(report))
            }
            "index_file" => {
                let req = IndexFileRequest::parse(&request.params)?;
                let report = driver.index_file(&req.file_path, &req.project_id)?;
                Ok(OpResult::success(report))
            }
            // The AST/CST engine is an external collaborator out of scope for
            // this core (§1, §4.2): routed here so unknown-method handling
            // stays uniform, but not implemented beyond this stub.
            "query_ast" | "query_cst" | "modify_ast" | "modify_cst" => Ok(OpResult::error(
                ErrorCode::NotFound,
                format!("{} is not implemented by this driver core", request.method),
            )),
            other => Ok(OpResult::error(
                ErrorCode::InvalidRequest,
                format!("unknown method: {other}"),
            )),
        }
    })();

    outcome.unwrap_or_else(OpResult::from)
}

fn execute_and_journal(
    driver: &SqliteDriver,
    journal: Option<&QueryJournal>,
    params: &JsonValue,
) -> Result<OpResult, DbError> {
    let req = ExecuteRequest::parse(params)?;
    let outcome = driver.execute(&req.sql, &req.params, req.transaction_id.as_deref());
    journal_outcome(journal, &req.sql, &req.params, req.transaction_id.as_deref(), &outcome);
    Ok(OpResult::success(outcome?))
}

fn execute_batch_and_journal(
    driver: &SqliteDriver,
    journal: Option<&QueryJournal>,
    params: &JsonValue,
) -> Result<OpResult, DbError> {
    let req = ExecuteBatchRequest::parse(params)?;
    let mut results = Vec::with_capacity(req.operations.len());
    for (sql, op_params) in &req.operations {
        let outcome = driver.execute(sql, op_params, req.transaction_id.as_deref());
        journal_outcome(journal, sql, op_params, req.transaction_id.as_deref(), &outcome);
        results.push(outcome?);
    }
    Ok(OpResult::success(json!({ "results": results })))
}

fn journal_outcome(
    journal: Option<&QueryJournal>,
    sql: &str,
    params: &JsonValue,
    transaction_id: Option<&str>,
    outcome: &Result<JsonValue, DbError>,
) {
    let Some(journal) = journal else { return };
    match outcome {
        Ok(_) => journal.write(sql, params.clone(), transaction_id, true, None),
        Err(e) => journal.write(sql, params.clone(), transaction_id, false, Some(&e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn driver() -> SqliteDriver {
        let dir = tempfile::tempdir().unwrap();
        SqliteDriver::connect(dir.path().join("test.db")).unwrap()
    }

    fn req(method: &str, params: JsonValue) -> RPCRequest {
        RPCRequest::new(method, params, "req-1")
    }

    #[test]
    fn unknown_method_is_invalid_request() {
        let driver = driver();
        let result = dispatch(&driver, None, &req("no_such_method", json!({})));
        match result {
            OpResult::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidRequest),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn tree_methods_are_stubbed_not_found() {
        let driver = driver();
        let result = dispatch(&driver, None, &req("query_ast", json!({})));
        match result {
            OpResult::Error { code, .. } => assert_eq!(code, ErrorCode::NotFound),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn create_table_then_insert_then_select_round_trips() {
        let driver = driver();
        let create = dispatch(
            &driver,
            None,
            &req(
                "create_table",
                json!({"schema": {"name": "t", "columns": [{"name": "id", "type": "INTEGER", "primary_key": true}, {"name": "v", "type": "INTEGER"}]}}),
            ),
        );
        assert!(!create.is_error());

        let insert = dispatch(&driver, None, &req("insert", json!({"table_name": "t", "data": {"v": 7}})));
        assert!(!insert.is_error());

        let select = dispatch(&driver, None, &req("select", json!({"table_name": "t"})));
        match select {
            OpResult::Data { rows } => assert_eq!(rows, vec![json!({"id": 1, "v": 7})]),
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn execute_writes_a_journal_entry_per_call() {
        let driver = driver();
        let dir = tempfile::tempdir().unwrap();
        let journal = QueryJournal::open_with_defaults(dir.path().join("j.jsonl")).unwrap();

        dispatch(&driver, None, &req("create_table", json!({"schema": {"name": "t", "columns": [{"name": "v", "type": "INTEGER"}]}})));
        let result = dispatch(
            &driver,
            Some(&journal),
            &req("execute", json!({"sql": "INSERT INTO t(v) VALUES(1)"})),
        );
        assert!(!result.is_error());

        let contents = std::fs::read_to_string(journal.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"success\":true"));
    }

    #[test]
    fn unknown_transaction_id_surfaces_as_transaction_error() {
        let driver = driver();
        let result = dispatch(
            &driver,
            None,
            &req("commit_transaction", json!({"transaction_id": "not-a-uuid"})),
        );
        match result {
            OpResult::Error { code, .. } => assert_eq!(code, ErrorCode::TransactionError),
            other => panic!("expected error, got {other:?}"),
        }
    }
}
