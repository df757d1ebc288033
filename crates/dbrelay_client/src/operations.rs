//! Raw table operations (§4.2, §4.7), one RPC call per method — the same
//! shape as the driver-side dispatcher's `insert`/`update`/`delete`/
//! `select`/`execute`/`execute_batch` handlers, just from the caller's side
//! of the wire.

use dbrelay_core::ErrorCode;
use serde_json::{Value as JsonValue, json};

use crate::error::ClientError;
use crate::rpc::RpcClient;

pub struct Operations<'a> {
    rpc: &'a RpcClient,
}

impl<'a> Operations<'a> {
    pub fn new(rpc: &'a RpcClient) -> Self {
        Self { rpc }
    }

    pub fn insert(&self, table_name: &str, data: JsonValue) -> Result<i64, ClientError> {
        let data = self.rpc.call("insert", json!({"table_name": table_name, "data": data}))?;
        Ok(data["data"]["lastrowid"].as_i64().unwrap_or(0))
    }

    pub fn update(
        &self,
        table_name: &str,
        where_: JsonValue,
        data: JsonValue,
    ) -> Result<u64, ClientError> {
        let data = self
            .rpc
            .call("update", json!({"table_name": table_name, "where": where_, "data": data}))?;
        Ok(data["data"]["affected_rows"].as_u64().unwrap_or(0))
    }

    pub fn delete(&self, table_name: &str, where_: JsonValue) -> Result<u64, ClientError> {
        let data = self.rpc.call("delete", json!({"table_name": table_name, "where": where_}))?;
        Ok(data["data"]["affected_rows"].as_u64().unwrap_or(0))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn select(
        &self,
        table_name: &str,
        where_: Option<JsonValue>,
        columns: Option<Vec<String>>,
        limit: Option<u64>,
        offset: Option<u64>,
        order_by: Option<Vec<String>>,
    ) -> Result<Vec<JsonValue>, ClientError> {
        let params = json!({
            "table_name": table_name,
            "where": where_,
            "columns": columns,
            "limit": limit,
            "offset": offset,
            "order_by": order_by,
        });
        let data = self.rpc.call("select", params)?;
        Ok(data["data"].as_array().cloned().unwrap_or_default())
    }

    pub fn execute(
        &self,
        sql: &str,
        params: Option<Vec<JsonValue>>,
        transaction_id: Option<&str>,
    ) -> Result<JsonValue, ClientError> {
        let mut rpc_params = json!({"sql": sql, "params": params});
        if let Some(tx) = transaction_id {
            rpc_params["transaction_id"] = json!(tx);
        }
        let data = self.rpc.call("execute", rpc_params)?;
        Ok(data["data"].clone())
    }

    pub fn execute_batch(
        &self,
        operations: &[(&str, Option<Vec<JsonValue>>)],
        transaction_id: Option<&str>,
    ) -> Result<Vec<JsonValue>, ClientError> {
        let ops: Vec<JsonValue> = operations
            .iter()
            .map(|(sql, params)| json!({"sql": sql, "params": params}))
            .collect();
        let mut rpc_params = json!({"operations": ops});
        if let Some(tx) = transaction_id {
            rpc_params["transaction_id"] = json!(tx);
        }
        let data = self.rpc.call("execute_batch", rpc_params)?;
        Ok(data["data"]["results"].as_array().cloned().unwrap_or_default())
    }

    pub fn begin_transaction(&self) -> Result<String, ClientError> {
        let data = self.rpc.call("begin_transaction", json!({}))?;
        data["data"]["transaction_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Protocol("begin_transaction: missing transaction_id".into()))
    }

    pub fn commit_transaction(&self, transaction_id: &str) -> Result<bool, ClientError> {
        let data = self
            .rpc
            .call("commit_transaction", json!({"transaction_id": transaction_id}))?;
        Ok(data["data"]["committed"].as_bool().unwrap_or(false))
    }

    pub fn rollback_transaction(&self, transaction_id: &str) -> Result<bool, ClientError> {
        let data = self
            .rpc
            .call("rollback_transaction", json!({"transaction_id": transaction_id}))?;
        Ok(data["data"]["rolled_back"].as_bool().unwrap_or(false))
    }
}

/// Helper for callers who want to tell "server rejected this as not found"
/// apart from other RPC failures (e.g. `get_project` probing by id).
pub fn is_not_found(err: &ClientError) -> bool {
    matches!(err, ClientError::Rpc { code: ErrorCode::NotFound, .. })
}
