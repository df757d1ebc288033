use dbrelay_core::DbError;
use rusqlite::Connection;
use uuid::Uuid;

use crate::driver::SqliteDriver;

impl SqliteDriver {
    /// Opens a dedicated connection and starts a transaction on it,
    /// registering the handle under a fresh UUID (§4.4 `begin_transaction`).
    pub fn begin_transaction(&self) -> Result<String, DbError> {
        let conn = Connection::open(self.db_path())?;
        conn.execute_batch("PRAGMA foreign_keys = ON; BEGIN TRANSACTION;")?;

        let id = Uuid::new_v4();
        self.transactions()
            .lock()
            .expect("transactions mutex poisoned")
            .insert(id, conn);
        Ok(id.to_string())
    }

    pub fn commit_transaction(&self, transaction_id: &str) -> Result<bool, DbError> {
        self.finish_transaction(transaction_id, true)
    }

    pub fn rollback_transaction(&self, transaction_id: &str) -> Result<bool, DbError> {
        self.finish_transaction(transaction_id, false)
    }

    fn finish_transaction(&self, transaction_id: &str, commit: bool) -> Result<bool, DbError> {
        let id = Uuid::parse_str(transaction_id)
            .map_err(|_| DbError::Transaction(format!("transaction {transaction_id} not found")))?;
        let conn = self
            .transactions()
            .lock()
            .expect("transactions mutex poisoned")
            .remove(&id)
            .ok_or_else(|| DbError::Transaction(format!("transaction {transaction_id} not found")))?;

        let statement = if commit { "COMMIT;" } else { "ROLLBACK;" };
        conn.execute_batch(statement)
            .map_err(|e| DbError::Transaction(format!("failed to finish transaction: {e}")))?;
        Ok(true)
    }
}
