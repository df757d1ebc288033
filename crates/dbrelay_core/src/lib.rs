#![allow(clippy::result_large_err)]

mod error;
mod protocol;
mod request;
mod result;
mod value;

pub use error::{DbError, ErrorCode};
pub use protocol::{RPCError, RPCRequest, RPCResponse};
pub use request::{
    CreateTableRequest, DeleteRequest, ExecuteBatchRequest, ExecuteRequest, IndexFileRequest,
    InsertRequest, SelectRequest, SyncSchemaRequest, TableNameRequest, TransactionIdRequest,
    UpdateRequest,
};
pub use result::OpResult;
pub use value::{SqlValue, ValueConvertError, rusqlite_value_to_json};

/// Priority bands for the request queue (§4.3), ordered LOW..URGENT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum RequestPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}
