//! Connection-pooled RPC client (§4.7), grounded in the reference
//! `RPCClient`: pre-creates a pool of connections on `connect()`, retries
//! connection-level failures with linear backoff, and always discards the
//! connection it used after a call rather than returning it to the pool —
//! the server closes after one request, so reuse would just fail on the
//! next write.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use dbrelay_core::{RPCRequest, RPCResponse};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::ClientError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_POOL_SIZE: usize = 5;

pub struct RpcClient {
    socket_path: PathBuf,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    pool: Mutex<Vec<UnixStream>>,
}

impl RpcClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_pool_size(self, pool_size: usize) -> PooledRpcClient {
        PooledRpcClient {
            inner: self,
            pool_size,
        }
    }

    /// Pre-creates up to `pool_size` connections (default pool size, see
    /// [`with_pool_size`](Self::with_pool_size) to change it). Fails only if
    /// every attempt fails.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.connect_up_to(DEFAULT_POOL_SIZE)
    }

    fn connect_up_to(&self, pool_size: usize) -> Result<(), ClientError> {
        let mut pool = self.pool.lock().unwrap();
        let mut connected = 0;
        for _ in 0..pool_size {
            match self.create_connection() {
                Ok(stream) => {
                    pool.push(stream);
                    connected += 1;
                }
                Err(e) => log::warn!("failed to pre-create pooled connection: {e}"),
            }
        }
        if connected == 0 {
            return Err(ClientError::Connection(format!(
                "could not establish any connection to {}",
                self.socket_path.display()
            )));
        }
        Ok(())
    }

    pub fn disconnect(&self) {
        self.pool.lock().unwrap().clear();
    }

    pub fn is_connected(&self) -> bool {
        !self.pool.lock().unwrap().is_empty()
    }

    /// `True` iff the client believes it is connected and the socket file
    /// still exists on disk (§4.7) — a cheap liveness signal that doesn't
    /// itself make a round trip.
    pub fn health_check(&self) -> bool {
        self.is_connected() && self.socket_path.exists()
    }

    /// Calls `method` with `params`, retrying connection-level failures for
    /// up to `max_retries` total attempts with linearly increasing backoff.
    /// Errors the server itself returned are never retried.
    pub fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, ClientError> {
        let id = Uuid::new_v4().to_string();
        let request = RPCRequest::new(method, params, id);

        for attempt in 1..=self.max_retries.max(1) {
            match self.send_request(&request) {
                Ok(response) => return Self::unwrap_response(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    log::warn!("rpc call to {method} failed (attempt {attempt}): {e}, retrying");
                    thread::sleep(self.retry_delay * attempt);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("loop always returns on its last iteration")
    }

    fn send_request(&self, request: &RPCRequest) -> Result<RPCResponse, ClientError> {
        let mut stream = self.take_or_create_connection()?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(ClientError::Io)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(ClientError::Io)?;

        dbrelay_wire::send_request(&mut stream, request).map_err(ClientError::Io)?;
        let response = dbrelay_wire::recv_response(&mut stream).map_err(ClientError::Io)?;

        if response.id != request.id {
            return Err(ClientError::Protocol(format!(
                "request id mismatch: sent {}, got {}",
                request.id, response.id
            )));
        }
        // Server architecture: one request per connection, then close (§4.1).
        // The stream is simply dropped here instead of being returned to the
        // pool.
        Ok(response)
    }

    fn take_or_create_connection(&self) -> Result<UnixStream, ClientError> {
        if let Some(stream) = self.pool.lock().unwrap().pop() {
            return Ok(stream);
        }
        self.create_connection()
    }

    fn create_connection(&self) -> Result<UnixStream, ClientError> {
        if !self.socket_path.exists() {
            return Err(ClientError::Connection(format!(
                "socket path does not exist: {}",
                self.socket_path.display()
            )));
        }
        UnixStream::connect(&self.socket_path)
            .map_err(|e| ClientError::Connection(format!("{}: {e}", self.socket_path.display())))
    }

    fn unwrap_response(response: RPCResponse) -> Result<JsonValue, ClientError> {
        if let Some(error) = response.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }
        Ok(response.result.unwrap_or(JsonValue::Null))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

/// Builder helper so callers can pick a non-default pool size before the
/// first `connect()` without a separate setter on `RpcClient` itself.
pub struct PooledRpcClient {
    inner: RpcClient,
    pool_size: usize,
}

impl PooledRpcClient {
    pub fn connect(&self) -> Result<(), ClientError> {
        self.inner.connect_up_to(self.pool_size)
    }

    pub fn client(&self) -> &RpcClient {
        &self.inner
    }
}
