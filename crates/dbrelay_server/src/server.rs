//! Accept loop, per-client handling, and worker pool (§4.6).
//!
//! The pending-response rendezvous is a one-shot `std::sync::mpsc` channel
//! (§9 design note) rather than a hand-rolled condvar table: the handler
//! thread waits on the receiver, the worker thread that processes the
//! request fulfills the sender.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dbrelay_core::{ErrorCode, RPCError, RPCRequest, RPCResponse, RequestPriority};
use dbrelay_driver_sqlite::SqliteDriver;
use dbrelay_journal::QueryJournal;
use dbrelay_queue::{EnqueueError, RequestQueue};
use uuid::Uuid;

use crate::dispatch::dispatch;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const EMPTY_QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct QueuedPayload {
    request: RPCRequest,
    responder: SyncSender<RPCResponse>,
}

pub struct ServerHandles {
    pub accept_thread: thread::JoinHandle<()>,
    pub worker_threads: Vec<thread::JoinHandle<()>>,
}

/// Spawns the worker pool and the accept loop, both cooperating on
/// `shutdown`. Returns immediately; join the returned handles to wait for a
/// clean stop.
pub fn spawn(
    listener: UnixListener,
    driver: Arc<SqliteDriver>,
    journal: Option<Arc<QueryJournal>>,
    queue: Arc<RequestQueue<QueuedPayload>>,
    worker_pool_size: usize,
    request_timeout: Duration,
    shutdown: Arc<AtomicBool>,
) -> ServerHandles {
    let worker_threads = (0..worker_pool_size)
        .map(|i| {
            let queue = queue.clone();
            let driver = driver.clone();
            let journal = journal.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(format!("dbrelay-worker-{i}"))
                .spawn(move || worker_loop(queue, driver, journal, shutdown))
                .expect("failed to spawn worker thread")
        })
        .collect();

    listener
        .set_nonblocking(true)
        .expect("failed to set listener nonblocking");

    let accept_thread = {
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("dbrelay-accept".to_string())
            .spawn(move || accept_loop(listener, queue, request_timeout, shutdown))
            .expect("failed to spawn accept thread")
    };

    ServerHandles {
        accept_thread,
        worker_threads,
    }
}

fn accept_loop(
    listener: UnixListener,
    queue: Arc<RequestQueue<QueuedPayload>>,
    request_timeout: Duration,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let queue = queue.clone();
                thread::spawn(move || handle_connection(stream, queue, request_timeout));
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                log::error!("accept failed: {e}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    log::info!("accept loop stopped");
}

/// Handles exactly one request on `stream`, then closes it (§4.1, §4.6).
fn handle_connection(mut stream: UnixStream, queue: Arc<RequestQueue<QueuedPayload>>, request_timeout: Duration) {
    let bytes = match dbrelay_wire::read_frame(&mut stream) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("failed to read request frame: {e}");
            return;
        }
    };

    let mut request: RPCRequest = match serde_json::from_slice(&bytes) {
        Ok(r) => r,
        Err(e) => {
            let response = RPCResponse::failure(
                "unknown",
                RPCError::new(ErrorCode::InvalidRequest, format!("malformed request: {e}")),
            );
            let _ = dbrelay_wire::send_response(&mut stream, &response);
            return;
        }
    };
    if request.id.is_empty() {
        request.id = Uuid::new_v4().to_string();
    }
    let request_id = request.id.clone();

    let (responder, receiver) = mpsc::sync_channel::<RPCResponse>(1);
    let payload = QueuedPayload {
        request,
        responder,
    };

    if let Err(e) = queue.enqueue(request_id.clone(), payload, RequestPriority::Normal, Some(request_timeout)) {
        let error = match e {
            EnqueueError::Duplicate(id) => {
                RPCError::new(ErrorCode::InvalidRequest, format!("duplicate request id: {id}"))
            }
            EnqueueError::Full(max) => {
                RPCError::new(ErrorCode::QueueFull, format!("request queue is full (max {max})"))
            }
        };
        let response = RPCResponse::failure(request_id, error);
        let _ = dbrelay_wire::send_response(&mut stream, &response);
        return;
    }

    let response = match receiver.recv_timeout(request_timeout) {
        Ok(response) => response,
        Err(RecvTimeoutError::Timeout) => {
            queue.remove(&request_id);
            RPCResponse::failure(request_id, RPCError::new(ErrorCode::Timeout, "request timed out"))
        }
        Err(RecvTimeoutError::Disconnected) => RPCResponse::failure(
            request_id,
            RPCError::new(ErrorCode::InternalError, "worker dropped the response channel"),
        ),
    };

    if let Err(e) = dbrelay_wire::send_response(&mut stream, &response) {
        log::warn!("failed to send response: {e}");
    }
}

fn worker_loop(
    queue: Arc<RequestQueue<QueuedPayload>>,
    driver: Arc<SqliteDriver>,
    journal: Option<Arc<QueryJournal>>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let Some(item) = queue.dequeue() else {
            thread::sleep(EMPTY_QUEUE_POLL_INTERVAL);
            continue;
        };
        let result = dispatch(&driver, journal.as_deref(), &item.payload.request);
        let response = result.into_response(item.payload.request.id.clone());
        // The handler thread may already have timed out and dropped its
        // receiver; a failed send here just means nobody is listening.
        let _ = item.payload.responder.send(response);
    }
    log::info!("worker loop stopped");
}
