//! Indexing worker loop (§4.9): a single-threaded cooperative loop that
//! polls for files with `needs_chunking=1`, dispatches `index_file` RPCs in
//! per-project batches, and tracks per-cycle stats. Grounded in the
//! reference worker's `process_cycle`: same discovery queries, same
//! `indexing_worker_stats` bookkeeping, same 1s-to-60s reconnect backoff.

use std::time::{Duration, Instant};

use dbrelay_client::{ClientError, Operations, RpcClient};
use serde_json::{Value as JsonValue, json};
use tokio::sync::watch;
use uuid::Uuid;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub indexed: u64,
    pub errors: u64,
    pub cycles: u64,
}

pub struct IndexingWorker {
    rpc: RpcClient,
    batch_size: i64,
    poll_interval: Duration,
    stop: watch::Receiver<bool>,
}

impl IndexingWorker {
    pub fn new(rpc: RpcClient, batch_size: i64, poll_interval: Duration, stop: watch::Receiver<bool>) -> Self {
        Self { rpc, batch_size, poll_interval, stop }
    }

    fn stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Runs cycles until the `stop` watch fires, then returns a summary.
    pub async fn run(mut self) -> Stats {
        let mut stats = Stats::default();
        let mut backoff = INITIAL_BACKOFF;
        let mut db_available = false;
        let mut db_status_logged = false;

        log::info!(
            "starting indexing worker: poll_interval={:?}, batch_size={}",
            self.poll_interval,
            self.batch_size
        );

        while !self.stopped() {
            if !db_available {
                match self.probe() {
                    Ok(()) => {
                        log::info!("database is now available");
                        db_available = true;
                        db_status_logged = false;
                        backoff = INITIAL_BACKOFF;
                    }
                    Err(e) => {
                        if !db_status_logged {
                            log::warn!("database unavailable: {e}, retrying in {backoff:?}");
                            db_status_logged = true;
                        }
                        if self.sleep_or_stop(backoff).await {
                            break;
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                }
            }

            stats.cycles += 1;
            match self.run_cycle(stats.cycles) {
                Ok((indexed, errors)) => {
                    stats.indexed += indexed;
                    stats.errors += errors;
                }
                Err(e) => {
                    log::warn!("indexing cycle failed, resetting connection: {e}");
                    db_available = false;
                    backoff = INITIAL_BACKOFF;
                    continue;
                }
            }

            if self.sleep_or_stop(self.poll_interval).await {
                break;
            }
        }

        log::info!(
            "indexing worker stopped: {} indexed, {} errors, {} cycles",
            stats.indexed,
            stats.errors,
            stats.cycles
        );
        stats
    }

    fn probe(&self) -> Result<(), ClientError> {
        if !self.rpc.is_connected() {
            self.rpc.connect()?;
        }
        Operations::new(&self.rpc).execute("SELECT 1", None, None)?;
        Ok(())
    }

    /// One discovery-plus-dispatch cycle (§4.9 steps 2-6). Returns
    /// `(files_indexed, files_failed)` for this cycle.
    fn run_cycle(&self, cycle_number: u64) -> Result<(u64, u64), ClientError> {
        let ops = Operations::new(&self.rpc);
        let cycle_id = Uuid::new_v4().to_string();
        let cycle_start = now_unix_seconds();

        ops.execute(
            "UPDATE indexing_worker_stats SET cycle_end_time = ?, last_updated = ? \
             WHERE cycle_end_time IS NULL",
            Some(vec![json!(cycle_start), json!(cycle_start)]),
            None,
        )?;

        let count_result = ops.execute(
            "SELECT COUNT(*) as count FROM files WHERE (deleted = 0 OR deleted IS NULL) AND needs_chunking = 1",
            None,
            None,
        )?;
        let files_total_at_start = count_result
            .get("data")
            .and_then(JsonValue::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("count"))
            .and_then(JsonValue::as_i64)
            .unwrap_or(0);

        ops.execute(
            "INSERT INTO indexing_worker_stats \
             (cycle_id, cycle_start_time, files_total_at_start, files_indexed, files_failed, \
              total_processing_time_seconds, average_processing_time_seconds, last_updated) \
             VALUES (?, ?, ?, 0, 0, 0.0, NULL, ?)",
            Some(vec![json!(cycle_id), json!(cycle_start), json!(files_total_at_start), json!(cycle_start)]),
            None,
        )?;

        log::info!("[cycle #{cycle_number}] starting, {files_total_at_start} files pending");

        let projects = ops.select(
            "files",
            Some(json!({"needs_chunking": 1, "deleted": 0})),
            Some(vec!["project_id".to_string()]),
            None,
            None,
            None,
        )?;
        let mut project_ids: Vec<String> = projects
            .iter()
            .filter_map(|row| row.get("project_id").and_then(JsonValue::as_str).map(str::to_string))
            .collect();
        project_ids.sort();
        project_ids.dedup();

        let (mut indexed, mut errors) = (0u64, 0u64);
        if project_ids.is_empty() {
            log::info!("[cycle #{cycle_number}] no projects with files needing indexing");
        } else {
            for project_id in &project_ids {
                let (project_indexed, project_errors) =
                    self.index_project_batch(&ops, project_id, &cycle_id)?;
                indexed += project_indexed;
                errors += project_errors;
            }
        }

        ops.execute(
            "UPDATE indexing_worker_stats SET cycle_end_time = ?, last_updated = ? WHERE cycle_id = ?",
            Some(vec![json!(now_unix_seconds()), json!(now_unix_seconds()), json!(cycle_id)]),
            None,
        )?;

        Ok((indexed, errors))
    }

    fn index_project_batch(
        &self,
        ops: &Operations<'_>,
        project_id: &str,
        cycle_id: &str,
    ) -> Result<(u64, u64), ClientError> {
        let files = ops.select(
            "files",
            Some(json!({"project_id": project_id, "needs_chunking": 1, "deleted": 0})),
            Some(vec!["id".to_string(), "path".to_string(), "project_id".to_string()]),
            Some(self.batch_size as u64),
            None,
            Some(vec!["updated_at".to_string()]),
        )?;

        let (mut indexed, mut errors) = (0u64, 0u64);
        for row in &files {
            let Some(path) = row.get("path").and_then(JsonValue::as_str) else { continue };
            let started = Instant::now();
            let outcome = self.rpc.call("index_file", json!({"file_path": path, "project_id": project_id}));
            let elapsed = started.elapsed().as_secs_f64();
            let success = outcome.is_ok();
            if success {
                indexed += 1;
                log::debug!("indexed {path}");
            } else {
                errors += 1;
                log::warn!("index failed for {path}: {}", outcome.unwrap_err());
            }
            ops.execute(
                "UPDATE indexing_worker_stats SET \
                 files_indexed = files_indexed + ?, files_failed = files_failed + ?, \
                 total_processing_time_seconds = total_processing_time_seconds + ?, last_updated = ? \
                 WHERE cycle_id = ?",
                Some(vec![
                    json!(success as i64),
                    json!(!success as i64),
                    json!(elapsed),
                    json!(now_unix_seconds()),
                    json!(cycle_id),
                ]),
                None,
            )?;
            ops.execute(
                "UPDATE indexing_worker_stats SET average_processing_time_seconds = CASE \
                 WHEN (files_indexed + files_failed) > 0 \
                 THEN total_processing_time_seconds / (files_indexed + files_failed) \
                 ELSE NULL END WHERE cycle_id = ?",
                Some(vec![json!(cycle_id)]),
                None,
            )?;
        }
        Ok((indexed, errors))
    }

    /// Sleeps up to `duration`, waking early if `stop` fires. Returns
    /// `true` if the loop should exit.
    async fn sleep_or_stop(&mut self, duration: Duration) -> bool {
        if self.stopped() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.stop.changed() => true,
        }
    }
}

fn now_unix_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    use dbrelay_driver_sqlite::SqliteDriver;

    use super::*;

    #[test]
    fn stats_default_is_zeroed() {
        let stats = Stats::default();
        assert_eq!(stats, Stats { indexed: 0, errors: 0, cycles: 0 });
    }

    /// Spins up a real accept loop + worker pool on a temp socket, the same
    /// way the `dbrelay_client` crate's own tests do.
    fn start_server(socket_path: &std::path::Path, db_path: &std::path::Path) -> Arc<AtomicBool> {
        let driver = Arc::new(SqliteDriver::connect(db_path.to_path_buf()).unwrap());
        let queue = Arc::new(dbrelay_queue::RequestQueue::new(100, Some(Duration::from_secs(5))));
        let listener = dbrelay_wire::bind(socket_path).unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        dbrelay_server::server::spawn(
            listener,
            driver,
            None,
            queue,
            2,
            Duration::from_secs(5),
            shutdown.clone(),
        );
        shutdown
    }

    #[test]
    fn one_cycle_indexes_pending_files_and_records_stats() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("dbrelay.sock");
        let db_path = dir.path().join("test.db");
        let shutdown = start_server(&socket_path, &db_path);
        thread::sleep(Duration::from_millis(50));

        let file_path = dir.path().join("hello.rs");
        std::fs::write(&file_path, b"fn main() {}").unwrap();

        let rpc = RpcClient::new(socket_path.clone());
        rpc.connect().unwrap();
        let ops = Operations::new(&rpc);
        ops.execute(
            "CREATE TABLE projects (id TEXT PRIMARY KEY, root_path TEXT, name TEXT, \
             created_at INTEGER, updated_at INTEGER)",
            None,
            None,
        )
        .unwrap();
        ops.execute(
            "CREATE TABLE files (id INTEGER PRIMARY KEY, project_id TEXT, path TEXT, \
             needs_chunking INTEGER, deleted INTEGER, updated_at INTEGER)",
            None,
            None,
        )
        .unwrap();
        ops.execute(
            "CREATE TABLE code_content (file_id INTEGER PRIMARY KEY, project_id TEXT, \
             path TEXT, byte_length INTEGER, UNIQUE(file_id))",
            None,
            None,
        )
        .unwrap();
        ops.execute(
            "CREATE TABLE indexing_worker_stats (cycle_id TEXT PRIMARY KEY, cycle_start_time REAL, \
             cycle_end_time REAL, files_total_at_start INTEGER, files_indexed INTEGER, \
             files_failed INTEGER, total_processing_time_seconds REAL, \
             average_processing_time_seconds REAL, last_updated REAL)",
            None,
            None,
        )
        .unwrap();

        ops.insert(
            "projects",
            json!({"id": "p1", "root_path": dir.path().to_str().unwrap()}),
        )
        .unwrap();
        ops.insert(
            "files",
            json!({"project_id": "p1", "path": file_path.to_str().unwrap(), "needs_chunking": 1, "deleted": 0}),
        )
        .unwrap();

        let (_stop_tx, stop_rx) = watch::channel(false);
        let worker = IndexingWorker::new(rpc, 10, Duration::from_secs(30), stop_rx);
        let (indexed, errors) = worker.run_cycle(1).unwrap();
        assert_eq!(indexed, 1);
        assert_eq!(errors, 0);

        let remaining = ops.select(
            "files",
            Some(json!({"needs_chunking": 1})),
            None,
            None,
            None,
            None,
        )
        .unwrap();
        assert!(remaining.is_empty(), "file should have needs_chunking cleared");

        let stats_rows = ops.select("indexing_worker_stats", None, None, None, None, None).unwrap();
        assert_eq!(stats_rows.len(), 1);
        assert_eq!(stats_rows[0]["files_indexed"], json!(1));

        shutdown.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}
