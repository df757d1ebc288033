//! `indexer`: the indexing worker process binary (§4.9, §6).
//!
//! `indexer <socket_path> [<poll_interval_secs>] [<batch_size>]`
//!
//! Unlike `runner`, no CLI contract for this binary is fixed by the
//! interface spec — its shape here follows `runner`'s own parsing idiom
//! (hand-rolled positional args, `env_logger` init, a dedicated signal
//! thread flipping a shared stop flag).

use std::env;
use std::process;
use std::time::Duration;

use dbrelay_client::RpcClient;
use dbrelay_indexer::IndexingWorker;
use tokio::sync::watch;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_BATCH_SIZE: i64 = 50;

/// `CODE_ANALYSIS_DB_WORKER` (§6): set so the driver process can tell a
/// worker's in-process composite calls (e.g. `index_file` re-entering the
/// same database) apart from an ordinary client connection.
const WORKER_PROCESS_ENV_VAR: &str = "CODE_ANALYSIS_DB_WORKER";

struct Args {
    socket_path: std::path::PathBuf,
    poll_interval: Duration,
    batch_size: i64,
}

fn parse_args() -> Args {
    let mut args = env::args().skip(1);
    let socket_path = args
        .next()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| fatal("socket_path is required"));
    let poll_interval = args
        .next()
        .map(|s| s.parse().unwrap_or_else(|_| fatal("poll_interval_secs must be an integer")))
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    let batch_size = args
        .next()
        .map(|s| s.parse().unwrap_or_else(|_| fatal("batch_size must be an integer")))
        .unwrap_or(DEFAULT_BATCH_SIZE);

    Args { socket_path, poll_interval: Duration::from_secs(poll_interval), batch_size }
}

fn fatal(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!();
    eprintln!("Usage: indexer <socket_path> [<poll_interval_secs>] [<batch_size>]");
    process::exit(1)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // SAFETY: single-threaded at this point in `main`, before the runtime
    // spawns anything that might read the environment concurrently.
    unsafe {
        env::set_var(WORKER_PROCESS_ENV_VAR, "1");
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    log::info!(
        "starting indexing worker: socket={}, poll_interval={:?}, batch_size={}",
        args.socket_path.display(),
        args.poll_interval,
        args.batch_size,
    );

    let rpc = RpcClient::new(args.socket_path.clone());
    if let Err(e) = rpc.connect() {
        fatal(&format!("failed to connect to {}: {e}", args.socket_path.display()));
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let worker = tokio::task::spawn(async move {
        IndexingWorker::new(rpc, args.batch_size, args.poll_interval, stop_rx).run().await
    });
    tokio::pin!(worker);

    tokio::select! {
        _ = signal_wait() => {
            log::info!("shutdown signal received, waiting for the current cycle to finish");
            let _ = stop_tx.send(true);
        }
        result = &mut worker => {
            log::info!("worker exited on its own: {:?}", result.expect("worker task panicked"));
            return;
        }
    }

    let stats = worker.await.expect("worker task panicked");
    log::info!("final stats: {stats:?}");
}

async fn signal_wait() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}
