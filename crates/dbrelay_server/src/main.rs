//! `runner`: the driver process binary (§6).
//!
//! `runner <driver_type> <driver_config_json> <socket_path> [<log_path>] [<queue_max_size>]`

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dbrelay_driver_sqlite::SqliteDriver;
use dbrelay_journal::QueryJournal;
use dbrelay_queue::RequestQueue;
use dbrelay_server::config::DriverConfig;
use dbrelay_server::server;

const DEFAULT_WORKER_POOL_SIZE: usize = 4;
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// `CODE_ANALYSIS_DB_DRIVER` (§6): set for the benefit of any shared code
/// that wants to detect it is running inside the driver process.
const DRIVER_PROCESS_ENV_VAR: &str = "CODE_ANALYSIS_DB_DRIVER";

struct Args {
    driver_type: String,
    driver_config_json: String,
    socket_path: PathBuf,
    log_path_override: Option<PathBuf>,
    queue_max_size_override: Option<usize>,
}

fn parse_args() -> Args {
    let mut args = env::args().skip(1);
    let driver_type = args.next().unwrap_or_else(|| fatal("driver_type is required"));
    let driver_config_json = args
        .next()
        .unwrap_or_else(|| fatal("driver_config_json is required"));
    let socket_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| fatal("socket_path is required"));
    let log_path_override = args.next().map(PathBuf::from);
    let queue_max_size_override = args
        .next()
        .map(|s| s.parse().unwrap_or_else(|_| fatal("queue_max_size must be an integer")));

    Args {
        driver_type,
        driver_config_json,
        socket_path,
        log_path_override,
        queue_max_size_override,
    }
}

fn init_logging(log_path: Option<&std::path::Path>, default_filter: &str) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    if let Some(path) = log_path {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("failed to open log file {}: {e}, logging to stderr", path.display());
            }
        }
    }
    builder.init();
}

fn fatal(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!();
    eprintln!("Usage: runner <driver_type> <driver_config_json> <socket_path> [<log_path>] [<queue_max_size>]");
    process::exit(1)
}

fn main() {
    // SAFETY: single-threaded at this point in `main`, before any other
    // thread that might read the environment is spawned.
    unsafe {
        env::set_var(DRIVER_PROCESS_ENV_VAR, "1");
    }

    let args = parse_args();

    if args.driver_type != "sqlite" {
        fatal(&format!(
            "unknown driver_type '{}': only 'sqlite' is implemented",
            args.driver_type
        ));
    }

    let mut config = DriverConfig::parse(&args.driver_config_json)
        .unwrap_or_else(|e| fatal(&format!("invalid driver_config_json: {e}")));
    if let Some(queue_max_size) = args.queue_max_size_override {
        config.queue_max_size = queue_max_size;
    }
    let log_path = args.log_path_override.or_else(|| config.log_path.clone());

    init_logging(log_path.as_deref(), config.log_level.as_deref().unwrap_or("info"));

    log::info!(
        "starting driver process: driver={}, db={}, socket={}",
        args.driver_type,
        config.path.display(),
        args.socket_path.display(),
    );

    let driver = Arc::new(
        SqliteDriver::connect(config.path.clone())
            .unwrap_or_else(|e| fatal(&format!("failed to open database {}: {e}", config.path.display()))),
    );

    let journal = config.query_log_path.as_ref().map(|path| {
        Arc::new(
            QueryJournal::open_with_defaults(path.clone())
                .unwrap_or_else(|e| fatal(&format!("failed to open query journal {}: {e}", path.display()))),
        )
    });

    let queue = Arc::new(RequestQueue::new(
        config.queue_max_size,
        Some(Duration::from_secs(config.default_timeout_secs)),
    ));

    let listener = dbrelay_wire::bind(&args.socket_path)
        .unwrap_or_else(|e| fatal(&format!("failed to bind socket {}: {e}", args.socket_path.display())));
    log::info!("listening on {}", args.socket_path.display());

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(shutdown.clone());

    let handles = server::spawn(
        listener,
        driver.clone(),
        journal,
        queue,
        DEFAULT_WORKER_POOL_SIZE,
        Duration::from_secs(config.default_timeout_secs),
        shutdown.clone(),
    );

    // Block until the signal thread flips the shutdown flag; the accept and
    // worker threads poll it independently (§4.6 "drain worker pool, join").
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    log::info!("shutdown signal received, draining in-flight work");
    std::thread::sleep(SHUTDOWN_GRACE_PERIOD);
    let _ = handles.accept_thread.join();
    for worker in handles.worker_threads {
        let _ = worker.join();
    }

    if let Err(e) = driver.disconnect() {
        log::warn!("error closing driver: {e}");
    }
    dbrelay_wire::unlink(&args.socket_path);
    log::info!("driver process shut down cleanly");
}

/// SIGTERM/SIGINT trigger graceful shutdown (§6). A dedicated single-threaded
/// `tokio` runtime is used only to wait on the signal futures — `tokio` is
/// already part of the workspace's dependency set for the indexing worker's
/// cooperative loop (§5, §9), so this reuses rather than adds a dependency.
/// Any other unhandled signal falls back to the default (fatal) disposition.
fn spawn_signal_handler(shutdown: Arc<AtomicBool>) {
    std::thread::Builder::new()
        .name("dbrelay-signals".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .build()
                .expect("failed to build signal-handling runtime");
            runtime.block_on(async {
                let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = sigterm.recv() => log::info!("received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => log::info!("received SIGINT"),
                }
            });
            shutdown.store(true, Ordering::SeqCst);
        })
        .expect("failed to spawn signal-handling thread");
}
