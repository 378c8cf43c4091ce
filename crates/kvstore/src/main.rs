//! Binary entry point: CLI parsing, logging, storage, and the
//! event-loop/worker-pool fleet.

use clap::Parser;
use kvstore::config::{Cli, Config};
use kvstore::event_loop::EventLoop;
use kvstore::server_state::ServerState;
use kvstore::store::Store;
use kvstore::worker_pool::WorkerPool;
use mio::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_shutdown_signal(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, on_shutdown_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_shutdown_signal as libc::sighandler_t);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let base = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    Ok(cli.apply_overrides(base)?)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    install_signal_handlers();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        ip = %config.ip,
        port = config.port,
        readonly = config.readonly,
        data_dir = %config.data_dir.display(),
        auth_entries = config.auth.len(),
        worker_threads = config.worker_threads,
        event_loop_threads = config.event_loop_threads,
        "resolved configuration",
    );

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Store::open(&config.data_dir, true, config.binlog_capacity)?;
    let state = Arc::new(ServerState::new(&config, store));

    let mut worker_pool = WorkerPool::new();
    worker_pool.start(config.worker_threads, "kvstore-worker");
    let workers = Arc::new(worker_pool);

    // One listener per event-loop thread, bound with SO_REUSEPORT so the
    // kernel load-balances accepts across loops.
    let addr: std::net::SocketAddr = format!("{}:{}", config.ip, config.port).parse()?;
    let mut handles = Vec::new();
    for id in 0..config.event_loop_threads.max(1) {
        let listener = bind_reuseport(addr)?;
        let state = Arc::clone(&state);
        let workers = Arc::clone(&workers);
        handles.push(std::thread::spawn(move || -> anyhow::Result<()> {
            let mut event_loop = EventLoop::new(id, state, workers, listener)?;
            event_loop.run()?;
            Ok(())
        }));
    }

    tracing::info!(ip = %config.ip, port = config.port, loops = config.event_loop_threads, "kvstore listening");

    // Main thread doubles as the binlog reclamation task , polled alongside the shutdown signal.
    while !SHUTDOWN_REQUESTED.load(Ordering::SeqCst) && !state.is_quitting() {
        std::thread::sleep(std::time::Duration::from_secs(5));
        if let Err(e) = state.store.clear_binlog() {
            tracing::warn!(error = %e, "binlog reclamation failed");
        }
    }
    state.request_quit();

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn bind_reuseport(addr: std::net::SocketAddr) -> anyhow::Result<TcpListener> {
    use socket2::{Domain, Socket, Type};
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    Ok(TcpListener::from_std(socket.into()))
}
