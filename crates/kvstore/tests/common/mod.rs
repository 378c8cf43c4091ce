//! Shared harness for integration tests: spins up one real event loop
//! against a loopback `TcpListener` so protocol/dispatch/worker-pool
//! properties can be exercised end-to-end .

use kvstore::config::Config;
use kvstore::event_loop::EventLoop;
use kvstore::server_state::ServerState;
use kvstore::store::Store;
use kvstore::worker_pool::WorkerPool;
use std::net::SocketAddr;
use std::sync::Arc;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    _dir: tempfile::TempDir,
}

/// Bind an ephemeral loopback listener, build a `ServerState` over a fresh
/// temp-dir store, and run one `EventLoop` on its own thread until the
/// test process exits (threads are daemon-style here; nothing joins them).
pub fn start() -> TestServer {
    start_with_config(Config::default())
}

/// Like `start`, but with the given auth tokens configured so auth-gate
/// tests can exercise a real dispatch path instead of calling
/// `ServerState::auth_required` directly.
pub fn start_with_auth(tokens: Vec<String>) -> TestServer {
    let mut cfg = Config::default();
    cfg.auth = tokens;
    start_with_config(cfg)
}

fn start_with_config(cfg: Config) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path(), true, 10_000).unwrap();
    let state = Arc::new(ServerState::new(&cfg, store));

    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let addr = std_listener.local_addr().unwrap();
    let listener = mio::net::TcpListener::from_std(std_listener);

    let mut pool = WorkerPool::new();
    pool.start(2, "test-worker");
    let pool = Arc::new(pool);

    let state_clone = Arc::clone(&state);
    std::thread::spawn(move || {
        let mut event_loop = EventLoop::new(0, state_clone, pool, listener).unwrap();
        let _ = event_loop.run();
    });

    // Give the loop thread a moment to reach its first poll.
    std::thread::sleep(std::time::Duration::from_millis(50));

    TestServer { addr, state, _dir: dir }
}

/// Send a native-framed request and read back one native-framed response.
pub fn native_roundtrip(stream: &mut std::net::TcpStream, fields: &[&[u8]]) -> Vec<String> {
    use std::io::{Read, Write};
    let mut buf = Vec::new();
    for f in fields {
        buf.extend_from_slice(f.len().to_string().as_bytes());
        buf.push(b'\n');
        buf.extend_from_slice(f);
        buf.push(b'\n');
    }
    buf.push(b'\n');
    stream.write_all(&buf).unwrap();

    read_native_response(stream)
}

pub fn read_native_response(stream: &mut std::net::TcpStream) -> Vec<String> {
    use std::io::Read;
    let mut acc = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).expect("read response");
        assert!(n > 0, "connection closed before a full response arrived");
        acc.extend_from_slice(&chunk[..n]);
        if let Some(fields) = try_decode_native(&acc) {
            return fields;
        }
    }
}

fn try_decode_native(buf: &[u8]) -> Option<Vec<String>> {
    let mut pos = 0;
    let mut fields = Vec::new();
    loop {
        if pos >= buf.len() {
            return None;
        }
        if buf[pos] == b'\n' {
            return Some(fields);
        }
        let lf = buf[pos..].iter().position(|&b| b == b'\n')? + pos;
        let len: usize = std::str::from_utf8(&buf[pos..lf]).ok()?.parse().ok()?;
        let start = lf + 1;
        let end = start + len;
        if end + 1 > buf.len() {
            return None;
        }
        fields.push(String::from_utf8_lossy(&buf[start..end]).into_owned());
        pos = end + 1;
    }
}
