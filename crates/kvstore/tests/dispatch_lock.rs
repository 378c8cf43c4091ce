//! Cross-module G-lock properties through the real command table and
//! `dispatch::run_locked`, rather than the bare `RwLock` the inline test in
//! `src/dispatch.rs` exercises directly: this catches a regression where a
//! command's `CommandFlags` no longer match the locking discipline its
//! name implies (e.g. `flushdb` losing its `block` flag).

use kvstore::command::Handler;
use kvstore::config::Config;
use kvstore::dispatch::run_locked;
use kvstore::server_state::ServerState;
use kvstore::store::Store;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn open_state() -> (Arc<ServerState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path(), true, 1000).unwrap();
    (Arc::new(ServerState::new(&Config::default(), store)), dir)
}

#[test]
fn flushdb_and_compact_are_flagged_for_exclusive_access_while_set_is_shared() {
    let (state, _dir) = open_state();
    assert!(state.commands.get(b"flushdb").unwrap().flags.block);
    assert!(state.commands.get(b"compact").unwrap().flags.block);
    assert!(state.commands.get(b"clear_binlog").unwrap().flags.block);

    let set_cmd = state.commands.get(b"set").unwrap();
    assert!(set_cmd.flags.write);
    assert!(!set_cmd.flags.block);
}

#[test]
fn a_held_exclusive_lock_delays_a_real_write_command_dispatched_through_run_locked() {
    let (state, _dir) = open_state();

    let holder = Arc::clone(&state);
    let start = Instant::now();
    let handle = std::thread::spawn(move || {
        let _guard = holder.g_lock.write();
        std::thread::sleep(Duration::from_millis(200));
    });
    std::thread::sleep(Duration::from_millis(20));

    let command = state.commands.get(b"set").unwrap();
    let req: kvstore::framing::Request<'_> = vec![
        kvstore::framing::Field::Borrowed(b"set"),
        kvstore::framing::Field::Borrowed(b"k"),
        kvstore::framing::Field::Borrowed(b"v"),
    ];
    let resp = run_locked(&state, &command.flags, &command.handler, &req);
    let elapsed = start.elapsed();
    handle.join().unwrap();

    assert_eq!(resp.status(), "ok");
    assert!(elapsed >= Duration::from_millis(150), "set should have waited for the exclusive holder, took {elapsed:?}");
    assert_eq!(state.store.get(b"k").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn read_flagged_commands_never_touch_the_lock_and_run_concurrently_with_a_held_exclusive_lock() {
    let (state, _dir) = open_state();
    state.store.set(b"k", b"v", b's').unwrap();

    let holder = Arc::clone(&state);
    let handle = std::thread::spawn(move || {
        let _guard = holder.g_lock.write();
        std::thread::sleep(Duration::from_millis(200));
    });
    std::thread::sleep(Duration::from_millis(20));

    let command = state.commands.get(b"get").unwrap();
    assert!(matches!(command.handler, Handler::Plain(_)));
    let req: kvstore::framing::Request<'_> =
        vec![kvstore::framing::Field::Borrowed(b"get"), kvstore::framing::Field::Borrowed(b"k")];

    let start = Instant::now();
    let resp = run_locked(&state, &command.flags, &command.handler, &req);
    let elapsed = start.elapsed();
    handle.join().unwrap();

    assert_eq!(resp.status(), "ok");
    assert!(elapsed < Duration::from_millis(100), "a read command must not block on the G lock, took {elapsed:?}");
}
