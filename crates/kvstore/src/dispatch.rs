//! Dispatcher: auth check, readonly gate, `G`-lock
//! acquisition, inline-vs-worker decision. Grounded in
//! `examples/original_source/src/net/worker.cpp` (`ProcWorker::proc`'s
//! `g_proc_mutex` acquisition) and `src/net/server.cpp`'s `NetworkServer::proc`.

use crate::command::{Command, CommandFlags, Handler};
use crate::connection::Connection;
use crate::framing::{OwnedRequest, Request, Response};
use crate::server_state::ServerState;
use std::sync::Arc;

/// Outcome of dispatching one request, telling the event loop what to do
/// next.
pub enum Outcome {
    /// A response is ready to be queued on the connection immediately.
    Done(Response),
    /// The command was enqueued to the worker pool; the event loop must
    /// clear IN interest for this connection until the result arrives.
    Enqueue { command: Arc<Command>, owned_req: OwnedRequest },
    /// A `Link`-flagged handler reported the backend-takeover status:
    /// ownership of the connection transfers to a streaming task. Carries
    /// the replication kind (`"dump"` / `"sync"`) and, for `sync`, the
    /// resume sequence, so the event loop can spawn the right task after
    /// removing the connection from its own accounting.
    HandedOff { kind: String, arg: Option<String> },
    /// The connection must be closed (a handler-level I/O failure).
    Error,
}

fn is_ip_filter_command(name: &[u8]) -> bool {
    matches!(
        name,
        b"list_allow_ip" | b"add_allow_ip" | b"del_allow_ip" | b"list_deny_ip" | b"add_deny_ip" | b"del_deny_ip"
    )
}

/// Run steps 1-4 and, for everything except `THREAD` commands, step 6
/// (lock acquisition + execution). `THREAD` commands stop at step 5 and
/// are returned as `Outcome::Enqueue` for the event loop to push onto the
/// worker pool, since that push needs the connection's fd/generation,
/// which this function (deliberately) doesn't touch.
pub fn dispatch(state: &Arc<ServerState>, conn: &mut Connection, req: &Request<'_>) -> Outcome {
    if req.is_empty() {
        return Outcome::Done(Response { fields: Vec::new() });
    }

    let name = req[0].as_bytes();

    // `auth` is special-cased ahead of command lookup: it needs `&mut
    // Connection` to flip `authenticated`, which the `Plain`/`Link`
    // handler signatures don't carry.
    if name == b"auth" {
        return Outcome::Done(crate::commands::generic::authenticate(state, conn, req));
    }

    // The IP allow/deny-list admin commands are loopback-only: they need
    // `&Connection` to check the peer address, which the `Plain`/`Link`
    // handler signatures don't carry, so they're special-cased here too.
    if is_ip_filter_command(name) && !conn.peer_addr.ip().is_loopback() {
        return Outcome::Done(Response::noauth("admin commands may only be issued from localhost."));
    }

    // Step 1: auth gate.
    if state.auth_required() && !conn.authenticated {
        return Outcome::Done(Response::noauth("authentication required."));
    }

    // Step 2: command lookup.
    let Some(command) = state.commands.get(name) else {
        return Outcome::Done(Response::client_error(format!(
            "Unknown Command: {}",
            String::from_utf8_lossy(name)
        )));
    };
    let command = Arc::clone(command);

    // Step 3: link-taking handlers run synchronously on the event loop.
    if command.flags.link {
        let Handler::Link(handler) = &command.handler else {
            unreachable!("a command with the link flag always carries a Link handler");
        };
        return match handler(state, conn, req) {
            Ok(resp) if resp.status() == "backend" => Outcome::HandedOff {
                kind: resp.fields[1].clone(),
                arg: resp.fields.get(2).cloned(),
            },
            Ok(resp) => Outcome::Done(resp),
            Err(_) => Outcome::Error,
        };
    }

    // Step 4: readonly gate.
    if state.readonly && command.flags.write {
        return Outcome::Done(Response::client_error(format!(
            "Forbidden Command: {}",
            String::from_utf8_lossy(name)
        )));
    }

    // Step 5: THREAD commands are handed off for worker-pool execution.
    if command.flags.thread {
        return Outcome::Enqueue {
            command,
            owned_req: crate::framing::to_owned_request(req),
        };
    }

    // Step 6: everything else runs inline (always read-only at this point).
    Outcome::Done(run_locked(state, &command.flags, &command.handler, req))
}

/// Acquire the `G` lock with its inverted polarity (blocking writes take
/// the lock exclusively, ordinary writes take it shared, reads skip it
/// entirely), run the handler, and release. Used both for inline execution
/// and by a
/// worker thread running a `THREAD`-flagged command.
pub fn run_locked(state: &ServerState, flags: &CommandFlags, handler: &Handler, req: &Request<'_>) -> Response {
    let Handler::Plain(f) = handler else {
        panic!("run_locked only executes plain handlers; link handlers run on the event loop");
    };

    let result = if flags.write && flags.block {
        let _guard = state.g_lock.write();
        f(state, req)
    } else if flags.write {
        let _guard = state.g_lock.read();
        f(state, req)
    } else {
        f(state, req)
    };

    match result {
        Ok(resp) => resp,
        Err(e) => Response::error(e.to_string()),
    }
}
