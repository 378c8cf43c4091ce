//! Generic/admin-ish commands with no data-type affinity:
//! ping/auth/info/version/dbsize/flushdb/compact/clear_binlog plus the
//! `Link`-flagged replication entry points `dump`/`sync140`.

use super::{arg_str, parse_i64, require_arity};
use crate::connection::Connection;
use crate::error::Result;
use crate::framing::{Request, Response};
use crate::server_state::ServerState;

pub fn ping(_state: &ServerState, _req: &Request<'_>) -> Result<Response> {
    Ok(Response::ok())
}

/// Compare the offered token against the configured auth tokens. Called
/// directly by the dispatcher's `auth` special-case rather than through
/// the plain handler signature, since it needs to flip
/// `Connection::authenticated`.
pub fn authenticate(state: &ServerState, conn: &mut Connection, req: &Request<'_>) -> Response {
    if req.len() < 2 {
        return Response::client_error("wrong number of arguments");
    }
    if state.check_auth(req[1].as_bytes()) {
        conn.authenticated = true;
        Response::ok()
    } else {
        Response::error("invalid password")
    }
}

pub fn info(_state: &ServerState, _req: &Request<'_>) -> Result<Response> {
    let mut resp = Response::ok();
    resp.push("kvstore").push(env!("CARGO_PKG_VERSION"));
    Ok(resp)
}

pub fn version(_state: &ServerState, _req: &Request<'_>) -> Result<Response> {
    let mut resp = Response::ok();
    resp.push(env!("CARGO_PKG_VERSION"));
    Ok(resp)
}

pub fn dbsize(state: &ServerState, _req: &Request<'_>) -> Result<Response> {
    // No maintained running count; approximate via rocksdb's own estimate
    // the way the original's `dbsize` falls back to a property query.
    let estimate = state
        .store
        .db()
        .property_int_value("rocksdb.estimate-num-keys")
        .ok()
        .flatten()
        .unwrap_or(0);
    let mut resp = Response::ok();
    resp.push(estimate.to_string());
    Ok(resp)
}

pub fn flushdb(state: &ServerState, _req: &Request<'_>) -> Result<Response> {
    state.store.flush()?;
    Ok(Response::ok())
}

pub fn compact(state: &ServerState, _req: &Request<'_>) -> Result<Response> {
    state.store.compact()?;
    Ok(Response::ok())
}

pub fn clear_binlog(state: &ServerState, _req: &Request<'_>) -> Result<Response> {
    state.store.clear_binlog()?;
    Ok(Response::ok())
}

/// `dump`: request that the event loop hand this connection off to a
/// dedicated streaming thread. The handler itself only
/// validates and signals the takeover — actual socket ownership transfer
/// happens in `event_loop::EventLoop` once it has removed the `Connection`
/// from its own bookkeeping, the same way the original's `proc_link_t`
/// returning `PROC_BACKEND` only *signals* the takeover, with `serve()`
/// performing it.
pub fn dump(_state: &ServerState, _conn: &mut Connection, _req: &Request<'_>) -> Result<Response> {
    Ok(Response::backend("dump", None))
}

pub fn sync140(_state: &ServerState, _conn: &mut Connection, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let seq = parse_i64(arg_str(req, 1))?.max(0) as u64;
    Ok(Response::backend("sync", Some(seq.to_string())))
}
