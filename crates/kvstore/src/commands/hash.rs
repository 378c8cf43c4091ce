//! Packed-hash commands: a hash's values are small
//! signed integers keyed by a codec-encodable field (e.g. a chess move),
//! merged into the stored blob via RocksDB's merge operator rather than
//! read-modify-write. Grounded in `examples/original_source/src/proc_hash.cpp`
//! (`proc_hset`/`proc_hget`/`proc_hdel`/`proc_hincr`/`proc_hgetall`/the
//! `multi_h*` family).

use super::{arg_str, parse_i64, require_arity};
use crate::error::Result;
use crate::framing::{Request, Response};
use crate::server_state::ServerState;

fn blob(state: &ServerState, name: &[u8]) -> Result<Vec<u8>> {
    Ok(state.store.get(name)?.unwrap_or_default())
}

pub fn hset(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 4)?;
    let value = parse_i64(arg_str(req, 3))? as i16;
    let operand = crate::hash::encode_operand(state.store.codec(), arg_str(req, 2), value)?;
    state.store.merge(arg_str(req, 1), &operand, b'h')?;
    let mut resp = Response::ok();
    resp.push("1");
    Ok(resp)
}

pub fn hget(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let blob = blob(state, arg_str(req, 1))?;
    match crate::hash::get_value(state.store.codec(), &blob, arg_str(req, 2))? {
        Some(v) => {
            let mut resp = Response::ok();
            resp.push(v.to_string());
            Ok(resp)
        }
        None => Ok(Response::not_found()),
    }
}

pub fn hdel(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let operand = crate::hash::encode_tombstone(state.store.codec(), arg_str(req, 2))?;
    state.store.merge(arg_str(req, 1), &operand, b'h')?;
    let mut resp = Response::ok();
    resp.push("1");
    Ok(resp)
}

pub fn hexists(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let blob = blob(state, arg_str(req, 1))?;
    let found = crate::hash::get_value(state.store.codec(), &blob, arg_str(req, 2))?.is_some();
    let mut resp = Response::ok();
    resp.push(if found { "1" } else { "0" });
    Ok(resp)
}

pub fn hsize(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let blob = blob(state, arg_str(req, 1))?;
    let mut resp = Response::ok();
    resp.push(crate::hash::value_count(&blob)?.to_string());
    Ok(resp)
}

pub fn hgetall(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let blob = blob(state, arg_str(req, 1))?;
    let mut resp = Response::ok();
    for (field, value) in crate::hash::get_values(state.store.codec(), &blob)? {
        resp.push(String::from_utf8_lossy(&field).into_owned());
        resp.push(value.to_string());
    }
    Ok(resp)
}

pub fn hkeys(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let blob = blob(state, arg_str(req, 1))?;
    let mut resp = Response::ok();
    for (field, _) in crate::hash::get_values(state.store.codec(), &blob)? {
        resp.push(String::from_utf8_lossy(&field).into_owned());
    }
    Ok(resp)
}

pub fn hvals(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let blob = blob(state, arg_str(req, 1))?;
    let mut resp = Response::ok();
    for (_, value) in crate::hash::get_values(state.store.codec(), &blob)? {
        resp.push(value.to_string());
    }
    Ok(resp)
}

pub fn hincr(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let by = if req.len() > 3 { parse_i64(arg_str(req, 3))? } else { 1 };
    let name = arg_str(req, 1);
    let field = arg_str(req, 2);
    let blob = blob(state, name)?;
    let current = crate::hash::get_value(state.store.codec(), &blob, field)?.unwrap_or(0) as i64;
    let next = current + by;
    if next < i16::MIN as i64 || next >= crate::hash::TOMBSTONE as i64 {
        return Ok(Response::error("value is not an integer or out of range"));
    }
    let operand = crate::hash::encode_operand(state.store.codec(), field, next as i16)?;
    state.store.merge(name, &operand, b'h')?;
    let mut resp = Response::ok();
    resp.push(next.to_string());
    Ok(resp)
}

pub fn multi_hset(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 4)?;
    if (req.len() - 2) % 2 != 0 {
        return Ok(Response::client_error("wrong number of arguments"));
    }
    let name = arg_str(req, 1);
    let mut n = 0;
    let mut pairs = req[2..].chunks_exact(2);
    for pair in &mut pairs {
        let value = parse_i64(pair[1].as_bytes())? as i16;
        let operand = crate::hash::encode_operand(state.store.codec(), pair[0].as_bytes(), value)?;
        state.store.merge(name, &operand, b'h')?;
        n += 1;
    }
    let mut resp = Response::ok();
    resp.push(n.to_string());
    Ok(resp)
}

pub fn multi_hget(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let blob = blob(state, arg_str(req, 1))?;
    let mut resp = Response::ok();
    for field in &req[2..] {
        if let Some(v) = crate::hash::get_value(state.store.codec(), &blob, field.as_bytes())? {
            resp.push(String::from_utf8_lossy(field.as_bytes()).into_owned());
            resp.push(v.to_string());
        }
    }
    Ok(resp)
}

pub fn multi_hdel(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let name = arg_str(req, 1);
    let existing = blob(state, name)?;
    let mut n = 0;
    for field in &req[2..] {
        if crate::hash::get_value(state.store.codec(), &existing, field.as_bytes())?.is_some() {
            n += 1;
        }
        let operand = crate::hash::encode_tombstone(state.store.codec(), field.as_bytes())?;
        state.store.merge(name, &operand, b'h')?;
    }
    let mut resp = Response::ok();
    resp.push(n.to_string());
    Ok(resp)
}

pub fn multi_hsize(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let mut resp = Response::ok();
    for name in &req[1..] {
        let blob = blob(state, name.as_bytes())?;
        resp.push(String::from_utf8_lossy(name.as_bytes()).into_owned());
        resp.push(crate::hash::value_count(&blob)?.to_string());
    }
    Ok(resp)
}

pub fn multi_hexists(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let name = arg_str(req, 1);
    let blob = blob(state, name)?;
    let mut resp = Response::ok();
    for field in &req[2..] {
        let found = crate::hash::get_value(state.store.codec(), &blob, field.as_bytes())?.is_some();
        resp.push(String::from_utf8_lossy(field.as_bytes()).into_owned());
        resp.push(if found { "1" } else { "0" });
    }
    Ok(resp)
}
