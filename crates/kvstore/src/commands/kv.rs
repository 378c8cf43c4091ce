//! Plain key/value commands operating directly on raw byte values. Grounded
//! in `SSDBImpl::raw_set`/`raw_get`/`raw_del` (`ssdb_impl.cpp`): a thin
//! pass-through to the default column family, binlogged per write.

use super::{arg_str, parse_i64, require_arity};
use crate::error::{Error, Result};
use crate::framing::{Request, Response};
use crate::server_state::ServerState;

pub fn get(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    match state.store.get(arg_str(req, 1))? {
        Some(value) => {
            let mut resp = Response::ok();
            resp.push(String::from_utf8_lossy(&value).into_owned());
            Ok(resp)
        }
        None => Ok(Response::not_found()),
    }
}

pub fn set(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    state.store.set(arg_str(req, 1), arg_str(req, 2), b's')?;
    let mut resp = Response::ok();
    resp.push("1");
    Ok(resp)
}

pub fn setnx(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let key = arg_str(req, 1);
    if state.store.exists(key)? {
        let mut resp = Response::ok();
        resp.push("0");
        return Ok(resp);
    }
    state.store.set(key, arg_str(req, 2), b's')?;
    let mut resp = Response::ok();
    resp.push("1");
    Ok(resp)
}

/// `setx key value ttl` — set then apply a TTL in one round trip.
pub fn setx(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 4)?;
    let ttl = parse_i64(arg_str(req, 3))?;
    state.store.set(arg_str(req, 1), arg_str(req, 2), b's')?;
    state.store.expire(arg_str(req, 1), ttl)?;
    let mut resp = Response::ok();
    resp.push("1");
    Ok(resp)
}

pub fn getset(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let key = arg_str(req, 1);
    let old = state.store.get(key)?;
    state.store.set(key, arg_str(req, 2), b's')?;
    let mut resp = Response::ok();
    match old {
        Some(v) => {
            resp.push(String::from_utf8_lossy(&v).into_owned());
        }
        None => {}
    }
    Ok(resp)
}

pub fn del(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    state.store.delete(arg_str(req, 1), b'd')?;
    let mut resp = Response::ok();
    resp.push("1");
    Ok(resp)
}

pub fn multi_del(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let mut n = 0;
    for field in &req[1..] {
        state.store.delete(field.as_bytes(), b'd')?;
        n += 1;
    }
    let mut resp = Response::ok();
    resp.push(n.to_string());
    Ok(resp)
}

pub fn multi_set(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    if (req.len() - 1) % 2 != 0 {
        return Err(Error::Arity);
    }
    let mut n = 0;
    let mut pairs = req[1..].chunks_exact(2);
    for pair in &mut pairs {
        state.store.set(pair[0].as_bytes(), pair[1].as_bytes(), b's')?;
        n += 1;
    }
    let mut resp = Response::ok();
    resp.push(n.to_string());
    Ok(resp)
}

pub fn multi_get(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let mut resp = Response::ok();
    for field in &req[1..] {
        if let Some(value) = state.store.get(field.as_bytes())? {
            resp.push(String::from_utf8_lossy(field.as_bytes()).into_owned());
            resp.push(String::from_utf8_lossy(&value).into_owned());
        }
    }
    Ok(resp)
}

pub fn exists(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let mut resp = Response::ok();
    resp.push(if state.store.exists(arg_str(req, 1))? { "1" } else { "0" });
    Ok(resp)
}

fn incr_by(state: &ServerState, key: &[u8], delta: i64) -> Result<i64> {
    let current = match state.store.get(key)? {
        Some(v) => std::str::from_utf8(&v).ok().and_then(|s| s.parse::<i64>().ok()).ok_or(Error::NotAnInteger)?,
        None => 0,
    };
    let next = current + delta;
    state.store.set(key, next.to_string().as_bytes(), b'i')?;
    Ok(next)
}

pub fn incr(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let delta = if req.len() > 2 { parse_i64(arg_str(req, 2))? } else { 1 };
    let next = incr_by(state, arg_str(req, 1), delta)?;
    let mut resp = Response::ok();
    resp.push(next.to_string());
    Ok(resp)
}

pub fn decr(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let delta = if req.len() > 2 { parse_i64(arg_str(req, 2))? } else { 1 };
    let next = incr_by(state, arg_str(req, 1), -delta)?;
    let mut resp = Response::ok();
    resp.push(next.to_string());
    Ok(resp)
}

pub fn ttl(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let mut resp = Response::ok();
    resp.push(state.store.ttl(arg_str(req, 1))?.to_string());
    Ok(resp)
}

pub fn expire(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let secs = parse_i64(arg_str(req, 2))?;
    let changed = state.store.expire(arg_str(req, 1), secs)?;
    let mut resp = Response::ok();
    resp.push(if changed { "1" } else { "0" });
    Ok(resp)
}

pub fn keys(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let prefix = arg_str(req, 1);
    let mut resp = Response::ok();
    for key in state.store.scan_prefix(prefix)? {
        // Skip this crate's own TTL side-keys and any hash/binlog keys
        // that happen to start with the same byte as a requested prefix.
        if key.first() == Some(&crate::store::TTL_PREFIX) {
            continue;
        }
        resp.push(String::from_utf8_lossy(&key).into_owned());
    }
    Ok(resp)
}

pub fn strlen(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let mut resp = Response::ok();
    let len = state.store.get(arg_str(req, 1))?.map(|v| v.len()).unwrap_or(0);
    resp.push(len.to_string());
    Ok(resp)
}

pub fn getrange(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 4)?;
    let value = state.store.get(arg_str(req, 1))?.unwrap_or_default();
    let len = value.len() as i64;
    let clamp = |i: i64| -> usize {
        let idx = if i < 0 { (len + i).max(0) } else { i.min(len) };
        idx as usize
    };
    let start = clamp(parse_i64(arg_str(req, 2))?);
    let end = clamp(parse_i64(arg_str(req, 3))? + 1);
    let mut resp = Response::ok();
    if start < end {
        resp.push(String::from_utf8_lossy(&value[start..end]).into_owned());
    } else {
        resp.push("");
    }
    Ok(resp)
}

pub fn getbit(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 3)?;
    let value = state.store.get(arg_str(req, 1))?.unwrap_or_default();
    let offset = parse_i64(arg_str(req, 2))?.max(0) as usize;
    let byte_idx = offset / 8;
    let bit_idx = 7 - (offset % 8);
    let bit = value.get(byte_idx).map(|b| (b >> bit_idx) & 1).unwrap_or(0);
    let mut resp = Response::ok();
    resp.push(bit.to_string());
    Ok(resp)
}

pub fn setbit(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 4)?;
    let key = arg_str(req, 1);
    let offset = parse_i64(arg_str(req, 2))?.max(0) as usize;
    let want = parse_i64(arg_str(req, 3))? != 0;
    let mut value = state.store.get(key)?.unwrap_or_default();
    let byte_idx = offset / 8;
    let bit_idx = 7 - (offset % 8);
    if byte_idx >= value.len() {
        value.resize(byte_idx + 1, 0);
    }
    let old = (value[byte_idx] >> bit_idx) & 1;
    if want {
        value[byte_idx] |= 1 << bit_idx;
    } else {
        value[byte_idx] &= !(1 << bit_idx);
    }
    state.store.set(key, &value, b'b')?;
    let mut resp = Response::ok();
    resp.push(old.to_string());
    Ok(resp)
}

pub fn bitcount(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let value = state.store.get(arg_str(req, 1))?.unwrap_or_default();
    let count: u32 = value.iter().map(|b| b.count_ones()).sum();
    let mut resp = Response::ok();
    resp.push(count.to_string());
    Ok(resp)
}
