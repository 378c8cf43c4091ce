//! Admin commands for the allow/deny IP access list. Grounded in `examples/original_source/src/net/fde.h`'s
//! connection-acceptance gate: a pair of string sets consulted before a
//! peer address is allowed past `accept()`.

use super::{arg_str, require_arity};
use crate::error::Result;
use crate::framing::{Request, Response};
use crate::server_state::ServerState;

/// Allow/deny address lists consulted at accept time. An empty `allow`
/// set means "no allow-list restriction"; `deny` always takes effect.
#[derive(Debug, Default)]
pub struct IpFilter {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl IpFilter {
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        IpFilter { allow, deny }
    }

    pub fn permits(&self, addr: &str) -> bool {
        if self.deny.iter().any(|d| d == addr) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|a| a == addr)
    }
}

pub fn list_allow_ip(state: &ServerState, _req: &Request<'_>) -> Result<Response> {
    let mut resp = Response::ok();
    for addr in &state.ip_filter.lock().unwrap().allow {
        resp.push(addr.clone());
    }
    Ok(resp)
}

pub fn add_allow_ip(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let addr = String::from_utf8_lossy(arg_str(req, 1)).into_owned();
    let mut filter = state.ip_filter.lock().unwrap();
    if !filter.allow.contains(&addr) {
        filter.allow.push(addr);
    }
    Ok(Response::ok())
}

pub fn del_allow_ip(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let addr = String::from_utf8_lossy(arg_str(req, 1)).into_owned();
    state.ip_filter.lock().unwrap().allow.retain(|a| a != &addr);
    Ok(Response::ok())
}

pub fn list_deny_ip(state: &ServerState, _req: &Request<'_>) -> Result<Response> {
    let mut resp = Response::ok();
    for addr in &state.ip_filter.lock().unwrap().deny {
        resp.push(addr.clone());
    }
    Ok(resp)
}

pub fn add_deny_ip(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let addr = String::from_utf8_lossy(arg_str(req, 1)).into_owned();
    let mut filter = state.ip_filter.lock().unwrap();
    if !filter.deny.contains(&addr) {
        filter.deny.push(addr);
    }
    Ok(Response::ok())
}

pub fn del_deny_ip(state: &ServerState, req: &Request<'_>) -> Result<Response> {
    require_arity(req, 2)?;
    let addr = String::from_utf8_lossy(arg_str(req, 1)).into_owned();
    state.ip_filter.lock().unwrap().deny.retain(|a| a != &addr);
    Ok(Response::ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_overrides_allow() {
        let filter = IpFilter::new(vec!["10.0.0.1".into()], vec!["10.0.0.1".into()]);
        assert!(!filter.permits("10.0.0.1"));
    }

    #[test]
    fn empty_allow_list_permits_everyone_not_denied() {
        let filter = IpFilter::new(Vec::new(), vec!["10.0.0.2".into()]);
        assert!(filter.permits("10.0.0.1"));
        assert!(!filter.permits("10.0.0.2"));
    }

    #[test]
    fn nonempty_allow_list_restricts_to_members() {
        let filter = IpFilter::new(vec!["10.0.0.1".into()], Vec::new());
        assert!(filter.permits("10.0.0.1"));
        assert!(!filter.permits("10.0.0.3"));
    }
}
