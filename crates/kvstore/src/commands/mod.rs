//! Command handlers ,
//! grouped the way `examples/original_source/src/proc_*.cpp` splits them
//! by data type.

pub mod admin;
pub mod generic;
pub mod hash;
pub mod kv;

/// Shared argument-count check every handler opens with (the original's
/// implicit arity checks scattered through each `proc_*` function, made a
/// single reusable guard here).
pub(crate) fn require_arity(req: &crate::framing::Request<'_>, min: usize) -> crate::error::Result<()> {
    if req.len() < min {
        return Err(crate::error::Error::Arity);
    }
    Ok(())
}

pub(crate) fn arg_str<'a>(req: &'a crate::framing::Request<'_>, idx: usize) -> &'a [u8] {
    req[idx].as_bytes()
}

pub(crate) fn parse_i64(bytes: &[u8]) -> crate::error::Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(crate::error::Error::NotAnInteger)
}
