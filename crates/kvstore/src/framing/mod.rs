//! Dual-protocol framing: a polymorphic capability over the native
//! length-prefixed protocol and the inline Redis RESP dialect.
//!
//! Grounded in `examples/original_source/src/net/{link.cpp,link_redis.cpp}`:
//! a single connection detects its protocol from the first byte and keeps
//! it for the connection's lifetime.

pub mod native;
pub mod resp;

use bytes::Bytes;

/// Maximum aggregate size of a single parsed native request.
pub const MAX_PACKET_SIZE: usize = 128 * 1024 * 1024;

/// A single field of a request. Borrowed fields view the connection's
/// input buffer directly and are only valid until the next `compact`;
/// owned fields are used once a request crosses into the worker pool.
#[derive(Debug, Clone)]
pub enum Field<'a> {
    Borrowed(&'a [u8]),
    Owned(Bytes),
}

impl<'a> Field<'a> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Field::Borrowed(b) => b,
            Field::Owned(b) => b.as_ref(),
        }
    }

    pub fn to_owned_field(&self) -> Field<'static> {
        Field::Owned(Bytes::copy_from_slice(self.as_bytes()))
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            Field::Borrowed(b) => Bytes::copy_from_slice(b),
            Field::Owned(b) => b.clone(),
        }
    }
}

/// An ordered sequence of byte slices; element 0 is the (lowercased)
/// command name.
pub type Request<'a> = Vec<Field<'a>>;

/// A fully owned request, handed to the worker pool or to a link-taking
/// backend task.
pub type OwnedRequest = Vec<Bytes>;

pub fn to_owned_request(req: &Request<'_>) -> OwnedRequest {
    req.iter().map(Field::to_bytes).collect()
}

/// Status token, element 0 of a `Response`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    Error,
    Fail,
    ClientError,
    NoAuth,
    /// Never sent on the wire: a `Link` handler's signal that it has
    /// taken ownership of the connection (the original's `PROC_BACKEND`).
    Backend,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::NotFound => "not_found",
            Status::Error => "error",
            Status::Fail => "fail",
            Status::ClientError => "client_error",
            Status::NoAuth => "noauth",
            Status::Backend => "backend",
        }
    }
}

/// An ordered sequence of strings; element 0 is the status token.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub fields: Vec<String>,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Response {
            fields: vec![status.as_str().to_string()],
        }
    }

    pub fn ok() -> Self {
        Response::new(Status::Ok)
    }

    pub fn not_found() -> Self {
        Response::new(Status::NotFound)
    }

    pub fn error(msg: impl Into<String>) -> Self {
        let mut r = Response::new(Status::Error);
        r.fields.push(msg.into());
        r
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        let mut r = Response::new(Status::Fail);
        r.fields.push(msg.into());
        r
    }

    pub fn client_error(msg: impl Into<String>) -> Self {
        let mut r = Response::new(Status::ClientError);
        r.fields.push(msg.into());
        r
    }

    pub fn noauth(msg: impl Into<String>) -> Self {
        let mut r = Response::new(Status::NoAuth);
        r.fields.push(msg.into());
        r
    }

    /// Build a `PROC_BACKEND` signal: `kind` is `"dump"` or `"sync"`, `arg`
    /// carries the resume sequence for `sync` (empty for `dump`).
    pub fn backend(kind: impl Into<String>, arg: Option<String>) -> Self {
        let mut r = Response::new(Status::Backend);
        r.fields.push(kind.into());
        if let Some(arg) = arg {
            r.fields.push(arg);
        }
        r
    }

    pub fn push(&mut self, s: impl Into<String>) -> &mut Self {
        self.fields.push(s.into());
        self
    }

    pub fn status(&self) -> &str {
        self.fields[0].as_str()
    }

    pub fn is_ok(&self) -> bool {
        self.status() == "ok"
    }
}

/// Outcome of attempting to parse one request out of a connection's input
/// buffer.
pub enum ParseOutcome<'a> {
    /// A complete request was parsed (possibly empty, used as keep-alive).
    Request(Request<'a>),
    /// Not enough bytes buffered yet; try again once more data arrives.
    NeedMore,
    /// The input is syntactically invalid; the connection must be closed.
    FatalError,
}

/// The polymorphic framing capability. Implementations own
/// whatever per-connection translation state they need (the RESP side owns
/// its command-translation tables as associated lookups, not per-instance
/// state, since the table is read-only and shared).
pub trait Framer: Send {
    /// Attempt to parse one request from `input`. Must not consume more of
    /// `input` than one complete request (or the leading keep-alive noise).
    fn try_parse<'a>(&mut self, input: &'a [u8]) -> (ParseOutcome<'a>, usize);

    /// Encode `resp` (plus, for RESP, the original request needed to shape
    /// multi-bulk replies like `mget`/`zrangebyscore`) into `out`.
    fn encode(&mut self, resp: &Response, out: &mut Vec<u8>);
}

/// Which framer a connection is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerMode {
    Native,
    Resp,
}

/// Sniff the first non-whitespace byte to decide whether a connection
/// should switch to RESP mode.
pub fn sniff_mode(input: &[u8]) -> Option<FramerMode> {
    for &b in input {
        if b == b'\n' || b == b'\r' {
            continue;
        }
        return Some(if b == b'*' {
            FramerMode::Resp
        } else {
            FramerMode::Native
        });
    }
    None
}
