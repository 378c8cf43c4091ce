//! Internal error type for the storage and framing layers.
//!
//! Never crosses the client-facing boundary directly: every command
//! handler converts it into a `Response` whose first token is one of the
//! status tokens (ok/not_found/error/fail/client_error/noauth) before it
//! reaches a client.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed request: {0}")]
    Protocol(String),
    #[error("wrong number of arguments")]
    Arity,
    #[error("value is not an integer or out of range")]
    NotAnInteger,
    #[error("field is outside the packed-hash codec's domain")]
    FieldOutOfDomain,
}

pub type Result<T> = std::result::Result<T, Error>;
