//! Per-connection I/O buffering and protocol detection.
//!
//! Grounded in `examples/original_source/src/net/link.cpp` (`Link::read`,
//! `Link::write`, `Link::recv`): a growable input buffer that is read into
//! until it would block, a request parsed out of its front, and a growable
//! output buffer drained by non-blocking writes. `noblock()`/`keepalive()`/
//! `nodelay()` socket options are set once at accept time via `socket2`
//! rather than raw `fcntl`/`setsockopt` calls.

use crate::framing::{native::NativeFramer, resp::RespFramer, sniff_mode, Framer, FramerMode, Request, Response};
use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::net::TcpStream;

/// Shrink the input/output buffers back down to this size once drained,
/// mirroring `link.cpp`'s `BEST_BUFFER_SIZE` high-water mark.
const BEST_BUFFER_SIZE: usize = 8 * 1024;
const INIT_BUFFER_SIZE: usize = 1024;

/// A connection's generation counter distinguishes a live `fd` from a
/// closed-then-reused one: a worker result tagged with a stale generation
/// is dropped instead of written to a connection it was never meant for.
pub type Generation = u64;

enum ProtoFramer {
    Native(NativeFramer),
    Resp(RespFramer),
}

impl ProtoFramer {
    fn as_framer(&mut self) -> &mut dyn Framer {
        match self {
            ProtoFramer::Native(f) => f,
            ProtoFramer::Resp(f) => f,
        }
    }
}

/// One accepted TCP connection: its socket, buffers, and framing state.
pub struct Connection {
    pub stream: TcpStream,
    pub peer_addr: SocketAddr,
    pub generation: Generation,
    pub authenticated: bool,

    input: Vec<u8>,
    input_start: usize,
    output: Vec<u8>,
    output_start: usize,

    framer: ProtoFramer,
    mode_detected: bool,

    pub closing: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, generation: Generation) -> Self {
        Connection {
            stream,
            peer_addr,
            generation,
            authenticated: false,
            input: Vec::with_capacity(INIT_BUFFER_SIZE),
            input_start: 0,
            output: Vec::with_capacity(INIT_BUFFER_SIZE),
            output_start: 0,
            framer: ProtoFramer::Native(NativeFramer::new()),
            mode_detected: false,
            closing: false,
        }
    }

    fn compact_input(&mut self) {
        if self.input_start > 0 {
            self.input.drain(0..self.input_start);
            self.input_start = 0;
        }
    }

    fn compact_output(&mut self) {
        if self.output_start > 0 {
            self.output.drain(0..self.output_start);
            self.output_start = 0;
        }
        if self.output.is_empty() && self.output.capacity() > BEST_BUFFER_SIZE {
            self.output.shrink_to(BEST_BUFFER_SIZE);
        }
    }

    /// Read as much as is available without blocking, appending to the
    /// input buffer. Returns `Ok(0)` on a clean peer shutdown, mirroring
    /// `Link::read`'s `len == 0` case.
    pub fn fill(&mut self) -> io::Result<usize> {
        self.compact_input();
        if self.input.is_empty() && self.input.capacity() > BEST_BUFFER_SIZE {
            self.input.shrink_to(BEST_BUFFER_SIZE);
        }

        let mut total = 0usize;
        let mut chunk = [0u8; 64 * 1024];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(total),
                Ok(n) => {
                    self.input.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    /// Drain as much of the output buffer as can be written without
    /// blocking (`Link::write`).
    pub fn flush(&mut self) -> io::Result<()> {
        loop {
            let remaining = &self.output[self.output_start..];
            if remaining.is_empty() {
                break;
            }
            match self.stream.write(remaining) {
                Ok(0) => break,
                Ok(n) => self.output_start += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.compact_output();
        Ok(())
    }

    pub fn has_pending_output(&self) -> bool {
        self.output_start < self.output.len()
    }

    pub fn queue_response(&mut self, resp: &Response) {
        self.framer.as_framer().encode(resp, &mut self.output);
    }

    /// Convert the underlying socket back into a plain blocking-capable
    /// `std::net::TcpStream` for handoff to a dedicated replication thread.
    /// The `mio` registration is implicitly dropped along with `self`; the
    /// caller must have already deregistered the token.
    pub fn into_std_stream(self) -> std::net::TcpStream {
        use std::os::unix::io::{FromRawFd, IntoRawFd};
        unsafe { std::net::TcpStream::from_raw_fd(self.stream.into_raw_fd()) }
    }

    /// Parse zero or more requests out of the buffered input (`Link::recv`
    /// parses exactly one; the event loop calls this in a loop). Detects
    /// the wire protocol on the first non-blank byte.
    pub fn try_parse_one(&mut self) -> ParseResult<'_> {
        self.compact_input();
        let buf = &self.input[self.input_start..];

        if !self.mode_detected {
            match sniff_mode(buf) {
                Some(FramerMode::Resp) => {
                    self.framer = ProtoFramer::Resp(RespFramer::new());
                    self.mode_detected = true;
                }
                Some(FramerMode::Native) => {
                    self.mode_detected = true;
                }
                None => return ParseResult::NeedMore,
            }
        }

        let buf = &self.input[self.input_start..];
        let (outcome, consumed) = self.framer.as_framer().try_parse(buf);
        match outcome {
            crate::framing::ParseOutcome::Request(req) => {
                // SAFETY-FREE: `consumed` bytes are retired from the front
                // of the buffer on the caller's next `try_parse_one` via
                // `input_start`; the borrow in `req` stays valid until then
                // because we never mutate `self.input` in between.
                self.input_start += consumed;
                ParseResult::Request(req)
            }
            crate::framing::ParseOutcome::NeedMore => ParseResult::NeedMore,
            crate::framing::ParseOutcome::FatalError => ParseResult::FatalError,
        }
    }
}

pub enum ParseResult<'a> {
    Request(Request<'a>),
    NeedMore,
    FatalError,
}

/// Apply the keepalive/nodelay/linger socket options `Link::accept` sets on
/// every accepted connection.
pub fn configure_accepted_socket(stream: &TcpStream) -> io::Result<()> {
    use socket2::SockRef;
    let sock = SockRef::from(stream);
    sock.set_nodelay(true)?;
    sock.set_keepalive(true)?;
    sock.set_linger(Some(std::time::Duration::from_secs(0)))?;
    Ok(())
}
