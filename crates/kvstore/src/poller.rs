//! Readiness poller: add/modify/delete interest, wait with
//! a timeout. Grounded in `mio::Poll`'s registry, the idiomatic-Rust analog
//! of the original's `Fdevents` epoll wrapper
//! (`examples/original_source/src/net/server.cpp`'s `fdes->set/clr/del/wait`).

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::time::Duration;

/// Thin wrapper over `mio::Poll` matching the original `Fdevents`'s
/// vocabulary: `register`/`reregister`/`deregister`/`wait`.
pub struct Poller {
    poll: Poll,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        Ok(Poller { poll: Poll::new()? })
    }

    pub fn register(&mut self, source: &mut impl Source, token: Token, interest: Interest) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    pub fn reregister(&mut self, source: &mut impl Source, token: Token, interest: Interest) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister(&mut self, source: &mut impl Source) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    pub fn waker(&self, token: Token) -> io::Result<mio::Waker> {
        mio::Waker::new(self.poll.registry(), token)
    }

    /// Block until readiness events are available or `timeout` elapses,
    /// filling `events`. `timeout = None` blocks indefinitely; a
    /// `Some(Duration::ZERO)` poll is used by the event loop when its
    /// ready-list from the previous pass is non-empty.
    pub fn wait(&mut self, events: &mut Events, timeout: Option<Duration>) -> io::Result<()> {
        self.poll.poll(events, timeout)
    }
}
