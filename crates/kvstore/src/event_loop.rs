//! Event loop: accept, readiness dispatch, ready-list
//! re-entry, result posting. One instance runs per event-loop thread.
//! Grounded in `examples/original_source/src/net/server.cpp`'s `serve()`:
//! a ready-list carried across poll iterations so a connection with
//! already-buffered input doesn't wait for another readiness event, and a
//! zero-timeout poll whenever that ready-list is non-empty.

use crate::command::Command;
use crate::connection::{configure_accepted_socket, Connection, Generation, ParseResult};
use crate::dispatch::{self, Outcome};
use crate::framing::{Field, Request};
use crate::poller::Poller;
use crate::server_state::ServerState;
use crate::worker_pool::{Job, WorkerPool};
use mio::net::TcpListener;
use mio::{Events, Interest, Token};
use std::collections::HashMap;
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

const LISTENER_TOKEN: Token = Token(0);
const WAKE_TOKEN: Token = Token(1);
const FIRST_CONN_TOKEN: usize = 2;

/// Rewrite an IPv6-mapped-IPv4 peer address (`::ffff:a.b.c.d`) to its plain
/// v4 form, so a loopback check (`is_loopback`) or an IP allow/deny-list
/// entry written in v4 form matches a dual-stack client the same way a
/// native v4 connection would.
fn normalize_mapped_v4(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(a) => match a.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::V4(SocketAddrV4::new(v4, a.port())),
            None => SocketAddr::V6(a),
        },
        other => other,
    }
}

/// A completed worker-pool job's result, posted back to the owning event
/// loop. `(token, generation)`
/// lets the loop recognize and drop stale results for closed connections.
struct JobResult {
    token: Token,
    generation: Generation,
    response: crate::framing::Response,
}

/// The unit of work pushed to the shared `WorkerPool` for a `THREAD`
/// command. Executes `dispatch::run_locked` off
/// the event loop thread, then posts its result back.
struct ProcJob {
    state: Arc<ServerState>,
    command: Arc<Command>,
    req: Vec<bytes::Bytes>,
    token: Token,
    generation: Generation,
    result_tx: Sender<JobResult>,
    waker: Arc<mio::Waker>,
}

impl Job for ProcJob {
    fn run(&mut self) {
        let request: Request<'_> = self.req.iter().map(|b| Field::Owned(b.clone())).collect();
        let response = dispatch::run_locked(&self.state, &self.command.flags, &self.command.handler, &request);
        let _ = self.result_tx.send(JobResult {
            token: self.token,
            generation: self.generation,
            response,
        });
        let _ = self.waker.wake();
    }
}

pub struct EventLoop {
    id: usize,
    state: Arc<ServerState>,
    workers: Arc<WorkerPool<ProcJob>>,
    poller: Poller,
    events: Events,
    listener: TcpListener,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    result_tx: Sender<JobResult>,
    result_rx: Receiver<JobResult>,
    waker: Arc<mio::Waker>,
    ready_list: Vec<Token>,
}

impl EventLoop {
    pub fn new(
        id: usize,
        state: Arc<ServerState>,
        workers: Arc<WorkerPool<ProcJob>>,
        mut listener: TcpListener,
    ) -> std::io::Result<Self> {
        let mut poller = Poller::new()?;
        poller.register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(poller.waker(WAKE_TOKEN)?);
        let (result_tx, result_rx) = channel();
        Ok(EventLoop {
            id,
            state,
            workers,
            poller,
            events: Events::with_capacity(1024),
            listener,
            connections: HashMap::new(),
            next_token: FIRST_CONN_TOKEN,
            result_tx,
            result_rx,
            waker,
            ready_list: Vec::new(),
        })
    }

    /// Run until `ServerState::is_quitting()` is observed.
    pub fn run(&mut self) -> std::io::Result<()> {
        while !self.state.is_quitting() {
            let timeout = if self.ready_list.is_empty() {
                Some(Duration::from_millis(100))
            } else {
                Some(Duration::ZERO)
            };
            self.poller.wait(&mut self.events, timeout)?;

            for event in self.events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_loop()?,
                    WAKE_TOKEN => self.drain_results(),
                    token => {
                        if event.is_readable() {
                            self.on_readable(token);
                        }
                        if event.is_writable() {
                            self.on_writable(token);
                        }
                    }
                }
            }

            let pending: Vec<Token> = self.ready_list.drain(..).collect();
            for token in pending {
                self.process_ready(token);
            }
        }
        Ok(())
    }

    fn accept_loop(&mut self) -> std::io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let addr = normalize_mapped_v4(addr);
                    if !self.state.ip_filter.lock().unwrap().permits(&addr.ip().to_string()) {
                        continue;
                    }
                    if configure_accepted_socket(&stream).is_err() {
                        continue;
                    }
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    self.poller.register(&mut stream, token, Interest::READABLE)?;
                    let generation = token.0 as Generation;
                    tracing::debug!(loop_id = self.id, ?addr, "accepted connection");
                    self.connections.insert(token, Connection::new(stream, addr, generation));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        Ok(())
    }

    fn on_readable(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        match conn.fill() {
            Ok(0) => self.close_connection(token),
            Ok(_) => self.ready_list.push(token),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(_) => self.close_connection(token),
        }
    }

    fn on_writable(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else { return };
        if conn.flush().is_err() {
            self.close_connection(token);
            return;
        }
        if !conn.has_pending_output() {
            let _ = self.poller.reregister(&mut conn.stream, token, Interest::READABLE);
        }
    }

    /// Parse and dispatch as many complete requests as are buffered for
    /// this connection: a `THREAD` command stops the loop for this
    /// connection until its result is posted back, since the event loop
    /// clears read interest for the connection so it cannot submit a
    /// second request before the first completes.
    fn process_ready(&mut self, token: Token) {
        loop {
            let Some(conn) = self.connections.get_mut(&token) else { return };
            let parsed = conn.try_parse_one();
            let req = match parsed {
                ParseResult::NeedMore => return,
                ParseResult::FatalError => {
                    self.close_connection(token);
                    return;
                }
                ParseResult::Request(req) => req,
            };

            match dispatch::dispatch(&self.state, conn, &req) {
                Outcome::Done(resp) => {
                    if !resp.fields.is_empty() {
                        conn.queue_response(&resp);
                        let _ = conn.flush();
                        if conn.has_pending_output() {
                            let _ = self.poller.reregister(&mut conn.stream, token, Interest::READABLE | Interest::WRITABLE);
                        }
                    }
                }
                Outcome::Enqueue { command, owned_req } => {
                    let _ = self.poller.reregister(&mut conn.stream, token, Interest::empty());
                    let job = ProcJob {
                        state: Arc::clone(&self.state),
                        command,
                        req: owned_req,
                        token,
                        generation: conn.generation,
                        result_tx: self.result_tx.clone(),
                        waker: Arc::clone(&self.waker),
                    };
                    self.workers.push(job);
                    return;
                }
                Outcome::HandedOff { kind, arg } => {
                    if let Some(mut conn) = self.connections.remove(&token) {
                        let _ = self.poller.deregister(&mut conn.stream);
                        let std_stream = conn.into_std_stream();
                        match kind.as_str() {
                            "dump" => crate::replication::spawn_dump(Arc::clone(&self.state), std_stream),
                            "sync" => {
                                let seq = arg.and_then(|s| s.parse().ok()).unwrap_or(0);
                                crate::replication::spawn_sync(Arc::clone(&self.state), std_stream, seq);
                            }
                            _ => {}
                        }
                    }
                    return;
                }
                Outcome::Error => {
                    self.close_connection(token);
                    return;
                }
            }
        }
    }

    /// Drain worker results posted since the last wake, dropping any whose
    /// generation no longer matches the live connection.
    fn drain_results(&mut self) {
        while let Ok(result) = self.result_rx.try_recv() {
            let Some(conn) = self.connections.get_mut(&result.token) else { continue };
            if conn.generation != result.generation {
                continue;
            }
            if !result.response.fields.is_empty() {
                conn.queue_response(&result.response);
                let _ = conn.flush();
            }
            if conn.has_pending_output() {
                let _ = self.poller.reregister(&mut conn.stream, result.token, Interest::READABLE | Interest::WRITABLE);
            } else {
                let _ = self.poller.reregister(&mut conn.stream, result.token, Interest::READABLE);
            }
            self.ready_list.push(result.token);
        }
    }

    fn close_connection(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poller.deregister(&mut conn.stream);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_mapped_v4;

    #[test]
    fn ipv6_mapped_v4_peer_is_rewritten_to_plain_v4() {
        let mapped: SocketAddr = "[::ffff:127.0.0.1]:4242".parse().unwrap();
        let normalized = normalize_mapped_v4(mapped);
        assert_eq!(normalized, "127.0.0.1:4242".parse().unwrap());
        assert!(normalized.ip().is_loopback());
    }

    #[test]
    fn plain_addresses_pass_through_unchanged() {
        let v4: SocketAddr = "10.0.0.1:1234".parse().unwrap();
        assert_eq!(normalize_mapped_v4(v4), v4);

        let v6: SocketAddr = "[2001:db8::1]:1234".parse().unwrap();
        assert_eq!(normalize_mapped_v4(v6), v6);
    }
}
