//! Command table: flags, dispatch strategy, and handler function pointers.
//!
//! Grounded in `examples/original_source/src/net/proc.h` (`Command`,
//! `ProcMap`) — the original's bitflag `Command::FLAG_*` set plus a
//! name-keyed map, ported to a `bitflags`-free `CommandFlags` struct of
//! plain `bool`s (the flag set is small and fixed, so a bitfield buys
//! nothing idiomatic Rust code would reach for) and a `HashMap` built once
//! behind a `lazy_static`.

use crate::connection::Connection;
use crate::error::Result;
use crate::framing::{Request, Response};
use crate::server_state::ServerState;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-command execution requirements.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandFlags {
    /// Read-only command; always permitted, never touches the G lock.
    pub read: bool,
    /// Mutates storage; acquires the G lock (shared unless `block` too).
    pub write: bool,
    /// Needs exclusive access while running (acquires the G lock exclusively).
    pub block: bool,
    /// Dispatched to the worker pool rather than run inline.
    pub thread: bool,
    /// Needs direct access to the owning `Connection` (replication streams).
    pub link: bool,
}

impl CommandFlags {
    pub const fn read() -> Self {
        CommandFlags { read: true, ..Self::none() }
    }
    pub const fn write() -> Self {
        CommandFlags {
            write: true,
            thread: true,
            ..Self::none()
        }
    }
    pub const fn write_blocking() -> Self {
        CommandFlags {
            write: true,
            block: true,
            thread: true,
            ..Self::none()
        }
    }
    pub const fn link() -> Self {
        CommandFlags { link: true, ..Self::none() }
    }
    const fn none() -> Self {
        CommandFlags {
            read: false,
            write: false,
            block: false,
            thread: false,
            link: false,
        }
    }
}

/// A plain, non-`Link` command handler: runs against shared server state
/// and a request, producing a response. Run inline for read commands, or
/// off the worker pool for write commands.
pub type ProcFn = fn(&ServerState, &Request<'_>) -> Result<Response>;

/// A `Link`-flagged handler that needs the owning connection directly
/// (`dump`/`sync140` streaming replication commands).
pub type LinkProcFn = fn(&ServerState, &mut Connection, &Request<'_>) -> Result<Response>;

pub enum Handler {
    Plain(ProcFn),
    Link(LinkProcFn),
}

pub struct Command {
    pub name: &'static str,
    pub flags: CommandFlags,
    pub handler: Handler,
}

pub struct CommandTable {
    by_name: HashMap<&'static str, Arc<Command>>,
}

impl CommandTable {
    pub fn get(&self, name: &[u8]) -> Option<&Arc<Command>> {
        std::str::from_utf8(name).ok().and_then(|s| self.by_name.get(s))
    }

    fn register(&mut self, name: &'static str, flags: CommandFlags, handler: Handler) {
        self.by_name.insert(
            name,
            Arc::new(Command {
                name,
                flags,
                handler,
            }),
        );
    }
}

macro_rules! table {
    ($($name:expr => $flags:expr, $handler:expr;)*) => {{
        let mut t = CommandTable { by_name: HashMap::new() };
        $( t.register($name, $flags, $handler); )*
        t
    }};
}

/// Build the command table once at startup.
pub fn build_command_table() -> CommandTable {
    use crate::commands::{admin, generic, hash, kv};
    use CommandFlags as F;
    use Handler::{Link, Plain};

    table! {
        "ping" => F::read(), Plain(generic::ping);
        "info" => F::read(), Plain(generic::info);
        "version" => F::read(), Plain(generic::version);
        "dbsize" => F::read(), Plain(generic::dbsize);
        "flushdb" => F::write_blocking(), Plain(generic::flushdb);
        "compact" => F::write_blocking(), Plain(generic::compact);
        "clear_binlog" => F::write_blocking(), Plain(generic::clear_binlog);

        "list_allow_ip" => F::read(), Plain(admin::list_allow_ip);
        "add_allow_ip" => F::read(), Plain(admin::add_allow_ip);
        "del_allow_ip" => F::read(), Plain(admin::del_allow_ip);
        "list_deny_ip" => F::read(), Plain(admin::list_deny_ip);
        "add_deny_ip" => F::read(), Plain(admin::add_deny_ip);
        "del_deny_ip" => F::read(), Plain(admin::del_deny_ip);

        "get" => F::read(), Plain(kv::get);
        "set" => F::write(), Plain(kv::set);
        "setnx" => F::write(), Plain(kv::setnx);
        "setx" => F::write(), Plain(kv::setx);
        "getset" => F::write(), Plain(kv::getset);
        "del" => F::write(), Plain(kv::del);
        "multi_del" => F::write(), Plain(kv::multi_del);
        "multi_set" => F::write(), Plain(kv::multi_set);
        "multi_get" => F::read(), Plain(kv::multi_get);
        "exists" => F::read(), Plain(kv::exists);
        "incr" => F::write(), Plain(kv::incr);
        "decr" => F::write(), Plain(kv::decr);
        "ttl" => F::read(), Plain(kv::ttl);
        "expire" => F::write(), Plain(kv::expire);
        "keys" => F::read(), Plain(kv::keys);
        "strlen" => F::read(), Plain(kv::strlen);
        "getrange" => F::read(), Plain(kv::getrange);
        "getbit" => F::read(), Plain(kv::getbit);
        "setbit" => F::write(), Plain(kv::setbit);
        "bitcount" => F::read(), Plain(kv::bitcount);

        "hset" => F::write(), Plain(hash::hset);
        "hget" => F::read(), Plain(hash::hget);
        "hdel" => F::write(), Plain(hash::hdel);
        "hexists" => F::read(), Plain(hash::hexists);
        "hsize" => F::read(), Plain(hash::hsize);
        "hgetall" => F::read(), Plain(hash::hgetall);
        "hkeys" => F::read(), Plain(hash::hkeys);
        "hvals" => F::read(), Plain(hash::hvals);
        "hincr" => F::write(), Plain(hash::hincr);
        "multi_hset" => F::write(), Plain(hash::multi_hset);
        "multi_hget" => F::read(), Plain(hash::multi_hget);
        "multi_hdel" => F::write(), Plain(hash::multi_hdel);
        "multi_hsize" => F::read(), Plain(hash::multi_hsize);
        "multi_hexists" => F::read(), Plain(hash::multi_hexists);

        "dump" => F::link(), Link(generic::dump);
        "sync140" => F::link(), Link(generic::sync140);
    }
}
