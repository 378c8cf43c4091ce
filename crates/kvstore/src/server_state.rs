//! The single server-context value: everything dispatch needs that isn't connection-local, shared
//! read-mostly across event-loop and worker threads behind `Arc`.

use crate::command::{build_command_table, CommandTable};
use crate::config::Config;
use crate::store::Store;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// The process-wide `G` lock: `WRITE|BLOCK`
/// acquires it exclusively, `WRITE` acquires it shared, `READ` never
/// touches it. Its polarity is inverted from the conventional RwLock
/// reading because concurrent writers are safe at the LSM layer; only an
/// exclusive admin operation needs to fence everyone.
pub struct ServerState {
    pub commands: CommandTable,
    pub store: Store,
    pub g_lock: RwLock<()>,
    pub readonly: bool,
    pub auth_tokens: Mutex<Vec<String>>,
    pub ip_filter: Mutex<crate::commands::admin::IpFilter>,
    pub quit: AtomicBool,
}

impl ServerState {
    pub fn new(config: &Config, store: Store) -> Self {
        ServerState {
            commands: build_command_table(),
            store,
            g_lock: RwLock::new(()),
            readonly: config.readonly,
            auth_tokens: Mutex::new(config.auth.clone()),
            ip_filter: Mutex::new(crate::commands::admin::IpFilter::new(
                config.allow.clone(),
                config.deny.clone(),
            )),
            quit: AtomicBool::new(false),
        }
    }

    pub fn auth_required(&self) -> bool {
        !self.auth_tokens.lock().unwrap().is_empty()
    }

    pub fn check_auth(&self, token: &[u8]) -> bool {
        self.auth_tokens
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.as_bytes() == token)
    }

    pub fn is_quitting(&self) -> bool {
        self.quit.load(Ordering::Acquire)
    }

    pub fn request_quit(&self) {
        self.quit.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub fn new_for_test(data_dir: &std::path::Path) -> Self {
        let store = Store::open(data_dir, true, 1000).expect("open test store");
        ServerState {
            commands: build_command_table(),
            store,
            g_lock: RwLock::new(()),
            readonly: false,
            auth_tokens: Mutex::new(Vec::new()),
            ip_filter: Mutex::new(crate::commands::admin::IpFilter::new(Vec::new(), Vec::new())),
            quit: AtomicBool::new(false),
        }
    }
}
