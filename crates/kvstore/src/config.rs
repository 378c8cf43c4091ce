//! Server configuration: a hand-rolled loader for the familiar
//! `ip:port {... }`-nested config file format,
//! plus a `clap`-derived CLI surface that can override it. The CLI half
//! follows `crates/config-encryption/src/main.rs`'s `#[clap(long, env,
//! default_value =...)]` pattern; the file-parsing half is hand-written —
//! no external config crate, since the file format is neither INI, TOML,
//! nor YAML.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Everything the server needs at startup, whether it came from a config
/// file, a CLI flag, or a built-in default.
#[derive(Debug, Clone)]
pub struct Config {
    pub ip: String,
    pub port: u16,
    pub readonly: bool,
    pub sock_path: Option<PathBuf>,
    pub auth: Vec<String>,
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub worker_threads: usize,
    pub event_loop_threads: usize,
    pub binlog_capacity: u64,
    pub data_dir: PathBuf,
    /// `host:port` addresses this instance should replicate from as a
    /// `sync140` follower.
    pub replicate_from: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ip: "127.0.0.1".to_string(),
            port: 8888,
            readonly: false,
            sock_path: None,
            auth: Vec::new(),
            allow: Vec::new(),
            deny: Vec::new(),
            worker_threads: 4,
            event_loop_threads: 2,
            binlog_capacity: 10_000_000,
            data_dir: PathBuf::from("./data"),
            replicate_from: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a `server.*`-keyed config file: one `key = value` assignment per line,
    /// blank lines and `#`-prefixed comments ignored, a key repeated
    /// across multiple lines accumulating into a list field.
    pub fn load(path: &std::path::Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        let mut cfg = Config::default();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::Protocol(format!("config line {}: missing '='", lineno + 1)));
            };
            let key = key.trim();
            let value = value.trim();
            apply_entry(&mut cfg, key, value)?;
        }
        validate_auth(&cfg.auth)?;
        Ok(cfg)
    }
}

fn apply_entry(cfg: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "server.ip" => cfg.ip = value.to_string(),
        "server.port" => cfg.port = value.parse().map_err(|_| Error::Protocol(format!("bad port: {value}")))?,
        "server.readonly" => cfg.readonly = matches!(value, "yes" | "true" | "1"),
        "server.sock" => cfg.sock_path = Some(PathBuf::from(value)),
        "server.auth" => cfg.auth.push(value.to_string()),
        "server.allow" => cfg.allow.push(value.to_string()),
        "server.deny" => cfg.deny.push(value.to_string()),
        "server.worker_threads" => {
            cfg.worker_threads = value.parse().map_err(|_| Error::Protocol(format!("bad worker_threads: {value}")))?
        }
        "server.event_loop_threads" => {
            cfg.event_loop_threads = value.parse().map_err(|_| Error::Protocol(format!("bad event_loop_threads: {value}")))?
        }
        "replication.binlog.capacity" => {
            cfg.binlog_capacity = value.parse().map_err(|_| Error::Protocol(format!("bad binlog capacity: {value}")))?
        }
        "server.data_dir" => cfg.data_dir = PathBuf::from(value),
        "replication.sync_from" => cfg.replicate_from.push(value.to_string()),
        other => return Err(Error::Protocol(format!("unknown config key: {other}"))),
    }
    Ok(())
}

/// Refuse to start with a weak auth token: shorter than 32
/// bytes, or the original's literal placeholder default.
fn validate_auth(tokens: &[String]) -> Result<()> {
    for token in tokens {
        if token.len() < 32 || token == "very-strong-password" {
            return Err(Error::Protocol(format!(
                "server.auth entry is too weak (must be >= 32 bytes and not the default placeholder): {token}"
            )));
        }
    }
    Ok(())
}

/// CLI surface: a config file path plus overrides for the
/// handful of flags worth setting without editing the file.
#[derive(Debug, clap::Parser)]
#[command(name = "kvstore-server", about = "Networked key-value server", version)]
pub struct Cli {
    /// Path to a `server.*`-keyed config file.
    #[arg(long, env = "KVSTORE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "KVSTORE_IP")]
    pub ip: Option<String>,

    #[arg(long, env = "KVSTORE_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "KVSTORE_READONLY")]
    pub readonly: bool,

    #[arg(long, env = "KVSTORE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl Cli {
    /// Merge a loaded (or default) `Config` with CLI overrides, the flags
    /// taking precedence.
    pub fn apply_overrides(&self, mut cfg: Config) -> Result<Config> {
        if let Some(ip) = &self.ip {
            cfg.ip = ip.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if self.readonly {
            cfg.readonly = true;
        }
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        validate_auth(&cfg.auth)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_flat_key_value_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kvstore.conf");
        std::fs::write(
            &path,
            "# comment\nserver.ip = 0.0.0.0\nserver.port = 9999\nserver.allow = 10.0.0.1\nserver.allow = 10.0.0.2\n",
        )
        .unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.ip, "0.0.0.0");
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.allow, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn rejects_weak_auth_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kvstore.conf");
        std::fs::write(&path, "server.auth = short\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn accepts_sufficiently_long_auth_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kvstore.conf");
        let token = "a".repeat(32);
        std::fs::write(&path, format!("server.auth = {token}\n")).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.auth, vec![token]);
    }
}
