//! Replication stream: `dump` and `sync140` hand a connection off to a
//! dedicated backend thread that streams native-framed
//! `begin`/`set`/`end` frames. Grounded
//! in `examples/original_source/src/ssdb/binlog.h`'s `find_next`/iteration
//! model; `SYNCLOG`-tagged internal keys are filtered the way the
//! original's dumper skips its own binlog column family's keys.

use crate::server_state::ServerState;
use std::io::Write;
use std::net::TcpStream as StdTcpStream;
use std::sync::Arc;

fn write_record(out: &mut impl Write, field: &[u8]) -> std::io::Result<()> {
    write!(out, "{}\n", field.len())?;
    out.write_all(field)?;
    out.write_all(b"\n")
}

fn write_frame(out: &mut impl Write, fields: &[&[u8]]) -> std::io::Result<()> {
    for f in fields {
        write_record(out, f)?;
    }
    out.write_all(b"\n")
}

/// Stream a full snapshot of the default column family to `stream`
/// , skipping internal binlog keys. Runs on a dedicated
/// thread so the event loop is never blocked by a slow or stalled
/// follower.
pub fn spawn_dump(state: Arc<ServerState>, mut stream: StdTcpStream) {
    std::thread::spawn(move || {
        let _ = write_frame(&mut stream, &[b"begin"]);
        let store = &state.store;
        let db = store.db();
        let cf = db.cf_handle(crate::store::DEFAULT_CF).expect("default cf");
        for item in db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let Ok((key, value)) = item else { break };
            if write_frame(&mut stream, &[b"set", &key, &value]).is_err() {
                return;
            }
        }
        let _ = write_frame(&mut stream, &[b"end"]);
    });
}

/// Stream binlog records from `seq` onward. Exits once no further record is
/// available rather than tailing forever, matching a bounded `dump`-style
/// backend task; continuous tailing would require a change-notification
/// mechanism the original's condition-variable-signaled `last_seq` bump
/// provides and this crate doesn't yet wire up end-to-end.
pub fn spawn_sync(state: Arc<ServerState>, mut stream: StdTcpStream, mut seq: u64) {
    std::thread::spawn(move || {
        let _ = write_frame(&mut stream, &[b"begin"]);
        let store = &state.store;
        let binlog_cf = store.binlog_cf_handle();
        loop {
            match store.binlog().find_next(store.db(), binlog_cf, seq) {
                Ok(Some(record)) => {
                    if let Ok(Some(value)) = store.get(&record.key) {
                        if write_frame(&mut stream, &[b"set", &record.key, &value]).is_err() {
                            return;
                        }
                    }
                    seq = record.seq + 1;
                }
                _ => break,
            }
        }
        let _ = write_frame(&mut stream, &[b"end"]);
    });
}
