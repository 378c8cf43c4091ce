//! Storage engine: a thin wrapper over `rocksdb::DB` with the packed-hash
//! merge operator and compaction filter registered on the default column
//! family, and a dedicated binlog column family.

use crate::binlog::{BinlogQueue, RecordType, Transaction};
use crate::error::Result;
use crate::hash::{rocksdb_full_merge, rocksdb_partial_merge, ChessMoveCodec, FieldCodec};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_CF: &str = "default";
pub const BINLOG_CF: &str = "binlog";

/// Tag byte for a TTL side-key, kept in the same default CF as the value
/// it shadows (`expire`/`ttl`). The kept slice of the original's KV layer
/// (`t_kv.h`) wasn't retrieved into this pack, so this scheme is this
/// crate's own: an 8-byte big-endian unix-seconds deadline stored under
/// `TTL_PREFIX || key`, checked lazily on `get`/`exists` the way a
/// metadata-row TTL marker works in other SSDB-family stores.
pub(crate) const TTL_PREFIX: u8 = 0x02;

fn ttl_key(key: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(key.len() + 1);
    k.push(TTL_PREFIX);
    k.extend_from_slice(key);
    k
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn chess_compaction_filter(_level: u32, _key: &[u8], value: &[u8]) -> rocksdb::compaction_filter::Decision {
    crate::hash::filter_decision(value)
}

/// Open (creating if absent) the RocksDB instance backing the store, with
/// the merge operator and compaction filter wired onto the `default` CF.
fn open_db(data_dir: &Path) -> Result<DB> {
    let mut default_opts = Options::default();
    default_opts.create_if_missing(true);
    default_opts.create_missing_column_families(true);
    default_opts.set_merge_operator("packed_hash_merge", rocksdb_full_merge, rocksdb_partial_merge);
    default_opts.set_compaction_filter("packed_hash_filter", chess_compaction_filter);

    let mut binlog_opts = Options::default();
    binlog_opts.create_if_missing(true);

    let mut db_opts = Options::default();
    db_opts.create_if_missing(true);
    db_opts.create_missing_column_families(true);

    let cfs = vec![
        ColumnFamilyDescriptor::new(DEFAULT_CF, default_opts),
        ColumnFamilyDescriptor::new(BINLOG_CF, binlog_opts),
    ];
    Ok(DB::open_cf_descriptors(&db_opts, data_dir, cfs)?)
}

/// Everything a command handler needs to read or mutate storage: the
/// database handle, the binlog, and the field codec.
pub struct Store {
    db: DB,
    binlog: Arc<BinlogQueue>,
    codec: Box<dyn FieldCodec>,
}

impl Store {
    pub fn open(data_dir: &Path, binlog_enabled: bool, binlog_capacity: u64) -> Result<Self> {
        let db = open_db(data_dir)?;
        Ok(Store {
            db,
            binlog: BinlogQueue::new(binlog_enabled, binlog_capacity),
            codec: Box::new(ChessMoveCodec),
        })
    }

    pub fn codec(&self) -> &dyn FieldCodec {
        self.codec.as_ref()
    }

    fn default_cf(&self) -> &rocksdb::ColumnFamily {
        self.db.cf_handle(DEFAULT_CF).expect("default column family always exists")
    }

    fn binlog_cf(&self) -> &rocksdb::ColumnFamily {
        self.db.cf_handle(BINLOG_CF).expect("binlog column family always exists")
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.is_expired(key)? {
            return Ok(None);
        }
        Ok(self.db.get_cf(self.default_cf(), key)?)
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        if self.is_expired(key)? {
            return Ok(false);
        }
        Ok(self.db.get_cf(self.default_cf(), key)?.is_some())
    }

    fn is_expired(&self, key: &[u8]) -> Result<bool> {
        let Some(raw) = self.db.get_cf(self.default_cf(), ttl_key(key))? else {
            return Ok(false);
        };
        let deadline = i64::from_be_bytes(raw.as_slice().try_into().unwrap_or([0; 8]));
        if now_secs() >= deadline {
            let mut txn = self.binlog.begin();
            txn.delete(self.default_cf(), key);
            txn.delete(self.default_cf(), &ttl_key(key));
            txn.add_log(self.binlog_cf(), RecordType::Delete, b'x', key);
            txn.commit(&self.db)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Set (or clear, with `secs <= 0`) a TTL on `key`.
    /// Returns `false` if the key doesn't currently exist.
    pub fn expire(&self, key: &[u8], secs: i64) -> Result<bool> {
        if !self.exists(key)? {
            return Ok(false);
        }
        let mut txn = self.binlog.begin();
        if secs <= 0 {
            txn.delete(self.default_cf(), &ttl_key(key));
        } else {
            txn.put(self.default_cf(), &ttl_key(key), &(now_secs() + secs).to_be_bytes());
        }
        txn.add_log(self.binlog_cf(), RecordType::Write, b'e', key);
        txn.commit(&self.db)?;
        Ok(true)
    }

    /// Seconds remaining before `key` expires: `-2` if the key doesn't
    /// exist, `-1` if it exists with no TTL set.
    pub fn ttl(&self, key: &[u8]) -> Result<i64> {
        if !self.exists(key)? {
            return Ok(-2);
        }
        let Some(raw) = self.db.get_cf(self.default_cf(), ttl_key(key))? else {
            return Ok(-1);
        };
        let deadline = i64::from_be_bytes(raw.as_slice().try_into().unwrap_or([0; 8]));
        Ok((deadline - now_secs()).max(0))
    }

    /// Plain key/value write, binlogged as `RecordType::Write`.
    pub fn set(&self, key: &[u8], value: &[u8], cmd: u8) -> Result<()> {
        let mut txn = self.binlog.begin();
        txn.put(self.default_cf(), key, value);
        txn.delete(self.default_cf(), &ttl_key(key));
        txn.add_log(self.binlog_cf(), RecordType::Write, cmd, key);
        txn.commit(&self.db)
    }

    pub fn delete(&self, key: &[u8], cmd: u8) -> Result<()> {
        let mut txn = self.binlog.begin();
        txn.delete(self.default_cf(), key);
        txn.add_log(self.binlog_cf(), RecordType::Delete, cmd, key);
        txn.commit(&self.db)
    }

    /// Apply a packed-hash merge operand, binlogged as `RecordType::Merge`.
    pub fn merge(&self, key: &[u8], operand: &[u8], cmd: u8) -> Result<()> {
        let mut txn = self.binlog.begin();
        txn.merge(self.default_cf(), key, operand);
        txn.add_log(self.binlog_cf(), RecordType::Merge, cmd, key);
        txn.commit(&self.db)
    }

    pub fn binlog(&self) -> &Arc<BinlogQueue> {
        &self.binlog
    }

    pub fn binlog_cf_handle(&self) -> &rocksdb::ColumnFamily {
        self.binlog_cf()
    }

    pub fn db(&self) -> &DB {
        &self.db
    }

    /// Iterate keys with `prefix` ; a plain
    /// forward scan since the default CF has no key-range partitioning.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mode = rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.default_cf(), mode) {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(key.to_vec());
        }
        Ok(out)
    }

    /// `flushdb`/`compact`.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    pub fn compact(&self) -> Result<()> {
        self.db.compact_range_cf(self.default_cf(), None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }

    pub fn clear_binlog(&self) -> Result<()> {
        self.binlog.reclaim(&self.db, self.binlog_cf())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("min_seq", &self.binlog.min_seq()).field("max_seq", &self.binlog.max_seq()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), true, 1000).unwrap();
        (store, dir)
    }

    #[test]
    fn set_then_get_round_trips() {
        let (store, _dir) = open_tmp();
        store.set(b"k", b"v", b's').unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn merge_operand_is_visible_through_get() {
        let (store, _dir) = open_tmp();
        let codec = ChessMoveCodec;
        let operand = crate::hash::encode_operand(&codec, b"e2e4", 5).unwrap();
        store.merge(b"hash-key", &operand, b'h').unwrap();
        let blob = store.get(b"hash-key").unwrap().unwrap();
        assert_eq!(crate::hash::get_value(&codec, &blob, b"e2e4").unwrap(), Some(5));
    }

    #[test]
    fn delete_removes_the_key() {
        let (store, _dir) = open_tmp();
        store.set(b"k", b"v", b's').unwrap();
        store.delete(b"k", b'd').unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn scan_prefix_returns_matching_keys_only() {
        let (store, _dir) = open_tmp();
        store.set(b"a:1", b"x", b's').unwrap();
        store.set(b"a:2", b"x", b's').unwrap();
        store.set(b"b:1", b"x", b's').unwrap();
        let keys = store.scan_prefix(b"a:").unwrap();
        assert_eq!(keys, vec![b"a:1".to_vec(), b"a:2".to_vec()]);
    }
}
