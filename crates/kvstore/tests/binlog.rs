//! Cross-module binlog properties through the real `Store` (not the bare
//! `BinlogQueue` the unit tests in `src/binlog.rs` exercise): sequence
//! allocation across mixed write/merge/delete ops, `find_next` resume, and
//! capacity-bounded reclamation.

use kvstore::binlog::RecordType;
use kvstore::hash::{encode_operand, ChessMoveCodec};
use kvstore::store::Store;

fn open_tmp(capacity: u64) -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path(), true, capacity).unwrap();
    (store, dir)
}

#[test]
fn sequence_numbers_are_dense_and_monotonic_across_mixed_operations() {
    let (store, _dir) = open_tmp(1000);

    store.set(b"a", b"1", b's').unwrap();
    let operand = encode_operand(&ChessMoveCodec, b"e2e4", 1).unwrap();
    store.merge(b"h", &operand, b'h').unwrap();
    store.delete(b"a", b'd').unwrap();

    assert_eq!(store.binlog().max_seq(), 3);
}

#[test]
fn find_next_resumes_from_a_given_sequence_in_order() {
    let (store, _dir) = open_tmp(1000);
    for i in 0..5 {
        store.set(format!("k{i}").as_bytes(), b"v", b's').unwrap();
    }

    let record = store
        .binlog()
        .find_next(store.db(), store.binlog_cf_handle(), 3)
        .unwrap()
        .expect("a record at or after seq 3 should exist");
    assert_eq!(record.seq, 3);
    assert_eq!(record.record_type, RecordType::Write);
    assert_eq!(record.key, b"k2");
}

#[test]
fn find_next_past_the_last_sequence_returns_none() {
    let (store, _dir) = open_tmp(1000);
    store.set(b"only", b"v", b's').unwrap();
    let record = store.binlog().find_next(store.db(), store.binlog_cf_handle(), 1000).unwrap();
    assert!(record.is_none());
}

#[test]
fn reclaim_deletes_records_older_than_capacity_but_keeps_recent_ones() {
    let (store, _dir) = open_tmp(5);
    for i in 0..20 {
        store.set(format!("k{i}").as_bytes(), b"v", b's').unwrap();
    }
    assert_eq!(store.binlog().min_seq(), 1);

    store.clear_binlog().unwrap();

    // Capacity 5, last_seq 20 -> everything below floor 15 is reclaimed.
    assert_eq!(store.binlog().min_seq(), 15);
    let oldest = store
        .binlog()
        .find_next(store.db(), store.binlog_cf_handle(), 0)
        .unwrap()
        .expect("at least one record should remain");
    assert_eq!(oldest.seq, 15);
}

#[test]
fn reclaim_is_a_no_op_below_capacity() {
    let (store, _dir) = open_tmp(1000);
    for i in 0..10 {
        store.set(format!("k{i}").as_bytes(), b"v", b's').unwrap();
    }
    store.clear_binlog().unwrap();
    assert_eq!(store.binlog().min_seq(), 1);
}
