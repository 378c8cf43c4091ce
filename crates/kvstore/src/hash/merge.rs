//! Packed-hash value shape plus the merge operator and compaction filter
//! that give it its semantics.
//!
//! A packed-hash value is a flat concatenation of `(i16 field_code, i16
//! value)` pairs, little-endian, four bytes per entry — ported from
//! `examples/original_source/src/ssdb/t_hash.h`'s `get_hash_bytes` /
//! `get_hash_value(s)` and the merge/filter pair in `chess_merge.h` /
//! `chess_filter.h`.

use super::codec::TOMBSTONE;
use byteorder::{ByteOrder, LittleEndian};
use rocksdb::compaction_filter::Decision as CompactionDecision;
use rocksdb::merge_operator::MergeOperands;

const ENTRY_LEN: usize = 4; // 2 bytes field code + 2 bytes value

/// A borrowed (field_code, value) entry inside a packed-hash blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub field_code: i16,
    pub value: i16,
}

impl Entry {
    pub fn is_tombstone(&self) -> bool {
        self.value == TOMBSTONE
    }

    /// A field code of zero never denotes a live entry in this scheme
    /// , matching the compaction filter's `== 0` check.
    pub fn is_live(&self) -> bool {
        self.field_code != 0 && !self.is_tombstone()
    }
}

/// Split a packed-hash blob into its entries. Returns `None` if `blob`'s
/// length isn't a multiple of the entry size (malformed value).
pub fn entries(blob: &[u8]) -> Option<Vec<Entry>> {
    if blob.is_empty() || blob.len() % ENTRY_LEN != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(ENTRY_LEN)
            .map(|chunk| Entry {
                field_code: LittleEndian::read_i16(&chunk[0..2]),
                value: LittleEndian::read_i16(&chunk[2..4]),
            })
            .collect(),
    )
}

fn write_entries(entries: &[Entry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * ENTRY_LEN);
    for e in entries {
        let mut buf = [0u8; ENTRY_LEN];
        LittleEndian::write_i16(&mut buf[0..2], e.field_code);
        LittleEndian::write_i16(&mut buf[2..4], e.value);
        out.extend_from_slice(&buf);
    }
    out
}

/// Merge a sequence of blobs, oldest first, keeping the first occurrence
/// of each field code encountered scanning newest-to-oldest. Dead entries are NOT
/// filtered here — callers decide (full merge drops them, partial merge
/// keeps them so a later full merge still observes the tombstone).
fn newest_first_union(blobs_oldest_first: &[Vec<u8>]) -> Vec<Entry> {
    let mut seen: Vec<Entry> = Vec::new();
    let mut seen_codes = std::collections::HashSet::new();
    for blob in blobs_oldest_first.iter().rev() {
        let Some(es) = entries(blob) else { continue };
        for e in es {
            if seen_codes.insert(e.field_code) {
                seen.push(e);
            }
        }
    }
    seen
}

/// Full merge: fold the existing value and
/// every operand into one blob, newest-occurrence-wins, dropping dead
/// entries from the result.
pub fn merge_blobs_full(existing_value: Option<&[u8]>, operands_oldest_first: &[Vec<u8>]) -> Vec<u8> {
    let mut blobs: Vec<Vec<u8>> = Vec::with_capacity(operands_oldest_first.len() + 1);
    if let Some(existing) = existing_value {
        if !existing.is_empty() {
            blobs.push(existing.to_vec());
        }
    }
    blobs.extend(operands_oldest_first.iter().cloned());
    let merged = newest_first_union(&blobs);
    let live: Vec<Entry> = merged.into_iter().filter(|e| !e.is_tombstone()).collect();
    write_entries(&live)
}

/// Partial merge: combine two adjacent
/// operands (`left` older than `right`) into one, preserving tombstones so
/// a later full merge still sees the deletion.
pub fn merge_blobs_partial(left: &[u8], right: &[u8]) -> Vec<u8> {
    let merged = newest_first_union(&[left.to_vec(), right.to_vec()]);
    write_entries(&merged)
}

/// Compaction filter decision for a packed-hash value: a value with no live entry is dropped entirely.
pub fn filter_decision(value: &[u8]) -> CompactionDecision {
    match entries(value) {
        None => CompactionDecision::Remove,
        Some(es) => {
            if es.iter().any(Entry::is_live) {
                CompactionDecision::Keep
            } else {
                CompactionDecision::Remove
            }
        }
    }
}

/// Adapter matching `rocksdb::Options::set_merge_operator`'s full-merge
/// callback shape; delegates to `merge_blobs_full`. Registered in
/// `store.rs`.
pub fn rocksdb_full_merge(
    _key: &[u8],
    existing_value: Option<&[u8]>,
    operands: &MergeOperands,
) -> Option<Vec<u8>> {
    let ops: Vec<Vec<u8>> = operands.into_iter().map(|op| op.to_vec()).collect();
    Some(merge_blobs_full(existing_value, &ops))
}

/// Adapter matching `rocksdb::Options::set_merge_operator`'s partial-merge
/// callback shape. RocksDB may present more than two operands at once;
/// fold them left-to-right through `merge_blobs_partial`, which preserves
/// the same newest-occurrence-wins, tombstone-preserving semantics as the
/// pairwise original.
pub fn rocksdb_partial_merge(
    _key: &[u8],
    _existing_value: Option<&[u8]>,
    operands: &MergeOperands,
) -> Option<Vec<u8>> {
    let mut iter = operands.into_iter();
    let mut acc = iter.next()?.to_vec();
    for op in iter {
        acc = merge_blobs_partial(&acc, op);
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(pairs: &[(i16, i16)]) -> Vec<u8> {
        write_entries(
            &pairs
                .iter()
                .map(|&(f, v)| Entry { field_code: f, value: v })
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn newest_occurrence_wins_on_full_merge() {
        let old = blob(&[(1, 10), (2, 20)]);
        let newer = blob(&[(1, 99)]);
        let merged = merge_blobs_full(Some(&old), &[newer]);
        let es = entries(&merged).unwrap();
        assert_eq!(es.iter().find(|e| e.field_code == 1).unwrap().value, 99);
        assert_eq!(es.iter().find(|e| e.field_code == 2).unwrap().value, 20);
    }

    #[test]
    fn tombstones_are_dropped_by_full_merge() {
        let old = blob(&[(1, 10)]);
        let del = blob(&[(1, TOMBSTONE)]);
        let merged = merge_blobs_full(Some(&old), &[del]);
        assert!(entries(&merged).unwrap().is_empty());
    }

    #[test]
    fn full_merge_with_no_existing_value_just_folds_operands() {
        let a = blob(&[(1, 1)]);
        let b = blob(&[(2, 2)]);
        let merged = merge_blobs_full(None, &[a, b]);
        let es = entries(&merged).unwrap();
        assert_eq!(es.len(), 2);
    }

    #[test]
    fn partial_merge_preserves_tombstones() {
        let left = blob(&[(1, 10)]);
        let right = blob(&[(1, TOMBSTONE)]);
        let merged = merge_blobs_partial(&left, &right);
        let es = entries(&merged).unwrap();
        assert_eq!(es.len(), 1);
        assert!(es[0].is_tombstone());
    }

    #[test]
    fn partial_merge_right_is_newer() {
        let left = blob(&[(1, 10), (2, 20)]);
        let right = blob(&[(2, 99)]);
        let merged = merge_blobs_partial(&left, &right);
        let es = entries(&merged).unwrap();
        assert_eq!(es.iter().find(|e| e.field_code == 2).unwrap().value, 99);
        assert_eq!(es.iter().find(|e| e.field_code == 1).unwrap().value, 10);
    }

    #[test]
    fn compaction_filter_drops_all_dead_values() {
        let all_dead = blob(&[(0, 5), (3, TOMBSTONE)]);
        assert!(matches!(filter_decision(&all_dead), CompactionDecision::Remove));
        let has_live = blob(&[(0, 5), (3, 7)]);
        assert!(matches!(filter_decision(&has_live), CompactionDecision::Keep));
    }

    #[test]
    fn malformed_blob_length_is_removed() {
        assert!(matches!(filter_decision(&[1, 2, 3]), CompactionDecision::Remove));
    }
}
