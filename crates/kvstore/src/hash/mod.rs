//! Packed-hash data type: a `FieldCodec`-parameterized view over the flat
//! `(field_code, value)` blob stored per hash key.

pub mod codec;
pub mod merge;

pub use codec::{ChessMoveCodec, FieldCodec, TOMBSTONE};
pub use merge::{filter_decision, rocksdb_full_merge, rocksdb_partial_merge};

use crate::error::{Error, Result};
use merge::{entries, Entry};

/// Look up one field's value inside an already-fetched packed-hash blob
///. `Ok(None)` distinguishes "field not
/// present" from a malformed blob, which is a storage-layer `Error`.
pub fn get_value(codec: &dyn FieldCodec, blob: &[u8], field: &[u8]) -> Result<Option<i16>> {
    let Some(code) = codec.encode(field) else {
        return Err(Error::FieldOutOfDomain);
    };
    let es = entries(blob).ok_or(Error::Protocol("corrupt packed-hash value".into()))?;
    Ok(es.into_iter().find(|e| e.field_code == code && e.is_live()).map(|e| e.value))
}

/// Decode every live entry in a packed-hash blob back into (field, value)
/// pairs , skipping entries the codec
/// can't represent (matches the original's `decode_hash_value` returning
/// `-1` being treated as "skip").
pub fn get_values(codec: &dyn FieldCodec, blob: &[u8]) -> Result<Vec<(Vec<u8>, i16)>> {
    let es = entries(blob).ok_or(Error::Protocol("corrupt packed-hash value".into()))?;
    Ok(es
        .into_iter()
        .filter(Entry::is_live)
        .filter_map(|e| codec.decode(e.field_code).map(|field| (field, e.value)))
        .collect())
}

/// Count live entries.
pub fn value_count(blob: &[u8]) -> Result<usize> {
    let es = entries(blob).ok_or(Error::Protocol("corrupt packed-hash value".into()))?;
    Ok(es.iter().filter(|e| e.is_live()).count())
}

/// Encode a single (field, value) merge operand — the payload written by
/// `hset`/`hdel`/`hincr` and fed through RocksDB's merge operator rather
/// than a read-modify-write.
pub fn encode_operand(codec: &dyn FieldCodec, field: &[u8], value: i16) -> Result<Vec<u8>> {
    let code = codec.encode(field).ok_or(Error::FieldOutOfDomain)?;
    let mut buf = Vec::with_capacity(4);
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&value.to_le_bytes());
    Ok(buf)
}

/// Encode a field's deletion as a tombstone operand.
pub fn encode_tombstone(codec: &dyn FieldCodec, field: &[u8]) -> Result<Vec<u8>> {
    encode_operand(codec, field, TOMBSTONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_value_after_encode_operand_round_trips() {
        let codec = ChessMoveCodec;
        let op = encode_operand(&codec, b"e2e4", 7).unwrap();
        assert_eq!(get_value(&codec, &op, b"e2e4").unwrap(), Some(7));
    }

    #[test]
    fn tombstoned_field_is_not_live() {
        let codec = ChessMoveCodec;
        let op = encode_tombstone(&codec, b"e2e4").unwrap();
        assert_eq!(get_value(&codec, &op, b"e2e4").unwrap(), None);
        assert_eq!(value_count(&op).unwrap(), 0);
    }

    #[test]
    fn field_outside_codec_domain_is_rejected() {
        let codec = ChessMoveCodec;
        assert!(matches!(
            encode_operand(&codec, b"not-a-move", 1),
            Err(Error::FieldOutOfDomain)
        ));
    }
}
