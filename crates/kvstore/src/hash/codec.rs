//! Pluggable field codec: encodes an
//! application-level field name to the packed `i16` key used inside a
//! packed-hash value, and decodes it back. `ChessMoveCodec` is the one
//! concrete implementation, a direct port of
//! `examples/original_source/src/ssdb/t_hash.h`'s `encode_hash_key` /
//! `decode_hash_value` square tables. The merge operator (`merge.rs`)
//! depends only on the trait, not on chess.

/// Sentinel field-value marking a tombstone.
pub const TOMBSTONE: i16 = 0x7FFF;

/// Encodes/decodes the field half of a packed-hash (field, value) pair.
/// `value` itself is always a plain `i16` and needs no codec.
pub trait FieldCodec: Send + Sync {
    /// Encode a field name into its packed `i16` key. Returns `None` if
    /// `field` is outside this codec's domain.
    fn encode(&self, field: &[u8]) -> Option<i16>;

    /// Decode a packed `i16` key back into a field name. Returns `None` if
    /// `code` cannot be represented (not expected in practice, since every
    /// code a `ChessMoveCodec` instance produces round-trips).
    fn decode(&self, code: i16) -> Option<Vec<u8>>;
}

const SQ_FILE: [u8; 90] = *b"abcdefghiabcdefghiabcdefghiabcdefghiabcdefghiabcdefghiabcdefghiabcdefghiabcdefghiabcdefghi";
const SQ_RANK: [u8; 90] = *b"000000000111111111222222222333333333444444444555555555666666666777777777888888888999999999";

/// Encodes 4-5 character algebraic chess moves (`"e2e4"`, `"e7e8q"`) the way
/// the original's chess-specific packed-hash domain did.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChessMoveCodec;

impl FieldCodec for ChessMoveCodec {
    fn encode(&self, field: &[u8]) -> Option<i16> {
        if field.len() != 4 && field.len() != 5 {
            return None;
        }
        let src_file = field[0].checked_sub(b'a')? as i16;
        let src_rank = field[1].checked_sub(b'0')? as i16;
        let dst_file = field[2].checked_sub(b'a')? as i16;
        let mut dst_rank = field[3].checked_sub(b'0')? as i16;
        let mut promotion = 0i16;
        if field.len() == 5 {
            dst_rank = match field[4] {
                b'q' => 0,
                b'r' => 1,
                b'b' => 2,
                b'n' => 3,
                _ => return None,
            };
            promotion = 0x80;
        }
        let src = (src_rank << 3) + src_rank + src_file;
        let dst = (dst_rank << 3) + dst_rank + dst_file + promotion;
        Some((src << 8) + dst)
    }

    fn decode(&self, code: i16) -> Option<Vec<u8>> {
        let src = ((code as u16) >> 8) as usize;
        let dst = (code as u16 & 0x7F) as usize;
        let promoted = code & 0x80 != 0;
        let mut out = Vec::with_capacity(5);
        out.push(SQ_FILE[src]);
        out.push(SQ_RANK[src]);
        out.push(SQ_FILE[dst]);
        if promoted {
            out.push(match SQ_RANK[src] {
                b'7' => b'8',
                b'2' => b'1',
                _ => return None,
            });
            out.push(match SQ_RANK[dst] {
                b'0' => b'q',
                b'1' => b'r',
                b'2' => b'b',
                b'3' => b'n',
                _ => return None,
            });
        } else {
            out.push(SQ_RANK[dst]);
        }
        Some(out)
    }
}
