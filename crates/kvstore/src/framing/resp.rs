//! Inline Redis RESP dialect. A direct translation of
//! `examples/original_source/src/net/link_redis.cpp`'s command table and
//! `parse_req`/`send_resp` into idiomatic Rust: a static translation table
//! keyed by the lowercased Redis command name, a `Strategy` enum selecting
//! how arguments are rewritten, and a `ReplyType` selecting how the native
//! response is re-encoded.

use super::{Field, Framer, OwnedRequest, ParseOutcome, Request, Response, Status};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyType {
    Bulk,
    MultiBulk,
    Int,
    StatusReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Passthrough: only the command name changes; arguments keep their
    /// byte-slice identity (safe because the connection is pipeline-serial
    /// while a request is in flight — `link_redis.cpp::convert_req`).
    Auto,
    Ping,
    MGet,
    HmGet,
    HGetAll,
    HKeys,
    HVals,
    SetEx,
    ZRange,
    ZRevRange,
    ZRangeByScore,
    ZRevRangeByScore,
    ZAdd,
    ZIncrBy,
    RemRangeByRank,
    RemRangeByScore,
}

struct CmdDesc {
    native_cmd: &'static str,
    reply_type: ReplyType,
    strategy: Strategy,
}

macro_rules! cmd {
    ($strategy:expr, $redis:expr, $native:expr, $reply:expr) => {
        (
            $redis,
            CmdDesc {
                native_cmd: $native,
                reply_type: $reply,
                strategy: $strategy,
            },
        )
    };
}

lazy_static::lazy_static! {
    static ref CMD_TABLE: HashMap<&'static str, CmdDesc> = {
        use ReplyType::*;
        use Strategy::*;
        HashMap::from([
            cmd!(Auto, "auth", "auth", StatusReply),
            cmd!(Ping, "ping", "ping", StatusReply),
            cmd!(Auto, "dbsize", "dbsize", Int),

            cmd!(Auto, "get", "get", Bulk),
            cmd!(Auto, "getset", "getset", Bulk),
            cmd!(Auto, "set", "set", StatusReply),
            cmd!(Auto, "setnx", "setnx", Int),
            cmd!(Auto, "exists", "exists", Int),
            cmd!(Auto, "incr", "incr", Int),
            cmd!(Auto, "decr", "decr", Int),
            cmd!(Auto, "ttl", "ttl", Int),
            cmd!(Auto, "expire", "expire", Int),
            cmd!(Auto, "getbit", "getbit", Int),
            cmd!(Auto, "setbit", "setbit", Int),
            cmd!(Auto, "strlen", "strlen", Int),
            cmd!(Auto, "bitcount", "bitcount", Int),
            cmd!(Auto, "substr", "getrange", Bulk),
            cmd!(Auto, "getrange", "getrange", Bulk),
            cmd!(Auto, "keys", "keys", MultiBulk),

            cmd!(Auto, "hset", "hset", Int),
            cmd!(Auto, "hget", "hget", Bulk),
            cmd!(Auto, "hexists", "hexists", Int),

            cmd!(Auto, "del", "multi_del", Int),
            cmd!(Auto, "mset", "multi_set", StatusReply),
            cmd!(Auto, "incrby", "incr", Int),
            cmd!(Auto, "decrby", "decr", Int),

            cmd!(Auto, "hmset", "multi_hset", StatusReply),
            cmd!(Auto, "hdel", "multi_hdel", Int),
            cmd!(Auto, "hmdel", "multi_hdel", Int),
            cmd!(Auto, "hlen", "hsize", Int),
            cmd!(Auto, "hincrby", "hincr", Int),

            cmd!(Auto, "zcard", "zsize", Int),
            cmd!(Auto, "zscore", "zget", Bulk),
            cmd!(Auto, "zrem", "multi_zdel", Int),
            cmd!(Auto, "zrank", "zrank", Int),
            cmd!(Auto, "zrevrank", "zrrank", Int),
            cmd!(Auto, "zcount", "zcount", Int),
            cmd!(RemRangeByRank, "zremrangebyrank", "zremrangebyrank", Int),
            cmd!(RemRangeByScore, "zremrangebyscore", "zremrangebyscore", Int),

            cmd!(MGet, "mget", "multi_get", MultiBulk),
            cmd!(HmGet, "hmget", "multi_hget", MultiBulk),

            cmd!(HGetAll, "hgetall", "hgetall", MultiBulk),
            cmd!(HKeys, "hkeys", "hkeys", MultiBulk),
            cmd!(HVals, "hvals", "hvals", MultiBulk),
            cmd!(SetEx, "setex", "setx", StatusReply),
            cmd!(ZRange, "zrange", "zrange", MultiBulk),
            cmd!(ZRevRange, "zrevrange", "zrrange", MultiBulk),
            cmd!(ZAdd, "zadd", "multi_zset", Int),
            cmd!(ZIncrBy, "zincrby", "zincr", Bulk),
            cmd!(ZRangeByScore, "zrangebyscore", "zscan", MultiBulk),
            cmd!(ZRevRangeByScore, "zrevrangebyscore", "zrscan", MultiBulk),

            cmd!(Auto, "lpush", "qpush_front", Int),
            cmd!(Auto, "rpush", "qpush_back", Int),
            cmd!(Auto, "lpop", "qpop_front", Bulk),
            cmd!(Auto, "rpop", "qpop_back", Bulk),
            cmd!(Auto, "llen", "qsize", Int),
            cmd!(Auto, "lsize", "qsize", Int),
            cmd!(Auto, "lindex", "qget", Bulk),
            cmd!(Auto, "lset", "qset", StatusReply),
            cmd!(Auto, "lrange", "qslice", MultiBulk),
        ])
    };
}

fn to_lower(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_ascii_lowercase()
}

fn adjust_exclusive_bound(raw: &str, widen: bool) -> Option<String> {
    // Integer-score assumption: exclusive bounds
    // on non-integer scores are undefined; any bound that doesn't parse as
    // an integer after stripping '(' is passed through unmodified.
    let inner = &raw[1..];
    let n: i64 = inner.parse().ok()?;
    Some((if widen { n + 1 } else { n - 1 }).to_string())
}

/// Rewrite an `-inf`/`+inf`/plain/`(exclusive` score bound into the native
/// `zscan`/`zrscan` argument form.
fn rewrite_bound(raw: &str, is_lower_bound: bool, reverse: bool) -> String {
    if raw == "-inf" || raw == "+inf" {
        return String::new();
    }
    if let Some(stripped) = raw.strip_prefix('(') {
        let widen = is_lower_bound != reverse;
        if let Some(adjusted) = adjust_exclusive_bound(&format!("({stripped}"), widen) {
            return adjusted;
        }
        return stripped.to_string();
    }
    raw.to_string()
}

#[derive(Default)]
pub struct RespFramer {
    /// The descriptor for the most recently parsed request, used by
    /// `encode` to select the reply shape. `None` for unknown commands.
    last_desc: Option<&'static CmdDesc>,
    /// For strategies that rewrite the request, the rewritten strings and
    /// (for mget/hmget/zrange family) the original request, needed to shape
    /// the reply.
    last_owned_request: Option<Vec<String>>,
}

impl RespFramer {
    pub fn new() -> Self {
        RespFramer::default()
    }

    /// Translate a parsed RESP request (element 0 = original redis command,
    /// still lowercase-folded) into the native command vocabulary.
    /// Returns the translated request and remembers shaping state for the
    /// matching `encode` call.
    fn convert_request(&mut self, mut req: Request<'_>) -> Request<'_> {
        if req.is_empty() {
            self.last_desc = None;
            self.last_owned_request = None;
            return req;
        }
        let cmd = to_lower(req[0].as_bytes());
        let desc = CMD_TABLE.get(cmd.as_str());
        self.last_desc = desc;
        self.last_owned_request = None;

        let Some(desc) = desc else {
            return req;
        };

        use Strategy::*;
        match desc.strategy {
            Auto | Ping => {
                req[0] = Field::Owned(bytes::Bytes::from_static(desc.native_cmd.as_bytes()));
                req
            }
            MGet | HmGet | HGetAll => {
                let mut out = vec![desc.native_cmd.to_string()];
                for f in &req[1..] {
                    out.push(String::from_utf8_lossy(f.as_bytes()).into_owned());
                }
                self.rewrite_from(out)
            }
            HKeys | HVals => {
                let mut out = vec![desc.native_cmd.to_string()];
                if req.len() == 2 {
                    out.push(String::from_utf8_lossy(req[1].as_bytes()).into_owned());
                    out.push(String::new());
                    out.push(String::new());
                    out.push("2000000000".to_string());
                }
                self.rewrite_from(out)
            }
            SetEx => {
                let mut out = vec![desc.native_cmd.to_string()];
                if req.len() == 4 {
                    out.push(String::from_utf8_lossy(req[1].as_bytes()).into_owned());
                    out.push(String::from_utf8_lossy(req[3].as_bytes()).into_owned());
                    out.push(String::from_utf8_lossy(req[2].as_bytes()).into_owned());
                }
                self.rewrite_from(out)
            }
            ZAdd => {
                let mut out = vec![desc.native_cmd.to_string()];
                if req.len() >= 2 {
                    out.push(String::from_utf8_lossy(req[1].as_bytes()).into_owned());
                    let mut i = 2;
                    while i + 1 < req.len() {
                        out.push(String::from_utf8_lossy(req[i + 1].as_bytes()).into_owned());
                        let score: f64 = String::from_utf8_lossy(req[i].as_bytes())
                            .parse()
                            .unwrap_or(0.0);
                        out.push((score as i64).to_string());
                        i += 2;
                    }
                }
                self.rewrite_from(out)
            }
            ZIncrBy => {
                let mut out = vec![desc.native_cmd.to_string()];
                if req.len() == 4 {
                    out.push(String::from_utf8_lossy(req[1].as_bytes()).into_owned());
                    out.push(String::from_utf8_lossy(req[3].as_bytes()).into_owned());
                    out.push(String::from_utf8_lossy(req[2].as_bytes()).into_owned());
                }
                self.rewrite_from(out)
            }
            RemRangeByRank | RemRangeByScore => {
                let mut out = vec![desc.native_cmd.to_string()];
                if req.len() >= 4 {
                    for f in &req[1..4] {
                        out.push(String::from_utf8_lossy(f.as_bytes()).into_owned());
                    }
                }
                self.rewrite_from(out)
            }
            ZRange | ZRevRange => {
                let mut out = vec![desc.native_cmd.to_string()];
                out.push(String::from_utf8_lossy(req[1].as_bytes()).into_owned());
                if req.len() >= 4 {
                    out.push(String::from_utf8_lossy(req[2].as_bytes()).into_owned());
                    out.push(String::from_utf8_lossy(req[3].as_bytes()).into_owned());
                }
                if req.len() >= 5 {
                    out.push(to_lower(req[4].as_bytes()));
                }
                self.rewrite_from(out)
            }
            ZRangeByScore | ZRevRangeByScore => {
                let reverse = desc.strategy == ZRevRangeByScore;
                let mut name = String::new();
                let mut smin = String::new();
                let mut smax = String::new();
                let mut withscores = String::new();
                let mut offset = String::new();
                let mut count = String::new();
                if req.len() >= 4 {
                    name = String::from_utf8_lossy(req[1].as_bytes()).into_owned();
                    smin = String::from_utf8_lossy(req[2].as_bytes()).into_owned();
                    smax = String::from_utf8_lossy(req[3].as_bytes()).into_owned();

                    let mut after_limit = false;
                    let mut i = 4;
                    while i < req.len() {
                        let s = String::from_utf8_lossy(req[i].as_bytes()).into_owned();
                        if after_limit {
                            if offset.is_empty() {
                                offset = s.clone();
                            } else {
                                count = s.clone();
                                after_limit = false;
                            }
                        }
                        let lower = s.to_ascii_lowercase();
                        if lower == "withscores" {
                            withscores = lower;
                        } else if lower == "limit" {
                            after_limit = true;
                        }
                        i += 1;
                    }
                }
                let mut out = vec![desc.native_cmd.to_string()];
                if smin.is_empty() || smax.is_empty() {
                    return self.rewrite_from(out);
                }
                out.push(name);
                out.push(String::new());
                out.push(rewrite_bound(&smin, true, reverse));
                out.push(rewrite_bound(&smax, false, reverse));
                out.push(if offset.is_empty() {
                    "0".to_string()
                } else {
                    offset
                });
                out.push(if count.is_empty() {
                    "2000000000".to_string()
                } else {
                    count
                });
                out.push(withscores);
                self.rewrite_from(out)
            }
        }
    }

    fn rewrite_from(&mut self, owned: Vec<String>) -> Request<'static> {
        let req = owned
            .iter()
            .map(|s| Field::Owned(bytes::Bytes::copy_from_slice(s.as_bytes())))
            .collect();
        self.last_owned_request = Some(owned);
        req
    }

    fn with_scores(&self) -> bool {
        match self.last_desc.map(|d| d.strategy) {
            Some(Strategy::ZRange) | Some(Strategy::ZRevRange) => self
                .last_owned_request
                .as_ref()
                .map(|v| v.len() >= 5 && v[4] == "withscores")
                .unwrap_or(false),
            Some(Strategy::ZRangeByScore) | Some(Strategy::ZRevRangeByScore) => self
                .last_owned_request
                .as_ref()
                .map(|v| v.last().map(|s| s.as_str()) == Some("withscores"))
                .unwrap_or(false),
            _ => true,
        }
    }
}

fn write_bulk(out: &mut Vec<u8>, val: &str) {
    out.extend_from_slice(format!("${}\r\n", val.len()).as_bytes());
    out.extend_from_slice(val.as_bytes());
    out.extend_from_slice(b"\r\n");
}

impl Framer for RespFramer {
    fn try_parse<'a>(&mut self, input: &'a [u8]) -> (ParseOutcome<'a>, usize) {
        match parse_resp_array(input) {
            Ok(Some((req, consumed))) => {
                let req = self.convert_request(req);
                // `convert_request` may have produced owned fields with a
                // lifetime shorter than 'a (they own their bytes, so this
                // is sound regardless of the borrow); re-coerce to 'a.
                let req: Request<'a> = req
                    .into_iter()
                    .map(|f| match f {
                        Field::Owned(b) => Field::Owned(b),
                        Field::Borrowed(b) => Field::Borrowed(b),
                    })
                    .collect();
                (ParseOutcome::Request(req), consumed)
            }
            Ok(None) => (ParseOutcome::NeedMore, 0),
            Err(()) => (ParseOutcome::FatalError, 0),
        }
    }

    fn encode(&mut self, resp: &Response, out: &mut Vec<u8>) {
        if resp.fields.is_empty() {
            return;
        }
        if !resp.is_ok() {
            match resp.status() {
                "error" | "fail" | "client_error" => {
                    out.extend_from_slice(b"-ERR ");
                    if resp.fields.len() >= 2 {
                        out.extend_from_slice(resp.fields[1].as_bytes());
                    }
                    out.extend_from_slice(b"\r\n");
                }
                "not_found" => out.extend_from_slice(b"$-1\r\n"),
                "noauth" => {
                    out.extend_from_slice(b"-NOAUTH ");
                    if resp.fields.len() >= 2 {
                        out.extend_from_slice(resp.fields[1].as_bytes());
                    }
                    out.extend_from_slice(b"\r\n");
                }
                _ => out.extend_from_slice(b"-ERR server error\r\n"),
            }
            return;
        }

        let Some(desc) = self.last_desc else {
            out.extend_from_slice(format!("*{}\r\n", resp.fields.len().saturating_sub(1)).as_bytes());
            for val in &resp.fields[1..] {
                write_bulk(out, val);
            }
            return;
        };

        if desc.strategy == Strategy::Ping {
            out.extend_from_slice(b"+PONG\r\n");
            return;
        }
        match desc.reply_type {
            ReplyType::StatusReply => out.extend_from_slice(b"+OK\r\n"),
            ReplyType::Bulk => {
                if resp.fields.len() >= 2 {
                    write_bulk(out, &resp.fields[1]);
                } else {
                    out.extend_from_slice(b"$0\r\n");
                }
            }
            ReplyType::Int => {
                if resp.fields.len() >= 2 {
                    out.extend_from_slice(b":");
                    out.extend_from_slice(resp.fields[1].as_bytes());
                    out.extend_from_slice(b"\r\n");
                } else {
                    out.extend_from_slice(b"$0\r\n");
                }
            }
            ReplyType::MultiBulk => {
                if desc.strategy == Strategy::MGet || desc.strategy == Strategy::HmGet {
                    self.encode_mget_style(desc, resp, out);
                    return;
                }
                let with_scores = self.with_scores();
                let count = if with_scores {
                    resp.fields.len().saturating_sub(1)
                } else {
                    resp.fields.len().saturating_sub(1) / 2
                };
                out.extend_from_slice(format!("*{count}\r\n").as_bytes());
                let mut i = 1;
                while i < resp.fields.len() {
                    write_bulk(out, &resp.fields[i]);
                    if !with_scores {
                        i += 1;
                    }
                    i += 1;
                }
            }
        }
    }
}

impl RespFramer {
    fn encode_mget_style(&self, desc: &CmdDesc, resp: &Response, out: &mut Vec<u8>) {
        if resp.fields.len() % 2 != 1 {
            out.extend_from_slice(b"*0\r\n");
            return;
        }
        let owned = self.last_owned_request.as_ref();
        let req_start = if desc.strategy == Strategy::MGet { 1 } else { 2 };
        let req_len = owned.map(|v| v.len()).unwrap_or(0);
        out.extend_from_slice(format!("*{}\r\n", req_len.saturating_sub(req_start)).as_bytes());

        let mut resp_idx = 1;
        if let Some(owned) = owned {
            for i in req_start..owned.len() {
                let req_key = &owned[i];
                if resp_idx >= resp.fields.len() {
                    out.extend_from_slice(b"$-1\r\n");
                    continue;
                }
                let resp_key = &resp.fields[resp_idx];
                if req_key != resp_key {
                    out.extend_from_slice(b"$-1\r\n");
                    continue;
                }
                write_bulk(out, &resp.fields[resp_idx + 1]);
                resp_idx += 2;
            }
        }
    }
}

/// Parse a RESP array-of-bulk-strings request. LF-only line endings are
/// tolerated alongside CRLF , matching
/// `link_redis.cpp::parse_req`.
fn parse_resp_array(input: &[u8]) -> Result<Option<(Request<'_>, usize)>, ()> {
    let len = input.len();
    let mut pos = 0usize;

    while pos < len && (input[pos] == b'\n' || input[pos] == b'\r') {
        pos += 1;
    }
    if pos >= len {
        return Ok(None);
    }
    if input[pos] != b'*' {
        return Err(());
    }

    let mut num_args = 0i64;
    let mut fields: Request<'_> = Vec::new();
    let mut have_count = false;

    loop {
        if pos >= len {
            return Ok(None);
        }
        let lf = match input[pos..].iter().position(|&b| b == b'\n') {
            Some(off) => pos + off,
            None => return Ok(None),
        };
        let line = &input[pos..lf];
        let line = if line.last() == Some(&b'\r') {
            &line[..line.len() - 1]
        } else {
            line
        };
        if line.is_empty() || (line[0] != b'*' && line[0] != b'$') {
            return Err(());
        }
        let n: i64 = std::str::from_utf8(&line[1..])
            .map_err(|_| ())?
            .parse()
            .map_err(|_| ())?;
        pos = lf + 1;

        if !have_count {
            if n <= 0 {
                return Err(());
            }
            num_args = n;
            have_count = true;
            continue;
        }

        if n < 0 {
            return Err(());
        }
        let n = n as usize;
        if pos + n > len {
            return Ok(None);
        }
        fields.push(Field::Borrowed(&input[pos..pos + n]));
        pos += n;
        // Tolerate LF-only or CRLF terminators.
        if pos < len && input[pos] == b'\n' {
            pos += 1;
        } else if pos + 1 < len && input[pos] == b'\r' && input[pos + 1] == b'\n' {
            pos += 2;
        } else if pos >= len {
            return Ok(None);
        } else {
            return Err(());
        }

        num_args -= 1;
        if num_args == 0 {
            return Ok(Some((fields, pos)));
        }
    }
}

pub fn owned_request_from(req: &Request<'_>) -> OwnedRequest {
    req.iter().map(Field::to_bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Request<'_> {
        let mut framer = RespFramer::new();
        match framer.try_parse(input) {
            (ParseOutcome::Request(r), _) => r,
            _ => panic!("expected a parsed request"),
        }
    }

    #[test]
    fn setex_swaps_ttl_and_value() {
        let input = b"*4\r\n$5\r\nSETEX\r\n$3\r\nkey\r\n$2\r\n10\r\n$3\r\nval\r\n";
        let req = parse(input);
        let decoded: Vec<String> = req
            .iter()
            .map(|f| String::from_utf8_lossy(f.as_bytes()).into_owned())
            .collect();
        assert_eq!(decoded, vec!["setx", "key", "val", "10"]);
    }

    #[test]
    fn setex_reply_is_plus_ok() {
        let mut framer = RespFramer::new();
        framer.try_parse(b"*4\r\n$5\r\nSETEX\r\n$3\r\nkey\r\n$2\r\n10\r\n$3\r\nval\r\n");
        let mut out = Vec::new();
        framer.encode(&Response::ok(), &mut out);
        assert_eq!(out, b"+OK\r\n");
    }

    #[test]
    fn zrangebyscore_exclusive_bound_and_limit() {
        let input = b"*7\r\n$14\r\nZRANGEBYSCORE\r\n$1\r\nz\r\n$2\r\n(5\r\n$2\r\n10\r\n$5\r\nLIMIT\r\n$1\r\n0\r\n$2\r\n2\r\n";
        // Note: WITHSCORES appended separately below via a second parse.
        let req = parse(input);
        let decoded: Vec<String> = req
            .iter()
            .map(|f| String::from_utf8_lossy(f.as_bytes()).into_owned())
            .collect();
        assert_eq!(decoded[0], "zscan");
        assert_eq!(decoded[1], "z");
        assert_eq!(decoded[3], "6"); // (5 exclusive lower bound -> 6
        assert_eq!(decoded[4], "10");
    }

    #[test]
    fn mget_aligns_missing_keys_to_dollar_minus_one() {
        let mut framer = RespFramer::new();
        let input = b"*3\r\n$4\r\nMGET\r\n$1\r\na\r\n$1\r\nb\r\n";
        framer.try_parse(input);
        let mut resp = Response::ok();
        resp.push("a").push("1"); // only "a" found; "b" missing
        let mut out = Vec::new();
        framer.encode(&resp, &mut out);
        assert_eq!(out, b"*2\r\n$1\r\n1\r\n$-1\r\n");
    }

    #[test]
    fn hmget_aligns_missing_fields_to_dollar_minus_one() {
        let mut framer = RespFramer::new();
        let input = b"*4\r\n$6\r\nHMGET\r\n$1\r\nh\r\n$1\r\na\r\n$1\r\nb\r\n";
        let req = parse(input);
        let decoded: Vec<String> = req
            .iter()
            .map(|f| String::from_utf8_lossy(f.as_bytes()).into_owned())
            .collect();
        assert_eq!(decoded, vec!["multi_hget", "h", "a", "b"]);

        let mut resp = Response::ok();
        resp.push("a").push("1"); // only "a" found; "b" missing
        let mut out = Vec::new();
        framer.encode(&resp, &mut out);
        assert_eq!(out, b"*2\r\n$1\r\n1\r\n$-1\r\n");
    }

    #[test]
    fn hgetall_renames_the_command_and_keeps_its_one_argument() {
        let input = b"*2\r\n$7\r\nHGETALL\r\n$1\r\nh\r\n";
        let req = parse(input);
        let decoded: Vec<String> = req
            .iter()
            .map(|f| String::from_utf8_lossy(f.as_bytes()).into_owned())
            .collect();
        assert_eq!(decoded, vec!["hgetall", "h"]);
    }

    #[test]
    fn unknown_command_is_passed_through_as_multi_bulk() {
        let mut framer = RespFramer::new();
        let input = b"*2\r\n$7\r\nUNKNOWN\r\n$1\r\nx\r\n";
        framer.try_parse(input);
        let mut resp = Response::ok();
        resp.push("x");
        let mut out = Vec::new();
        framer.encode(&resp, &mut out);
        assert_eq!(out, b"*1\r\n$1\r\nx\r\n");
    }
}
