//! Native line-framed protocol: `<decimal_len>\n<payload>\n`
//! records, message terminated by a blank line. Grounded in the RESP
//! sibling's parsing style (`link_redis.cpp::parse_req`) translated to the
//! native length-prefixed grammar.

use super::{Field, Framer, ParseOutcome, Request, Response, MAX_PACKET_SIZE};

#[derive(Debug, Default)]
pub struct NativeFramer;

impl NativeFramer {
    pub fn new() -> Self {
        NativeFramer
    }
}

/// Parse one request out of `input`, returning the request and the number
/// of bytes consumed, or `None` if more bytes are needed, or an error if
/// the input is syntactically invalid.
fn parse_request(input: &[u8]) -> Result<Option<(Request<'_>, usize)>, ()> {
    let mut pos = 0usize;
    let len = input.len();

    // Skip leading blank lines (used as keep-alive noise).
    loop {
        if pos >= len {
            return Ok(None);
        }
        if input[pos] == b'\n' {
            pos += 1;
        } else if pos + 1 < len && input[pos] == b'\r' && input[pos + 1] == b'\n' {
            pos += 2;
        } else {
            break;
        }
    }

    let mut fields: Request<'_> = Vec::new();
    let start = pos;

    loop {
        if pos >= len {
            return Ok(None);
        }
        // Blank line: terminates the message.
        if input[pos] == b'\n' {
            return Ok(Some((fields, pos + 1)));
        }
        if pos + 1 < len && input[pos] == b'\r' && input[pos + 1] == b'\n' {
            return Ok(Some((fields, pos + 2)));
        }

        // Decimal length, terminated by LF.
        let lf = match input[pos..].iter().position(|&b| b == b'\n') {
            Some(off) => pos + off,
            None => {
                if pos - start > MAX_PACKET_SIZE {
                    return Err(());
                }
                return Ok(None);
            }
        };
        let len_str = std::str::from_utf8(&input[pos..lf]).map_err(|_| ())?;
        let record_len: usize = len_str.trim_end_matches('\r').parse().map_err(|_| ())?;
        if record_len > MAX_PACKET_SIZE {
            return Err(());
        }
        let payload_start = lf + 1;
        let payload_end = payload_start + record_len;
        if payload_end > len {
            if payload_end - start > MAX_PACKET_SIZE {
                return Err(());
            }
            return Ok(None);
        }
        // Payload must be followed by LF or CRLF.
        let mut term_end = payload_end;
        if term_end >= len {
            return Ok(None);
        }
        if input[term_end] == b'\n' {
            term_end += 1;
        } else if term_end + 1 < len && input[term_end] == b'\r' && input[term_end + 1] == b'\n' {
            term_end += 2;
        } else if term_end >= len {
            return Ok(None);
        } else {
            return Err(());
        }

        fields.push(Field::Borrowed(&input[payload_start..payload_end]));
        pos = term_end;

        if pos - start > MAX_PACKET_SIZE {
            return Err(());
        }
    }
}

impl Framer for NativeFramer {
    fn try_parse<'a>(&mut self, input: &'a [u8]) -> (ParseOutcome<'a>, usize) {
        match parse_request(input) {
            Ok(Some((req, consumed))) => (ParseOutcome::Request(req), consumed),
            Ok(None) => (ParseOutcome::NeedMore, 0),
            Err(()) => (ParseOutcome::FatalError, 0),
        }
    }

    fn encode(&mut self, resp: &Response, out: &mut Vec<u8>) {
        for field in &resp.fields {
            out.extend_from_slice(field.len().to_string().as_bytes());
            out.push(b'\n');
            out.extend_from_slice(field.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::Status;

    fn encode_records(records: &[&[u8]]) -> Vec<u8> {
        let mut buf = Vec::new();
        for r in records {
            buf.extend_from_slice(r.len().to_string().as_bytes());
            buf.push(b'\n');
            buf.extend_from_slice(r);
            buf.push(b'\n');
        }
        buf.push(b'\n');
        buf
    }

    #[test]
    fn round_trips_a_single_message() {
        let records: &[&[u8]] = &[b"set", b"k", b"v"];
        let buf = encode_records(records);
        let (outcome, consumed) = NativeFramer::new().try_parse(&buf);
        let req = match outcome {
            ParseOutcome::Request(r) => r,
            _ => panic!("expected a parsed request"),
        };
        assert_eq!(consumed, buf.len());
        let decoded: Vec<&[u8]> = req.iter().map(|f| f.as_bytes()).collect();
        assert_eq!(decoded, records);
    }

    #[test]
    fn pipelined_messages_decode_in_order() {
        let mut buf = encode_records(&[b"get", b"a"]);
        buf.extend(encode_records(&[b"get", b"b"]));

        let mut framer = NativeFramer::new();
        let (outcome1, consumed1) = framer.try_parse(&buf);
        let req1 = match outcome1 {
            ParseOutcome::Request(r) => r,
            _ => panic!(),
        };
        assert_eq!(req1[1].as_bytes(), b"a");

        let (outcome2, consumed2) = framer.try_parse(&buf[consumed1..]);
        let req2 = match outcome2 {
            ParseOutcome::Request(r) => r,
            _ => panic!(),
        };
        assert_eq!(req2[1].as_bytes(), b"b");
        assert_eq!(consumed1 + consumed2, buf.len());
    }

    #[test]
    fn empty_request_is_keepalive() {
        let buf = b"\n".to_vec();
        let (outcome, consumed) = NativeFramer::new().try_parse(&buf);
        match outcome {
            ParseOutcome::Request(r) => assert!(r.is_empty()),
            _ => panic!("expected an empty keep-alive request"),
        }
        assert_eq!(consumed, 1);
    }

    #[test]
    fn incomplete_record_needs_more_bytes() {
        let buf = b"5\nhel".to_vec();
        let (outcome, _) = NativeFramer::new().try_parse(&buf);
        assert!(matches!(outcome, ParseOutcome::NeedMore));
    }

    #[test]
    fn garbage_length_is_fatal() {
        let buf = b"not_a_number\nx\n\n".to_vec();
        let (outcome, _) = NativeFramer::new().try_parse(&buf);
        assert!(matches!(outcome, ParseOutcome::FatalError));
    }

    #[test]
    fn encodes_records_with_blank_line_terminator() {
        let mut resp = Response::new(Status::Ok);
        resp.push("hello");
        let mut out = Vec::new();
        NativeFramer::new().encode(&resp, &mut out);
        assert_eq!(out, b"2\nok\n5\nhello\n\n");
    }
}
