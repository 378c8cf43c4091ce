//! End-to-end inline-RESP properties: a plain Redis client speaking
//! `*N\r\n$len\r\n...` against the same server the native tests use, proving
//! protocol auto-detection and the redis->native command translation work
//! through a live dispatch, not just the framer's unit tests.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;

fn resp_request(stream: &mut TcpStream, args: &[&str]) {
    let mut buf = format!("*{}\r\n", args.len());
    for a in args {
        buf.push_str(&format!("${}\r\n{}\r\n", a.len(), a));
    }
    stream.write_all(buf.as_bytes()).unwrap();
}

fn read_some(stream: &mut TcpStream) -> String {
    let mut chunk = [0u8; 4096];
    let n = stream.read(&mut chunk).expect("read reply");
    assert!(n > 0, "connection closed before a reply arrived");
    String::from_utf8_lossy(&chunk[..n]).into_owned()
}

#[test]
fn redis_set_then_get_round_trip() {
    let server = common::start();
    let mut stream = TcpStream::connect(server.addr).unwrap();

    resp_request(&mut stream, &["SET", "k", "v"]);
    assert_eq!(read_some(&mut stream), "+OK\r\n");

    resp_request(&mut stream, &["GET", "k"]);
    assert_eq!(read_some(&mut stream), "$1\r\nv\r\n");
}

#[test]
fn redis_get_of_missing_key_is_nil_bulk() {
    let server = common::start();
    let mut stream = TcpStream::connect(server.addr).unwrap();

    resp_request(&mut stream, &["GET", "nope"]);
    assert_eq!(read_some(&mut stream), "$-1\r\n");
}

#[test]
fn redis_ping_gets_simple_string_pong() {
    let server = common::start();
    let mut stream = TcpStream::connect(server.addr).unwrap();

    resp_request(&mut stream, &["PING"]);
    assert_eq!(read_some(&mut stream), "+PONG\r\n");
}

#[test]
fn redis_mget_aligns_missing_keys_to_nil_against_a_live_store() {
    let server = common::start();
    let mut stream = TcpStream::connect(server.addr).unwrap();

    resp_request(&mut stream, &["SET", "a", "1"]);
    read_some(&mut stream);

    resp_request(&mut stream, &["MGET", "a", "b"]);
    assert_eq!(read_some(&mut stream), "*2\r\n$1\r\n1\r\n$-1\r\n");
}

#[test]
fn redis_hset_then_hget_through_the_packed_hash_merge_operator() {
    let server = common::start();
    let mut stream = TcpStream::connect(server.addr).unwrap();

    resp_request(&mut stream, &["HSET", "board", "e2e4", "1"]);
    assert_eq!(read_some(&mut stream), ":1\r\n");

    resp_request(&mut stream, &["HGET", "board", "e2e4"]);
    assert_eq!(read_some(&mut stream), "$1\r\n1\r\n");
}

#[test]
fn native_and_redis_clients_observe_each_others_writes() {
    let server = common::start();
    let mut redis_client = TcpStream::connect(server.addr).unwrap();
    let mut native_client = TcpStream::connect(server.addr).unwrap();

    resp_request(&mut redis_client, &["SET", "cross", "proto"]);
    assert_eq!(read_some(&mut redis_client), "+OK\r\n");

    let resp = common::native_roundtrip(&mut native_client, &[b"get", b"cross"]);
    assert_eq!(resp, vec!["ok".to_string(), "proto".to_string()]);
}
