//! Unit tests for NDJSON line framing.

use agent_relay::engine::codec::{NdjsonCodec, MAX_LINE_BYTES};
use agent_relay::AppError;
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[test]
fn incomplete_trailing_line_buffers_across_chunks() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from(&b"{\"type\":\"res"[..]);

    assert!(codec.decode(&mut buf).unwrap().is_none());

    buf.extend_from_slice(b"ult\"}\n{\"partial");
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("{\"type\":\"result\"}"));
    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn decode_eof_flushes_the_final_unterminated_line() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from(&b"last line without newline"[..]);

    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert_eq!(
        codec.decode_eof(&mut buf).unwrap().as_deref(),
        Some("last line without newline")
    );
    assert!(codec.decode_eof(&mut buf).unwrap().is_none());
}

#[test]
fn oversized_line_is_rejected_as_a_protocol_error() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&vec![b'x'; MAX_LINE_BYTES + 1]);

    match codec.decode(&mut buf) {
        Err(AppError::Protocol(msg)) => assert!(msg.contains("line too long")),
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[test]
fn multiple_lines_in_one_chunk_decode_in_order() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from(&b"one\ntwo\nthree\n"[..]);

    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("one"));
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("two"));
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("three"));
    assert!(codec.decode(&mut buf).unwrap().is_none());
}
