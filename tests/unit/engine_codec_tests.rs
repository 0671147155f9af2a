//! Unit tests for the engine wire line codec.

use batch_conductor::engine::codec::{EngineCodec, DEFAULT_MAX_MESSAGE_BYTES};
use batch_conductor::AppError;
use bytes::BytesMut;
use futures_util::StreamExt;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder, FramedRead};

#[test]
fn decodes_complete_lines_only() {
    let mut codec = EngineCodec::new();
    let mut buf = BytesMut::from("{\"id\":1}\n{\"id\":");

    let first = codec.decode(&mut buf).expect("decode").expect("one line");
    assert_eq!(first, "{\"id\":1}");
    assert!(codec.decode(&mut buf).expect("decode").is_none());

    buf.extend_from_slice(b"2}\n");
    let second = codec.decode(&mut buf).expect("decode").expect("second line");
    assert_eq!(second, "{\"id\":2}");
}

#[test]
fn blank_lines_between_messages_are_skipped() {
    let mut codec = EngineCodec::new();
    let mut buf = BytesMut::from("\n  \r\n{\"id\":3}\n\n");

    let line = codec.decode(&mut buf).expect("decode").expect("message");
    assert_eq!(line, "{\"id\":3}");
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

#[test]
fn encode_serializes_one_json_line() {
    let mut codec = EngineCodec::new();
    let mut buf = BytesMut::new();
    codec
        .encode(&json!({ "id": 1, "method": "export_state" }), &mut buf)
        .expect("encode");
    assert_eq!(&buf[..], b"{\"id\":1,\"method\":\"export_state\"}\n");
}

#[test]
fn default_cap_is_one_mebibyte() {
    assert_eq!(EngineCodec::new().max_message_bytes(), DEFAULT_MAX_MESSAGE_BYTES);
    assert_eq!(DEFAULT_MAX_MESSAGE_BYTES, 1024 * 1024);
}

#[test]
fn oversized_message_names_the_setting() {
    let mut codec = EngineCodec::with_limit(8);
    let mut buf = BytesMut::from("{\"output\":\"far too long\"}\n");

    let err = codec.decode(&mut buf).expect_err("too long");
    assert!(matches!(err, AppError::Protocol(ref msg) if msg.contains("exceeded 8 bytes")));
    assert!(err.to_string().contains("engine.max_message_bytes"));
}

#[test]
fn message_at_the_cap_is_accepted() {
    let mut codec = EngineCodec::with_limit(8);
    let mut buf = BytesMut::from("12345678\n");
    assert_eq!(codec.decode(&mut buf).expect("decode").as_deref(), Some("12345678"));
}

#[tokio::test]
async fn framed_read_yields_trailing_line_at_eof() {
    let input: &[u8] = b"one\ntwo\n\nthree";
    let lines: Vec<String> = FramedRead::new(input, EngineCodec::new())
        .map(|line| line.expect("line"))
        .collect()
        .await;
    assert_eq!(lines, ["one", "two", "three"]);
}
