//! Message codec round-trip and edge-case tests driven entirely through the
//! public API, complementing the inline unit tests in `src/message.rs`.

use dcpclient::Message;

#[test]
fn round_trip_preserves_every_field() {
    let msg = Message::new(123_456, b"alpha", b"beta", b"payload bytes".to_vec(), 0x0a0f);
    let decoded = Message::from_bytes(&msg.to_bytes());

    assert_eq!(decoded.snr(), 123_456);
    assert_eq!(decoded.source(), b"alpha");
    assert_eq!(decoded.destination(), b"beta");
    assert_eq!(decoded.data(), b"payload bytes");
    assert_eq!(decoded.flags(), 0x0a0f);
    assert!(!decoded.is_null());
}

#[test]
fn round_trip_with_empty_data_and_names() {
    let msg = Message::new(0, b"", b"", Vec::new(), 0);
    let decoded = Message::from_bytes(&msg.to_bytes());

    assert_eq!(decoded.source(), b"");
    assert_eq!(decoded.destination(), b"");
    assert_eq!(decoded.data(), b"");
    assert!(!decoded.is_null());
}

#[test]
fn device_names_longer_than_sixteen_bytes_are_truncated_on_construction() {
    let msg = Message::new(0, b"0123456789abcdefXYZ", b"dst", Vec::new(), 0);
    assert_eq!(msg.source(), b"0123456789abcdef");

    // The truncation already happened before encoding, so the round trip
    // is exact.
    let decoded = Message::from_bytes(&msg.to_bytes());
    assert_eq!(decoded.source(), b"0123456789abcdef");
}

#[test]
fn decoding_a_buffer_shorter_than_the_header_yields_a_null_message() {
    let decoded = Message::from_bytes(&[0u8; 10]);
    assert!(decoded.is_null());
    assert_eq!(decoded.data(), b"");
}

#[test]
fn decoding_a_buffer_whose_declared_length_is_wrong_yields_a_null_message() {
    let msg = Message::new(0, b"a", b"b", b"12345".to_vec(), 0);
    let mut bytes = msg.to_bytes();
    bytes.truncate(bytes.len() - 1);

    assert!(Message::from_bytes(&bytes).is_null());
}

#[test]
fn dcp_flag_accessors_agree_with_the_raw_flags_word() {
    let mut msg = Message::default();
    msg.set_flags(0x120f);

    assert!(msg.is_pace());
    assert!(msg.is_greco());
    assert!(msg.is_urgent());
    assert!(msg.is_reply());
    assert_eq!(msg.user_flags(), 0x12);
}

#[test]
fn ack_message_swaps_endpoints_and_sets_ack_flags() {
    let request = Message::new(7, b"device", b"hub", b"set mode local".to_vec(), 0);
    let ack = request.ack_message(0);

    assert_eq!(ack.source(), b"hub");
    assert_eq!(ack.destination(), b"device");
    assert_eq!(ack.snr(), 7);
    assert!(ack.is_reply());
    assert!(ack.is_urgent());
    assert_eq!(ack.data(), b"0 ACK");
}

#[test]
fn reply_message_round_trips_through_the_wire_codec() {
    let request = Message::new(9, b"device", b"hub", b"get level".to_vec(), 0);
    let reply = request.reply_message(b"-12", 0);
    let decoded = Message::from_bytes(&reply.to_bytes());

    assert_eq!(decoded.data(), b"0 -12");
    assert!(decoded.is_reply());
    assert_eq!(decoded.source(), b"hub");
    assert_eq!(decoded.destination(), b"device");
}
