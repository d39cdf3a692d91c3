//! Parser determinism and edge-case tests driven through the public API,
//! complementing the inline unit tests in `src/parser.rs`.

use dcpclient::parser::{ack_error_string, CommandParser, CommandType, GenericParser, ReplyParser};
use dcpclient::Message;

fn command(data: &[u8]) -> Message {
    Message::new(1, b"device", b"hub", data.to_vec(), 0)
}

fn reply(data: &[u8]) -> Message {
    Message::new(1, b"hub", b"device", data.to_vec(), 0x0008)
}

#[test]
fn generic_parser_is_deterministic_across_reparses() {
    let msg = command(b"alpha beta  gamma");

    let mut first = GenericParser::new();
    assert!(first.parse(&msg));

    let mut second = GenericParser::new();
    assert!(second.parse(&msg));

    assert_eq!(first.arguments(), second.arguments());
    assert_eq!(first.joined_arguments(), b"alpha beta gamma");
}

#[test]
fn command_parser_extracts_identifier_and_trailing_arguments() {
    let mut parser = CommandParser::new();
    assert!(parser.parse(&command(b"def preset bright 80 40")));

    assert_eq!(parser.command_type(), Some(CommandType::Def));
    assert_eq!(parser.identifier(), b"preset");
    assert_eq!(
        parser.arguments(),
        &[b"bright".to_vec(), b"80".to_vec(), b"40".to_vec()]
    );
}

#[test]
fn command_parser_rejects_a_reply_flagged_message() {
    let mut parser = CommandParser::new();
    assert!(!parser.parse(&reply(b"set mode local")));
    assert_eq!(parser.command_type(), None);
}

#[test]
fn reply_parser_rejects_a_non_reply_flagged_message() {
    let mut parser = ReplyParser::new();
    assert!(!parser.parse(&command(b"0 ACK")));
}

#[test]
fn reply_parser_round_trips_an_ack_reply() {
    let request = command(b"set mode local");
    let ack = request.ack_message(0);

    let mut parser = ReplyParser::new();
    assert!(parser.parse(&ack));
    assert_eq!(parser.error_code(), 0);
    assert!(parser.is_ack_reply());
    assert_eq!(ack_error_string(parser.error_code()), "No Error");
}

#[test]
fn reply_parser_round_trips_a_data_reply() {
    let request = command(b"get level");
    let reply_msg = request.reply_message(b"42", 0);

    let mut parser = ReplyParser::new();
    assert!(parser.parse(&reply_msg));
    assert_eq!(parser.error_code(), 0);
    assert!(!parser.is_ack_reply());
    assert_eq!(parser.arguments(), &[b"42".to_vec()]);
}

#[test]
fn reply_parser_surfaces_an_unknown_error_code() {
    let mut parser = ReplyParser::new();
    assert!(parser.parse(&reply(b"99 ACK")));
    assert_eq!(ack_error_string(parser.error_code()), "Unknown Error");
}

#[test]
fn clearing_a_parser_matches_a_freshly_constructed_one() {
    let mut parser = CommandParser::new();
    assert!(parser.parse(&command(b"get level")));
    parser.clear();

    let fresh = CommandParser::new();
    assert_eq!(parser.command_type(), fresh.command_type());
    assert_eq!(parser.identifier(), fresh.identifier());
    assert_eq!(parser.arguments(), fresh.arguments());
}
