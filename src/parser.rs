//! Tokenizers for the textual payload carried in [`Message::data`].
//!
//! All three parsers split on ASCII space and discard empty tokens, then
//! interpret the resulting tokens according to their own grammar. None of
//! them ever panics on malformed input: failure is reported by returning
//! `false` and leaving the parser cleared, per the sentinel discipline used
//! throughout this crate's codec layer.
//!
//! [`Message::data`]: crate::message::Message::data

use std::fmt;

use crate::message::Message;

fn tokenize(data: &[u8]) -> Vec<Vec<u8>> {
    data.split(|&b| b == b' ')
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.to_vec())
        .collect()
}

fn parse_decimal(tok: &[u8]) -> Option<i64> {
    std::str::from_utf8(tok).ok()?.parse().ok()
}

/// Splits message data into space-separated tokens without interpreting
/// them further.
#[derive(Debug, Default, Clone)]
pub struct GenericParser {
    arguments: Vec<Vec<u8>>,
}

impl GenericParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the parser to its empty state.
    pub fn clear(&mut self) {
        self.arguments.clear();
    }

    /// Tokenizes `msg`'s data. Always succeeds.
    pub fn parse(&mut self, msg: &Message) -> bool {
        self.arguments = tokenize(msg.data());
        true
    }

    /// Returns the parsed tokens.
    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.arguments
    }

    /// Returns the number of parsed tokens.
    pub fn num_arguments(&self) -> usize {
        self.arguments.len()
    }

    /// Returns true if any tokens were parsed.
    pub fn has_arguments(&self) -> bool {
        !self.arguments.is_empty()
    }

    /// Re-joins the parsed tokens with a single space.
    pub fn joined_arguments(&self) -> Vec<u8> {
        self.arguments.join(&b' ')
    }
}

/// Parses a reply message's data as `"<error_code> [args...]"`.
///
/// Requires [`Message::is_reply`] on the input message.
///
/// [`Message::is_reply`]: crate::message::Message::is_reply
#[derive(Debug, Default, Clone)]
pub struct ReplyParser {
    error_code: i64,
    is_ack: bool,
    arguments: Vec<Vec<u8>>,
}

impl ReplyParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the parser to its empty state.
    pub fn clear(&mut self) {
        self.error_code = 0;
        self.is_ack = false;
        self.arguments.clear();
    }

    /// Parses `msg`. Returns `false` (and clears the parser) if `msg` is
    /// not a reply, has no tokens, or its first token is not a decimal
    /// integer.
    pub fn parse(&mut self, msg: &Message) -> bool {
        self.clear();

        if !msg.is_reply() {
            return false;
        }

        let tokens = tokenize(msg.data());
        let Some((first, rest)) = tokens.split_first() else {
            return false;
        };
        let Some(error_code) = parse_decimal(first) else {
            return false;
        };

        self.error_code = error_code;
        self.is_ack = rest == [b"ACK".to_vec()];
        self.arguments = rest.to_vec();
        true
    }

    /// Returns the parsed error code (may be negative, zero, or positive).
    pub fn error_code(&self) -> i64 {
        self.error_code
    }

    /// Returns true if the remaining tokens after the error code are
    /// exactly `["ACK"]`.
    pub fn is_ack_reply(&self) -> bool {
        self.is_ack
    }

    /// Returns the tokens following the error code.
    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.arguments
    }
}

/// The recognized command verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    /// `set <identifier> [args...]`
    Set,
    /// `get <identifier> [args...]`
    Get,
    /// `def <identifier> [args...]`
    Def,
    /// `undef <identifier> [args...]`
    Undef,
}

impl CommandType {
    fn from_keyword(keyword: &[u8]) -> Option<CommandType> {
        match keyword {
            b"set" => Some(CommandType::Set),
            b"get" => Some(CommandType::Get),
            b"def" => Some(CommandType::Def),
            b"undef" => Some(CommandType::Undef),
            _ => None,
        }
    }
}

impl AsRef<str> for CommandType {
    fn as_ref(&self) -> &str {
        match self {
            CommandType::Set => "set",
            CommandType::Get => "get",
            CommandType::Def => "def",
            CommandType::Undef => "undef",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Parses a non-reply message's data as
/// `"<set|get|def|undef> <identifier> [args...]"`.
///
/// Requires `!msg.is_reply()` on the input message.
#[derive(Debug, Clone)]
pub struct CommandParser {
    command: Vec<u8>,
    command_type: Option<CommandType>,
    identifier: Vec<u8>,
    arguments: Vec<Vec<u8>>,
}

impl Default for CommandParser {
    fn default() -> Self {
        CommandParser {
            command: Vec::new(),
            command_type: None,
            identifier: Vec::new(),
            arguments: Vec::new(),
        }
    }
}

impl CommandParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the parser to its empty state.
    pub fn clear(&mut self) {
        *self = CommandParser::default();
    }

    /// Parses `msg`. Returns `false` (and clears the parser) if `msg` is a
    /// reply, has fewer than two tokens, or its first token is not a
    /// recognized verb.
    pub fn parse(&mut self, msg: &Message) -> bool {
        self.clear();

        if msg.is_reply() {
            return false;
        }

        let tokens = tokenize(msg.data());
        if tokens.len() < 2 {
            return false;
        }

        let Some(command_type) = CommandType::from_keyword(&tokens[0]) else {
            return false;
        };

        self.command = tokens[0].clone();
        self.command_type = Some(command_type);
        self.identifier = tokens[1].clone();
        self.arguments = tokens[2..].to_vec();
        true
    }

    /// Returns the raw command keyword, as received.
    pub fn command(&self) -> &[u8] {
        &self.command
    }

    /// Returns the recognized command type, if a successful parse has
    /// occurred.
    pub fn command_type(&self) -> Option<CommandType> {
        self.command_type
    }

    /// Returns the identifier token (the second token in the message).
    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    /// Returns every token after the identifier.
    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.arguments
    }
}

/// The acknowledgement error codes carried in ACK/reply payloads.
///
/// This is a small closed set; codes outside it are not an error
/// condition by themselves (any `i64` is a syntactically valid error
/// code per [`ReplyParser`]) but have no named meaning, and render as
/// `"Unknown Error"` via [`ack_error_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckErrorCode {
    /// The command was accepted.
    NoError = 0,
    /// The command keyword or identifier was not recognized.
    UnknownCommand = 2,
    /// An argument to the command was malformed or out of range.
    ParameterError = 3,
    /// The command is not valid in the device's current mode.
    WrongMode = 5,
}

impl AckErrorCode {
    /// Returns the human-readable string for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            AckErrorCode::NoError => "No Error",
            AckErrorCode::UnknownCommand => "Unknown Command",
            AckErrorCode::ParameterError => "Parameter Error",
            AckErrorCode::WrongMode => "Wrong Mode",
        }
    }
}

impl fmt::Display for AckErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for AckErrorCode {
    type Error = ();

    fn try_from(code: i64) -> Result<Self, ()> {
        match code {
            0 => Ok(AckErrorCode::NoError),
            2 => Ok(AckErrorCode::UnknownCommand),
            3 => Ok(AckErrorCode::ParameterError),
            5 => Ok(AckErrorCode::WrongMode),
            _ => Err(()),
        }
    }
}

/// Maps any ack-error code (as parsed by [`ReplyParser::error_code`]) to a
/// human-readable string, falling back to `"Unknown Error"` for codes
/// outside [`AckErrorCode`]'s closed set.
pub fn ack_error_string(code: i64) -> &'static str {
    match AckErrorCode::try_from(code) {
        Ok(known) => known.as_str(),
        Err(()) => "Unknown Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn msg(data: &[u8], reply: bool) -> Message {
        let flags = if reply { 0x0008 } else { 0x0000 };
        Message::new(1, b"a", b"b", data.to_vec(), flags)
    }

    #[test]
    fn generic_parser_splits_and_discards_empty_tokens() {
        let mut p = GenericParser::new();
        assert!(p.parse(&msg(b"a  b   c", false)));
        assert_eq!(p.arguments(), &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(p.num_arguments(), 3);
        assert!(p.has_arguments());
        assert_eq!(p.joined_arguments(), b"a b c");
    }

    #[test]
    fn generic_parser_empty_data_has_no_arguments() {
        let mut p = GenericParser::new();
        assert!(p.parse(&msg(b"", false)));
        assert!(!p.has_arguments());
    }

    #[test]
    fn reply_parser_rejects_non_reply() {
        let mut p = ReplyParser::new();
        assert!(!p.parse(&msg(b"0 ACK", false)));
    }

    #[test]
    fn reply_parser_rejects_empty_data() {
        let mut p = ReplyParser::new();
        assert!(!p.parse(&msg(b"", true)));
    }

    #[test]
    fn reply_parser_rejects_non_integer_first_token() {
        let mut p = ReplyParser::new();
        assert!(!p.parse(&msg(b"nope ACK", true)));
    }

    #[test]
    fn reply_parser_recognizes_ack() {
        let mut p = ReplyParser::new();
        assert!(p.parse(&msg(b"0 ACK", true)));
        assert_eq!(p.error_code(), 0);
        assert!(p.is_ack_reply());
        assert_eq!(p.arguments(), &[b"ACK".to_vec()]);
    }

    #[test]
    fn reply_parser_negative_error_code() {
        let mut p = ReplyParser::new();
        assert!(p.parse(&msg(b"-1 whatever", true)));
        assert_eq!(p.error_code(), -1);
        assert!(!p.is_ack_reply());
    }

    #[test]
    fn reply_parser_fin_with_data() {
        let mut p = ReplyParser::new();
        assert!(p.parse(&msg(b"0 42", true)));
        assert_eq!(p.error_code(), 0);
        assert!(!p.is_ack_reply());
        assert_eq!(p.arguments(), &[b"42".to_vec()]);
    }

    #[test]
    fn command_parser_rejects_reply() {
        let mut p = CommandParser::new();
        assert!(!p.parse(&msg(b"set mode local", true)));
    }

    #[test]
    fn command_parser_rejects_too_few_tokens() {
        let mut p = CommandParser::new();
        assert!(!p.parse(&msg(b"set", false)));
    }

    #[test]
    fn command_parser_rejects_unknown_verb() {
        let mut p = CommandParser::new();
        assert!(!p.parse(&msg(b"frobnicate mode", false)));
    }

    #[test]
    fn command_parser_handles_double_spaces() {
        let mut p = CommandParser::new();
        assert!(p.parse(&msg(b"set  mode  local", false)));
        assert_eq!(p.command(), b"set");
        assert_eq!(p.command_type(), Some(CommandType::Set));
        assert_eq!(p.identifier(), b"mode");
        assert_eq!(p.arguments(), &[b"local".to_vec()]);
    }

    #[test]
    fn command_parser_recognizes_all_verbs() {
        for (verb, expected) in [
            (&b"set"[..], CommandType::Set),
            (b"get", CommandType::Get),
            (b"def", CommandType::Def),
            (b"undef", CommandType::Undef),
        ] {
            let mut p = CommandParser::new();
            let data = [verb, b" id"].concat();
            assert!(p.parse(&msg(&data, false)));
            assert_eq!(p.command_type(), Some(expected));
        }
    }

    #[test]
    fn command_parser_clear_matches_fresh_parse() {
        let mut p = CommandParser::new();
        assert!(p.parse(&msg(b"set mode local", false)));
        p.clear();
        let mut fresh = CommandParser::new();
        assert!(fresh.parse(&msg(b"get other", false)));
        assert!(p.parse(&msg(b"get other", false)));
        assert_eq!(p.command_type(), fresh.command_type());
        assert_eq!(p.identifier(), fresh.identifier());
    }

    #[test]
    fn ack_error_string_known_and_unknown_codes() {
        assert_eq!(ack_error_string(0), "No Error");
        assert_eq!(ack_error_string(2), "Unknown Command");
        assert_eq!(ack_error_string(3), "Parameter Error");
        assert_eq!(ack_error_string(5), "Wrong Mode");
        assert_eq!(ack_error_string(99), "Unknown Error");
        assert_eq!(ack_error_string(-1), "Unknown Error");
    }
}
