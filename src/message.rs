//! The DCP message value type and its wire codec.

use std::fmt;

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

use crate::wire::{
    strip_trailing_nul, MESSAGE_DATA_LEN_POS, MESSAGE_DESTINATION_POS, MESSAGE_DEVICE_NAME_SIZE,
    MESSAGE_FLAGS_POS, MESSAGE_HEADER_SIZE, MESSAGE_SNR_POS, MESSAGE_SOURCE_POS,
};

bitflags! {
    /// The low byte of a message's flags word: the "DCP flags".
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct DcpFlags: u8 {
        /// Requests paced delivery.
        const PACE = 0x01;
        /// Greco compatibility flag.
        const GRECO = 0x02;
        /// Marks the message as urgent (set on ACK replies).
        const URGENT = 0x04;
        /// Marks the message as a reply.
        const REPLY = 0x08;
    }
}

impl DcpFlags {
    /// The flag combination used for ACK replies (`Urgent | Reply`).
    pub const ACK: DcpFlags = DcpFlags::from_bits_truncate(Self::URGENT.bits() | Self::REPLY.bits());
}

/// A single DCP message.
///
/// A freshly-constructed `Message` (via [`Message::default`]) is a
/// null-message: [`Message::is_null`] returns `true`, and every field reads
/// as its zero value. Any constructor or setter that assigns a field clears
/// the null flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    null_flag: bool,
    flags: u16,
    snr: u32,
    source: Vec<u8>,
    destination: Vec<u8>,
    data: Vec<u8>,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            null_flag: true,
            flags: 0,
            snr: 0,
            source: Vec::new(),
            destination: Vec::new(),
            data: Vec::new(),
        }
    }
}

impl Message {
    /// Creates a new, non-null message with combined (DCP + user) flags.
    pub fn new(
        snr: u32,
        source: impl AsRef<[u8]>,
        destination: impl AsRef<[u8]>,
        data: impl Into<Vec<u8>>,
        flags: u16,
    ) -> Self {
        Message {
            null_flag: false,
            flags,
            snr,
            source: strip_trailing_nul(truncate16(source.as_ref())).to_vec(),
            destination: strip_trailing_nul(truncate16(destination.as_ref())).to_vec(),
            data: data.into(),
        }
    }

    /// Creates a new, non-null message from separate DCP and user flag bytes.
    pub fn with_split_flags(
        snr: u32,
        source: impl AsRef<[u8]>,
        destination: impl AsRef<[u8]>,
        data: impl Into<Vec<u8>>,
        dcp_flags: u8,
        user_flags: u8,
    ) -> Self {
        Self::new(
            snr,
            source,
            destination,
            data,
            u16::from(dcp_flags) | (u16::from(user_flags) << 8),
        )
    }

    /// Resets the message to the null-message state.
    pub fn clear(&mut self) {
        *self = Message::default();
    }

    /// Returns true if this is the null-message sentinel.
    pub fn is_null(&self) -> bool {
        self.null_flag
    }

    /// Returns the full 16-bit flags word.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Sets the full 16-bit flags word.
    pub fn set_flags(&mut self, flags: u16) {
        self.null_flag = false;
        self.flags = flags;
    }

    /// Returns the DCP (low) byte of the flags word.
    pub fn dcp_flags(&self) -> DcpFlags {
        DcpFlags::from_bits_truncate((self.flags & 0x00ff) as u8)
    }

    /// Sets the DCP (low) byte of the flags word.
    pub fn set_dcp_flags(&mut self, flags: DcpFlags) {
        self.null_flag = false;
        self.flags = (self.flags & 0xff00) | u16::from(flags.bits());
    }

    /// Returns the user (high) byte of the flags word.
    pub fn user_flags(&self) -> u8 {
        (self.flags >> 8) as u8
    }

    /// Sets the user (high) byte of the flags word.
    pub fn set_user_flags(&mut self, flags: u8) {
        self.null_flag = false;
        self.flags = (self.flags & 0x00ff) | (u16::from(flags) << 8);
    }

    /// Returns true if the Pace flag is set.
    pub fn is_pace(&self) -> bool {
        self.dcp_flags().contains(DcpFlags::PACE)
    }

    /// Returns true if the Greco flag is set.
    pub fn is_greco(&self) -> bool {
        self.dcp_flags().contains(DcpFlags::GRECO)
    }

    /// Returns true if the Urgent flag is set.
    pub fn is_urgent(&self) -> bool {
        self.dcp_flags().contains(DcpFlags::URGENT)
    }

    /// Returns true if the Reply flag is set.
    pub fn is_reply(&self) -> bool {
        self.dcp_flags().contains(DcpFlags::REPLY)
    }

    /// Returns the serial number of the message.
    pub fn snr(&self) -> u32 {
        self.snr
    }

    /// Sets the serial number of the message.
    pub fn set_snr(&mut self, snr: u32) {
        self.null_flag = false;
        self.snr = snr;
    }

    /// Returns the source device name (trailing NULs already stripped).
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Sets the source device name, truncating to 16 bytes and stripping
    /// trailing NULs.
    pub fn set_source(&mut self, source: impl AsRef<[u8]>) {
        self.null_flag = false;
        self.source = strip_trailing_nul(truncate16(source.as_ref())).to_vec();
    }

    /// Returns the destination device name (trailing NULs already stripped).
    pub fn destination(&self) -> &[u8] {
        &self.destination
    }

    /// Sets the destination device name, truncating to 16 bytes and
    /// stripping trailing NULs.
    pub fn set_destination(&mut self, destination: impl AsRef<[u8]>) {
        self.null_flag = false;
        self.destination = strip_trailing_nul(truncate16(destination.as_ref())).to_vec();
    }

    /// Returns the message data payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Sets the message data payload.
    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.null_flag = false;
        self.data = data.into();
    }

    /// Encodes this message as `42 + data.len()` bytes: flags, snr, source,
    /// destination, data length, then data. Does not include the packet
    /// header (see [`crate::packet`]).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; MESSAGE_HEADER_SIZE + self.data.len()];

        BigEndian::write_u16(&mut buf[MESSAGE_FLAGS_POS..], self.flags);
        BigEndian::write_u32(&mut buf[MESSAGE_SNR_POS..], self.snr);

        let src_end = MESSAGE_SOURCE_POS + self.source.len();
        buf[MESSAGE_SOURCE_POS..src_end].copy_from_slice(&self.source);

        let dst_end = MESSAGE_DESTINATION_POS + self.destination.len();
        buf[MESSAGE_DESTINATION_POS..dst_end].copy_from_slice(&self.destination);

        BigEndian::write_u32(&mut buf[MESSAGE_DATA_LEN_POS..], self.data.len() as u32);
        buf[MESSAGE_HEADER_SIZE..].copy_from_slice(&self.data);

        buf
    }

    /// Decodes a message from its wire form. Returns a null-message if
    /// `raw` is shorter than the fixed header, or if its length disagrees
    /// with the declared data length.
    pub fn from_bytes(raw: &[u8]) -> Message {
        if raw.len() < MESSAGE_HEADER_SIZE {
            return Message::default();
        }

        let data_len = BigEndian::read_u32(&raw[MESSAGE_DATA_LEN_POS..]) as usize;
        if raw.len() != MESSAGE_HEADER_SIZE + data_len {
            return Message::default();
        }

        let flags = BigEndian::read_u16(&raw[MESSAGE_FLAGS_POS..]);
        let snr = BigEndian::read_u32(&raw[MESSAGE_SNR_POS..]);
        let source = &raw[MESSAGE_SOURCE_POS..MESSAGE_SOURCE_POS + MESSAGE_DEVICE_NAME_SIZE];
        let destination = &raw
            [MESSAGE_DESTINATION_POS..MESSAGE_DESTINATION_POS + MESSAGE_DEVICE_NAME_SIZE];
        let data = &raw[MESSAGE_HEADER_SIZE..];

        Message::new(snr, source, destination, data, flags)
    }

    /// Builds an ACK reply to this message: flags `Urgent | Reply` (kept
    /// alongside any flags already set), same snr, source/destination
    /// swapped, data `"{error_code} ACK"`.
    pub fn ack_message(&self, error_code: i32) -> Message {
        Message::new(
            self.snr,
            &self.destination,
            &self.source,
            format!("{error_code} ACK").into_bytes(),
            self.flags | u16::from(DcpFlags::ACK.bits()),
        )
    }

    /// Builds a reply to this message: flags `Reply` (kept alongside any
    /// flags already set), same snr, source/destination swapped, data
    /// `"{error_code} {data}"` (or `"{error_code} FIN"` if `data` is empty).
    pub fn reply_message(&self, data: impl AsRef<[u8]>, error_code: i32) -> Message {
        let data = data.as_ref();
        let mut body = format!("{error_code} ").into_bytes();
        if data.is_empty() {
            body.extend_from_slice(b"FIN");
        } else {
            body.extend_from_slice(data);
        }

        Message::new(
            self.snr,
            &self.destination,
            &self.source,
            body,
            self.flags | u16::from(DcpFlags::REPLY.bits()),
        )
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dcp = self.dcp_flags();
        write!(
            f,
            "{}{}{}{} [0x{:04x}] #{} \"{}\" -> \"{}\" [{}] \"{}\"",
            if dcp.contains(DcpFlags::PACE) { "p" } else { "-" },
            if dcp.contains(DcpFlags::GRECO) { "g" } else { "-" },
            if dcp.contains(DcpFlags::URGENT) { "u" } else { "-" },
            if dcp.contains(DcpFlags::REPLY) { "r" } else { "-" },
            self.flags,
            self.snr,
            String::from_utf8_lossy(&self.source),
            String::from_utf8_lossy(&self.destination),
            self.data.len(),
            String::from_utf8_lossy(&self.data),
        )
    }
}

fn truncate16(bytes: &[u8]) -> &[u8] {
    &bytes[..bytes.len().min(MESSAGE_DEVICE_NAME_SIZE)]
}

/// Percent-encodes `%` and space characters in `input`, replacing `%` with
/// `"%25"` and `' '` with `"%20"`.
///
/// `%` is replaced first so the `%` introduced by encoding a space is never
/// itself re-encoded. This is a simplified form of percent-encoding meant
/// for embedding otherwise-unparseable bytes (spaces, in particular) inside
/// a command/reply payload that is later tokenized on spaces; it is not a
/// general URI percent-encoder.
pub fn percent_encode_spaces(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    for &byte in input {
        match byte {
            b'%' => out.extend_from_slice(b"%25"),
            b' ' => out.extend_from_slice(b"%20"),
            _ => out.push(byte),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_message_is_null() {
        let msg = Message::default();
        assert!(msg.is_null());
        assert_eq!(msg.flags(), 0);
        assert_eq!(msg.snr(), 0);
        assert_eq!(msg.source(), b"");
        assert_eq!(msg.destination(), b"");
        assert_eq!(msg.data(), b"");
    }

    #[test]
    fn setters_clear_null_flag() {
        let mut msg = Message::default();
        assert!(msg.is_null());
        msg.set_snr(1);
        assert!(!msg.is_null());
    }

    #[test]
    fn name_normalization_strips_trailing_nul_and_truncates() {
        let mut msg = Message::default();
        msg.set_source(b"abc\0\0\0");
        assert_eq!(msg.source(), b"abc");

        msg.set_source(b"0123456789abcdefgh");
        assert_eq!(msg.source(), b"0123456789abcdef");

        msg.set_source(b"abc\0\0\0");
        let again = msg.source().to_vec();
        msg.set_source(b"abc\0\0\0");
        assert_eq!(msg.source(), again.as_slice());
    }

    #[test]
    fn helo_registration_roundtrip_matches_spec_example() {
        let msg = Message::new(0, b"cli", b"", b"HELO".to_vec(), 0);
        let bytes = msg.to_bytes();

        assert_eq!(bytes.len(), 46);
        assert_eq!(&bytes[38..42], &[0, 0, 0, 4]);
        assert_eq!(&bytes[6..9], b"cli");
        assert_eq!(&bytes[9..22], &[0u8; 13][..]);
        assert_eq!(&bytes[22..38], &[0u8; 16][..]);

        let decoded = Message::from_bytes(&bytes);
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_truncated_buffer_is_null() {
        let raw = vec![0u8; 30];
        assert!(Message::from_bytes(&raw).is_null());
    }

    #[test]
    fn decode_wrong_declared_length_is_null() {
        let mut raw = vec![0u8; 42];
        BigEndian::write_u32(&mut raw[MESSAGE_DATA_LEN_POS..], 5);
        assert!(Message::from_bytes(&raw).is_null());
    }

    #[test]
    fn codec_roundtrip_arbitrary_message() {
        let msg = Message::new(0xdead_beef, b"src", b"dst", b"hello world".to_vec(), 0x0102);
        let decoded = Message::from_bytes(&msg.to_bytes());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn ack_of_command_matches_spec_example() {
        let msg = Message::new(42, b"a", b"b", b"set nop".to_vec(), 0x0000);
        let ack = msg.ack_message(0);

        assert_eq!(ack.flags(), 0x000c);
        assert_eq!(ack.snr(), 42);
        assert_eq!(ack.source(), b"b");
        assert_eq!(ack.destination(), b"a");
        assert_eq!(ack.data(), b"0 ACK");
    }

    #[test]
    fn reply_with_empty_data_uses_fin() {
        let msg = Message::new(1, b"a", b"b", b"get x".to_vec(), 0);
        let reply = msg.reply_message(b"", 0);

        assert_eq!(reply.data(), b"0 FIN");
        assert_eq!(reply.flags(), 0x0008);
    }

    #[test]
    fn reply_with_data_is_passed_through_verbatim() {
        let msg = Message::new(1, b"a", b"b", b"get x".to_vec(), 0);
        let reply = msg.reply_message(b"42", 0);
        assert_eq!(reply.data(), b"0 42");
    }

    #[test]
    fn percent_encode_spaces_escapes_percent_before_space() {
        assert_eq!(percent_encode_spaces(b"a b"), b"a%20b");
        assert_eq!(percent_encode_spaces(b"100%"), b"100%25");
        assert_eq!(percent_encode_spaces(b"50% done"), b"50%25%20done");
        assert_eq!(percent_encode_spaces(b""), b"");
        assert_eq!(percent_encode_spaces(b"noop"), b"noop");
    }

    #[test]
    fn display_form_renders_flag_letters_and_fields() {
        let msg = Message::new(7, b"src", b"dst", b"payload".to_vec(), 0x000f);
        let rendered = msg.to_string();
        assert!(rendered.starts_with("pgur"));
        assert!(rendered.contains("#7"));
        assert!(rendered.contains("\"src\" -> \"dst\""));
        assert!(rendered.contains("[7]"));
        assert!(rendered.contains("payload"));
    }
}
