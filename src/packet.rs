//! Packet framing: the 8-byte header prepended to every message on the
//! wire, and the encode/decode helpers used to turn a [`Message`] into a
//! framed byte stream and back.
//!
//! This module is deliberately free of any socket concern; it operates on
//! plain byte slices and buffers so the framing algorithm can be tested in
//! isolation from I/O.

use byteorder::{BigEndian, ByteOrder};

use crate::message::Message;
use crate::wire::{
    FULL_HEADER_SIZE, MAX_PACKET_SIZE, MESSAGE_HEADER_SIZE, PACKET_HEADER_SIZE,
    PACKET_MSG_SIZE_POS, PACKET_OFFSET_POS,
};

/// The 8-byte header prepended to a message on the wire.
///
/// Multi-packet messages (`offset != 0`) are not supported by this client;
/// [`PacketHeader::decode`] still parses the field so a peer that sends
/// one can be detected and rejected rather than silently misparsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PacketHeader {
    pub(crate) msg_size: u32,
    pub(crate) offset: u32,
}

impl PacketHeader {
    /// Encodes the header as 8 big-endian bytes.
    pub(crate) fn encode(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[PACKET_MSG_SIZE_POS..], self.msg_size);
        BigEndian::write_u32(&mut buf[PACKET_OFFSET_POS..], self.offset);
        buf
    }

    /// Decodes an 8-byte header. Returns `None` if `raw` is shorter than
    /// [`PACKET_HEADER_SIZE`].
    pub(crate) fn decode(raw: &[u8]) -> Option<PacketHeader> {
        if raw.len() < PACKET_HEADER_SIZE {
            return None;
        }
        Some(PacketHeader {
            msg_size: BigEndian::read_u32(&raw[PACKET_MSG_SIZE_POS..]),
            offset: BigEndian::read_u32(&raw[PACKET_OFFSET_POS..]),
        })
    }
}

/// Encodes `msg` as a full packet: an 8-byte header (`msg_size` set to the
/// message's *data* length, `offset` always `0`) followed by the 42-byte
/// encoded message header and data.
///
/// Returns `None` if `len(msg.data()) + 50 > MAX_PACKET_SIZE`. This is the
/// corrected form of the on-send size check: the original implementation's
/// precedence bug (`!len(data) + 50 > MaxPacket`) effectively never
/// rejected an oversized packet (see DESIGN.md, Open Question 1).
pub(crate) fn encode_packet(msg: &Message) -> Option<Vec<u8>> {
    let body = msg.to_bytes();
    if msg.data().len() + FULL_HEADER_SIZE > MAX_PACKET_SIZE {
        return None;
    }

    let header = PacketHeader {
        msg_size: msg.data().len() as u32,
        offset: 0,
    };

    let mut packet = Vec::with_capacity(PACKET_HEADER_SIZE + body.len());
    packet.extend_from_slice(&header.encode());
    packet.extend_from_slice(&body);
    Some(packet)
}

/// Outcome of attempting to frame one packet out of a receive buffer.
pub(crate) enum FrameResult {
    /// Not enough bytes buffered yet for a full header, or a full header
    /// was seen but not enough bytes for the declared message size yet.
    /// Caller should keep reading.
    Incomplete,
    /// A full frame was available and consumed `consumed` bytes from the
    /// front of the buffer; `message` is the decoded result (may itself be
    /// a null-message if the message body failed to decode).
    Frame { message: Message, consumed: usize },
    /// The declared message size would make the full packet exceed
    /// [`MAX_PACKET_SIZE`], or a nonzero `offset` (multi-packet message)
    /// was seen. The connection must be closed; framing cannot recover
    /// mid-stream once a bogus size has been read off the wire.
    Invalid,
}

/// Attempts to extract one framed message from the front of `buf`.
///
/// This never panics on short input; callers drive it in a loop, buffering
/// more bytes on [`FrameResult::Incomplete`] and stopping (closing the
/// connection) on [`FrameResult::Invalid`].
pub(crate) fn decode_frame(buf: &[u8]) -> FrameResult {
    let Some(header) = PacketHeader::decode(buf) else {
        return FrameResult::Incomplete;
    };

    if header.offset != 0 {
        return FrameResult::Invalid;
    }

    let msg_size = header.msg_size as usize;
    if msg_size + FULL_HEADER_SIZE > MAX_PACKET_SIZE {
        return FrameResult::Invalid;
    }

    let total = PACKET_HEADER_SIZE + MESSAGE_HEADER_SIZE + msg_size;
    if buf.len() < total {
        return FrameResult::Incomplete;
    }

    let message = Message::from_bytes(&buf[PACKET_HEADER_SIZE..total]);
    FrameResult::Frame {
        message,
        consumed: total,
    }
}
