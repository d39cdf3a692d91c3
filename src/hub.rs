//! Hub-side packet inspection.
//!
//! A routing hub needs to dispatch a packet to whatever socket the
//! `destination` device is registered under without fully decoding the
//! payload unless the packet is addressed to the hub itself. [`PacketView`]
//! gives that zero-copy inspection.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::message::Message;
use crate::wire::{
    FULL_HEADER_SIZE, MAX_PACKET_SIZE, MESSAGE_DATA_LEN_POS, MESSAGE_DESTINATION_POS,
    MESSAGE_DEVICE_NAME_SIZE, MESSAGE_FLAGS_POS, MESSAGE_SOURCE_POS, PACKET_HEADER_SIZE,
};

/// Why a buffer was rejected as not a valid single packet.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PacketViewError {
    /// The buffer is shorter than the minimum valid packet size (50 bytes)
    /// or longer than [`MAX_PACKET_SIZE`].
    #[error("packet size {0} out of range [50, {MAX_PACKET_SIZE}]")]
    SizeOutOfRange(usize),
    /// The declared message data length plus the fixed 50-byte header does
    /// not equal the buffer length.
    #[error("declared data length disagrees with buffer length")]
    LengthMismatch,
}

/// A non-owning view over one received packet's raw bytes.
///
/// Exposes the header fields without allocating or decoding the payload;
/// use [`PacketView::to_message`] only once a packet is known to be
/// addressed to the hub itself.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    buffer: &'a [u8],
}

impl<'a> PacketView<'a> {
    /// Validates `buffer` as a single framed packet and wraps it.
    ///
    /// Validation rules: `buffer.len()` is in `[50, MAX_PACKET_SIZE]`, and
    /// the message header's declared data length plus 50 equals
    /// `buffer.len()`.
    pub fn new(buffer: &'a [u8]) -> Result<PacketView<'a>, PacketViewError> {
        if buffer.len() < FULL_HEADER_SIZE || buffer.len() > MAX_PACKET_SIZE {
            return Err(PacketViewError::SizeOutOfRange(buffer.len()));
        }

        let data_len = BigEndian::read_u32(
            &buffer[PACKET_HEADER_SIZE + MESSAGE_DATA_LEN_POS..],
        ) as usize;
        if data_len + FULL_HEADER_SIZE != buffer.len() {
            return Err(PacketViewError::LengthMismatch);
        }

        Ok(PacketView { buffer })
    }

    /// Returns the total packet size in bytes, header included.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the message's 16-bit flags word.
    pub fn flags(&self) -> u16 {
        BigEndian::read_u16(&self.buffer[PACKET_HEADER_SIZE + MESSAGE_FLAGS_POS..])
    }

    /// Returns the source device name (trailing NULs stripped).
    pub fn source(&self) -> &'a [u8] {
        self.device_name(PACKET_HEADER_SIZE + MESSAGE_SOURCE_POS)
    }

    /// Returns the destination device name (trailing NULs stripped).
    pub fn destination(&self) -> &'a [u8] {
        self.device_name(PACKET_HEADER_SIZE + MESSAGE_DESTINATION_POS)
    }

    fn device_name(&self, pos: usize) -> &'a [u8] {
        crate::wire::strip_trailing_nul(&self.buffer[pos..pos + MESSAGE_DEVICE_NAME_SIZE])
    }

    /// Fully decodes the packet into a [`Message`].
    pub fn to_message(&self) -> Message {
        Message::from_bytes(&self.buffer[PACKET_HEADER_SIZE..])
    }
}
