//! Fixed-size command packet codec
//!
//! Every exchange on the ring's command characteristic is exactly 16 bytes:
//! a command id, 14 payload bytes (zero padded) and an additive mod-256
//! checksum over the first 15 bytes. Responses reuse the same shape; the
//! high bit of the command byte is set when the ring reports the command
//! failed, so logical command ids occupy the low 7 bits only.

use crate::types::{Result, RingError};

/// Wire size of every command and response packet
pub const PACKET_LEN: usize = 16;

/// Payload area within a packet
pub const PAYLOAD_LEN: usize = 14;

/// Low 7 bits of the command byte carry the logical command id
pub const COMMAND_ID_MASK: u8 = 0x7F;

/// High bit of the command byte, set on responses that report an error
pub const ERROR_FLAG: u8 = 0x80;

/// A decoded 16-byte response from the ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    /// Logical command id with the error flag stripped
    pub command: u8,
    pub payload: [u8; PAYLOAD_LEN],
    /// True when the ring flagged the command as failed
    pub is_error: bool,
}

/// Additive mod-256 checksum over a byte slice
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Build a 16-byte command packet with the payload zero padded
///
/// The checksum is not cryptographic; it exists to catch transmission
/// errors on the BLE link.
pub fn encode_command(command: u8, payload: &[u8]) -> Result<[u8; PACKET_LEN]> {
    if command & ERROR_FLAG != 0 {
        return Err(RingError::InvalidCommandId { id: command });
    }
    if payload.len() > PAYLOAD_LEN {
        return Err(RingError::PayloadTooLarge {
            len: payload.len(),
            limit: PAYLOAD_LEN,
        });
    }

    let mut packet = [0u8; PACKET_LEN];
    packet[0] = command;
    packet[1..1 + payload.len()].copy_from_slice(payload);
    packet[PACKET_LEN - 1] = checksum(&packet[..PACKET_LEN - 1]);
    Ok(packet)
}

/// Decode and verify one 16-byte response
///
/// A checksum mismatch means the packet was corrupted in transit; callers
/// log and drop it, the ring never retransmits.
pub fn decode_response(bytes: &[u8]) -> Result<ResponsePacket> {
    if bytes.len() != PACKET_LEN {
        return Err(RingError::WrongLength {
            expected: PACKET_LEN,
            got: bytes.len(),
        });
    }

    let expected = checksum(&bytes[..PACKET_LEN - 1]);
    let got = bytes[PACKET_LEN - 1];
    if expected != got {
        return Err(RingError::ChecksumMismatch { expected, got });
    }

    let mut payload = [0u8; PAYLOAD_LEN];
    payload.copy_from_slice(&bytes[1..PACKET_LEN - 1]);

    Ok(ResponsePacket {
        command: bytes[0] & COMMAND_ID_MASK,
        payload,
        is_error: bytes[0] & ERROR_FLAG != 0,
    })
}
