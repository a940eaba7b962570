//! Big data framing and reassembly
//!
//! Payloads too large for the 14-byte command packet (sleep history, the
//! interval heart rate log, temperature records) travel on a second GATT
//! service with their own framing: a magic byte, a data id, a little-endian
//! length, the data itself and a CRC16 trailer. Frames routinely span
//! several MTU-sized notifications, so inbound bytes go through
//! [`BigDataAssembler`] which buffers until a whole frame is available.

use std::time::{Duration, Instant};

use log::warn;

use crate::types::{Result, RingError};

/// First byte of every big data frame
pub const BIG_DATA_MAGIC: u8 = 0xBC;

/// Frame bytes surrounding the data section (magic, id, length, crc)
pub const BIG_DATA_OVERHEAD: usize = 6;

/// Sleep history blob
pub const BIG_DATA_ID_SLEEP: u8 = 0x27;

/// Interval heart rate log blob
pub const BIG_DATA_ID_HEART_RATE_LOG: u8 = 0x2A;

/// Temperature history blob
pub const BIG_DATA_ID_TEMPERATURE: u8 = 0x25;

/// Default assembler inactivity timeout in milliseconds
const BUFFER_TIMEOUT_MS: u64 = 1500;

/// A decoded big data frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigDataPacket {
    pub data_id: u8,
    pub data: Vec<u8>,
}

fn crc16_update(mut crc: u16, byte: u8) -> u16 {
    crc ^= byte as u16;
    for _ in 0..8 {
        if crc & 1 != 0 {
            crc = (crc >> 1) ^ 0xA001;
        } else {
            crc >>= 1;
        }
    }
    crc
}

/// CRC16 with the reflected 0xA001 polynomial, seeded with 0xFFFF
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &byte| crc16_update(crc, byte))
}

/// CRC over the covered portion of a frame: magic, data id and data.
/// The length field is not covered.
fn frame_crc(data_id: u8, data: &[u8]) -> u16 {
    let mut crc = crc16_update(0xFFFF, BIG_DATA_MAGIC);
    crc = crc16_update(crc, data_id);
    data.iter().fold(crc, |crc, &byte| crc16_update(crc, byte))
}

/// Build one big data frame around `data`
///
/// Fails with `PayloadTooLarge` when `data` overflows the u16 length
/// field.
pub fn encode_big_data(data_id: u8, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() > u16::MAX as usize {
        return Err(RingError::PayloadTooLarge {
            len: data.len(),
            limit: u16::MAX as usize,
        });
    }
    let mut frame = Vec::with_capacity(BIG_DATA_OVERHEAD + data.len());
    frame.push(BIG_DATA_MAGIC);
    frame.push(data_id);
    frame.extend_from_slice(&(data.len() as u16).to_le_bytes());
    frame.extend_from_slice(data);
    frame.extend_from_slice(&frame_crc(data_id, data).to_le_bytes());
    Ok(frame)
}

/// Decode and verify one complete big data frame
pub fn decode_big_data(bytes: &[u8]) -> Result<BigDataPacket> {
    if bytes.len() < BIG_DATA_OVERHEAD {
        return Err(RingError::LengthMismatch {
            expected: BIG_DATA_OVERHEAD,
            got: bytes.len(),
        });
    }
    if bytes[0] != BIG_DATA_MAGIC {
        return Err(RingError::InvalidMagic { got: bytes[0] });
    }

    let declared = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    let total = BIG_DATA_OVERHEAD + declared;
    if bytes.len() != total {
        return Err(RingError::LengthMismatch {
            expected: total,
            got: bytes.len(),
        });
    }

    let data_id = bytes[1];
    let data = &bytes[4..4 + declared];
    let expected = frame_crc(data_id, data);
    let got = u16::from_le_bytes([bytes[total - 2], bytes[total - 1]]);
    if expected != got {
        return Err(RingError::CrcMismatch { expected, got });
    }

    Ok(BigDataPacket {
        data_id,
        data: data.to_vec(),
    })
}

/// Reassembles big data frames from notification-sized chunks
///
/// The buffer is cleared after a period of inactivity so a half-received
/// frame from a dropped transfer cannot poison the next one.
pub struct BigDataAssembler {
    buffer: Vec<u8>,
    last_receive: Option<Instant>,
    buffer_timeout: Duration,
}

impl Default for BigDataAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl BigDataAssembler {
    /// Create a new assembler with the default timeout
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(BUFFER_TIMEOUT_MS))
    }

    /// Create a new assembler with a custom inactivity timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            last_receive: None,
            buffer_timeout: timeout,
        }
    }

    /// Feed one notification worth of bytes, returning any frames it
    /// completed
    ///
    /// A corrupt or out-of-sync frame abandons the whole buffer; the ring
    /// resends nothing, so the only way back in sync is a fresh request.
    pub fn receive(&mut self, chunk: &[u8]) -> Vec<BigDataPacket> {
        let now = Instant::now();
        if let Some(last) = self.last_receive {
            if now.duration_since(last) > self.buffer_timeout && !self.buffer.is_empty() {
                warn!("Dropping {} stale big data bytes", self.buffer.len());
                self.buffer.clear();
            }
        }
        self.last_receive = Some(now);
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            if self.buffer.is_empty() {
                break;
            }
            if self.buffer[0] != BIG_DATA_MAGIC {
                warn!(
                    "Big data stream out of sync (leading byte 0x{:02X}), dropping {} bytes",
                    self.buffer[0],
                    self.buffer.len()
                );
                self.buffer.clear();
                break;
            }
            if self.buffer.len() < 4 {
                break;
            }
            let declared = u16::from_le_bytes([self.buffer[2], self.buffer[3]]) as usize;
            let total = BIG_DATA_OVERHEAD + declared;
            if self.buffer.len() < total {
                break;
            }
            let frame: Vec<u8> = self.buffer.drain(..total).collect();
            match decode_big_data(&frame) {
                Ok(packet) => frames.push(packet),
                Err(err) => {
                    warn!("Dropping corrupt big data frame: {}", err);
                    self.buffer.clear();
                    break;
                }
            }
        }
        frames
    }

    /// Bytes of an incomplete frame currently buffered
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer, used on disconnect
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_receive = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus_check_value() {
        // Catalogue check value for CRC-16 with poly 0xA001 seeded 0xFFFF
        assert_eq!(crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_crc16_is_deterministic() {
        let data = vec![0xBC, 0x27, 0x05, 0x00, 1, 2, 3, 4, 5];
        assert_eq!(crc16(&data), crc16(&data));
    }

    #[test]
    fn test_encode_empty_frame_bytes() {
        let frame = encode_big_data(0x00, &[]).unwrap();
        assert_eq!(frame, vec![0xBC, 0x00, 0x00, 0x00, 0x71, 0x70]);
    }

    #[test]
    fn test_roundtrip_lengths() {
        for len in [0usize, 1, 240] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let frame = encode_big_data(BIG_DATA_ID_SLEEP, &data).unwrap();
            assert_eq!(frame.len(), BIG_DATA_OVERHEAD + len);
            let decoded = decode_big_data(&frame).unwrap();
            assert_eq!(decoded.data_id, BIG_DATA_ID_SLEEP);
            assert_eq!(decoded.data, data);
        }
    }

    #[test]
    fn test_encode_rejects_oversize_data() {
        let data = vec![0xAB; 70_000];
        assert!(matches!(
            encode_big_data(BIG_DATA_ID_SLEEP, &data),
            Err(RingError::PayloadTooLarge {
                len: 70_000,
                limit: 65_535,
            })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut frame = encode_big_data(0x27, &[1, 2, 3]).unwrap();
        frame[0] = 0xBD;
        assert!(matches!(
            decode_big_data(&frame),
            Err(RingError::InvalidMagic { got: 0xBD })
        ));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let mut frame = encode_big_data(0x27, &[1, 2, 3]).unwrap();
        frame.pop();
        assert!(matches!(
            decode_big_data(&frame),
            Err(RingError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_crc() {
        let mut frame = encode_big_data(0x27, &[1, 2, 3]).unwrap();
        let data_start = 4;
        frame[data_start] ^= 0xFF;
        assert!(matches!(
            decode_big_data(&frame),
            Err(RingError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_length_field_not_covered_by_crc() {
        // Corrupting the length field must still fail, via the size check
        let mut frame = encode_big_data(0x27, &[1, 2, 3]).unwrap();
        frame[2] = frame[2].wrapping_add(1);
        assert!(matches!(
            decode_big_data(&frame),
            Err(RingError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_assembler_reassembles_split_frame() {
        let data: Vec<u8> = (0..40).collect();
        let frame = encode_big_data(BIG_DATA_ID_SLEEP, &data).unwrap();

        let mut assembler = BigDataAssembler::new();
        let (first, second) = frame.split_at(20);
        assert!(assembler.receive(first).is_empty());
        assert_eq!(assembler.pending_bytes(), 20);

        let frames = assembler.receive(second);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, data);
        assert_eq!(assembler.pending_bytes(), 0);
    }

    #[test]
    fn test_assembler_handles_back_to_back_frames() {
        let frame_a = encode_big_data(BIG_DATA_ID_SLEEP, &[1, 2, 3]).unwrap();
        let frame_b = encode_big_data(BIG_DATA_ID_TEMPERATURE, &[4, 5]).unwrap();
        let mut combined = frame_a.clone();
        combined.extend_from_slice(&frame_b);

        let mut assembler = BigDataAssembler::new();
        let frames = assembler.receive(&combined);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data_id, BIG_DATA_ID_SLEEP);
        assert_eq!(frames[1].data_id, BIG_DATA_ID_TEMPERATURE);
    }

    #[test]
    fn test_assembler_drops_stale_partial() {
        let frame = encode_big_data(BIG_DATA_ID_SLEEP, &[1, 2, 3, 4]).unwrap();
        let mut assembler = BigDataAssembler::with_timeout(Duration::from_millis(1));

        assert!(assembler.receive(&frame[..5]).is_empty());
        std::thread::sleep(Duration::from_millis(10));

        // The stale half-frame is discarded, so a fresh frame decodes cleanly
        let frames = assembler.receive(&frame);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_assembler_resyncs_after_garbage() {
        let mut assembler = BigDataAssembler::new();
        assert!(assembler.receive(&[0x00, 0x01, 0x02]).is_empty());
        assert_eq!(assembler.pending_bytes(), 0);

        let frame = encode_big_data(BIG_DATA_ID_SLEEP, &[9, 9]).unwrap();
        let frames = assembler.receive(&frame);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_assembler_reset_clears_buffer() {
        let frame = encode_big_data(BIG_DATA_ID_SLEEP, &[1, 2, 3, 4]).unwrap();
        let mut assembler = BigDataAssembler::new();
        assembler.receive(&frame[..5]);
        assert!(assembler.pending_bytes() > 0);
        assembler.reset();
        assert_eq!(assembler.pending_bytes(), 0);
    }
}
