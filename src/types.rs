//! Common types, enums, and error definitions for the ring protocol

use std::fmt;
use thiserror::Error;

use crate::features::Feature;

/// Result type alias for ring operations
pub type Result<T> = std::result::Result<T, RingError>;

/// Error types for ring communication
#[derive(Error, Debug)]
pub enum RingError {
    #[error("Payload too large: {len} bytes (limit {limit})")]
    PayloadTooLarge { len: usize, limit: usize },

    #[error("Invalid command id: 0x{id:02X}")]
    InvalidCommandId { id: u8 },

    #[error("Wrong packet length: expected {expected}, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{got:02X}")]
    ChecksumMismatch { expected: u8, got: u8 },

    #[error("Invalid big data magic: 0x{got:02X}")]
    InvalidMagic { got: u8 },

    #[error("Big data length mismatch: expected {expected} byte frame, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{got:04X}")]
    CrcMismatch { expected: u16, got: u16 },

    #[error("Command 0x{command:02X} timed out")]
    CommandTimeout { command: u8 },

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(Feature),

    #[error("Command cancelled by disconnect")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Measurement kinds the ring can stream in realtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RealtimeKind {
    HeartRate = 1,
    BloodPressure = 2,
    Spo2 = 3,
    Fatigue = 4,
    HealthCheck = 5,
    Ecg = 6,
    Stress = 7,
    BloodSugar = 8,
    Hrv = 9,
}

impl RealtimeKind {
    /// Convert a byte to a RealtimeKind
    ///
    /// Unknown values return None so newer firmware never turns into a
    /// hard error during classification.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RealtimeKind::HeartRate),
            2 => Some(RealtimeKind::BloodPressure),
            3 => Some(RealtimeKind::Spo2),
            4 => Some(RealtimeKind::Fatigue),
            5 => Some(RealtimeKind::HealthCheck),
            6 => Some(RealtimeKind::Ecg),
            7 => Some(RealtimeKind::Stress),
            8 => Some(RealtimeKind::BloodSugar),
            9 => Some(RealtimeKind::Hrv),
            _ => None,
        }
    }

    /// Convert RealtimeKind to a byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RealtimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RealtimeKind::HeartRate => write!(f, "heart rate"),
            RealtimeKind::BloodPressure => write!(f, "blood pressure"),
            RealtimeKind::Spo2 => write!(f, "SpO2"),
            RealtimeKind::Fatigue => write!(f, "fatigue"),
            RealtimeKind::HealthCheck => write!(f, "health check"),
            RealtimeKind::Ecg => write!(f, "ECG"),
            RealtimeKind::Stress => write!(f, "stress"),
            RealtimeKind::BloodSugar => write!(f, "blood sugar"),
            RealtimeKind::Hrv => write!(f, "HRV"),
        }
    }
}

/// Sleep stages recorded in the sleep history blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SleepStage {
    Light = 2,
    Deep = 3,
    Rem = 4,
    Awake = 5,
}

impl SleepStage {
    /// Convert a byte to a SleepStage
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            2 => Some(SleepStage::Light),
            3 => Some(SleepStage::Deep),
            4 => Some(SleepStage::Rem),
            5 => Some(SleepStage::Awake),
            _ => None,
        }
    }

    /// Convert SleepStage to a byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepStage::Light => write!(f, "light"),
            SleepStage::Deep => write!(f, "deep"),
            SleepStage::Rem => write!(f, "REM"),
            SleepStage::Awake => write!(f, "awake"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_kind_conversion() {
        assert_eq!(RealtimeKind::from_u8(1).unwrap(), RealtimeKind::HeartRate);
        assert_eq!(RealtimeKind::from_u8(3).unwrap(), RealtimeKind::Spo2);
        assert_eq!(RealtimeKind::from_u8(0), None);
        assert_eq!(RealtimeKind::from_u8(10), None);
    }

    #[test]
    fn test_realtime_kind_to_u8() {
        for value in 1..=9u8 {
            assert_eq!(RealtimeKind::from_u8(value).unwrap().to_u8(), value);
        }
    }

    #[test]
    fn test_sleep_stage_conversion() {
        assert_eq!(SleepStage::from_u8(2).unwrap(), SleepStage::Light);
        assert_eq!(SleepStage::from_u8(5).unwrap(), SleepStage::Awake);
        assert_eq!(SleepStage::from_u8(0), None);
        assert_eq!(SleepStage::from_u8(6), None);
    }

    #[test]
    fn test_error_display() {
        let err = RingError::ChecksumMismatch {
            expected: 0x59,
            got: 0x5A,
        };
        assert_eq!(
            format!("{}", err),
            "Checksum mismatch: expected 0x59, got 0x5A"
        );

        let err = RingError::CommandTimeout { command: 0x03 };
        assert_eq!(format!("{}", err), "Command 0x03 timed out");
    }
}
