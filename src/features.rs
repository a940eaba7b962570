//! Ring capability negotiation
//!
//! The time-sync handshake response carries a bitmask describing which
//! optional subsystems this ring and firmware revision actually have. The
//! session decodes it once per connection into a [`FeatureSupport`] set and
//! checks optional commands against it before anything touches the
//! transport. Raw bit positions live in this module only.

use std::fmt;

use crate::types::{Result, RingError};

/// One optional ring capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Feature {
    HeartRate = 0,
    Spo2 = 1,
    Temperature = 2,
    Gesture = 3,
    RawSensors = 4,
    Stress = 5,
    Sleep = 6,
    BloodPressure = 7,
}

impl Feature {
    /// Every feature a bitmask can advertise, in bit order
    pub const ALL: [Feature; 8] = [
        Feature::HeartRate,
        Feature::Spo2,
        Feature::Temperature,
        Feature::Gesture,
        Feature::RawSensors,
        Feature::Stress,
        Feature::Sleep,
        Feature::BloodPressure,
    ];

    fn bit(self) -> u16 {
        1 << (self as u8)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::HeartRate => write!(f, "heart rate"),
            Feature::Spo2 => write!(f, "SpO2"),
            Feature::Temperature => write!(f, "temperature"),
            Feature::Gesture => write!(f, "gesture"),
            Feature::RawSensors => write!(f, "raw sensors"),
            Feature::Stress => write!(f, "stress"),
            Feature::Sleep => write!(f, "sleep"),
            Feature::BloodPressure => write!(f, "blood pressure"),
        }
    }
}

/// The set of capabilities a ring advertised during the handshake
///
/// Immutable for the lifetime of a connection; a reconnect renegotiates
/// from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSupport {
    bits: u16,
}

impl FeatureSupport {
    /// The empty set, also the state before any handshake completed
    pub fn empty() -> Self {
        Self { bits: 0 }
    }

    /// Build a set from a raw bitmask. Bits this library does not know
    /// are kept so `bits()` stays faithful to the wire.
    pub fn from_bits(bits: u16) -> Self {
        Self { bits }
    }

    /// Decode the support mask from a handshake response payload
    /// (u16 little-endian at offset 0)
    pub fn from_handshake_payload(payload: &[u8]) -> Self {
        if payload.len() < 2 {
            return Self::empty();
        }
        Self::from_bits(u16::from_le_bytes([payload[0], payload[1]]))
    }

    /// The raw bitmask as received
    pub fn bits(self) -> u16 {
        self.bits
    }

    pub fn contains(self, feature: Feature) -> bool {
        self.bits & feature.bit() != 0
    }

    pub fn insert(&mut self, feature: Feature) {
        self.bits |= feature.bit();
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// Iterate the advertised features in bit order
    pub fn iter(self) -> impl Iterator<Item = Feature> {
        Feature::ALL.iter().copied().filter(move |f| self.contains(*f))
    }

    /// Gate used before optional commands are enqueued
    ///
    /// Fails fast, before any I/O, when the capability is missing. An
    /// empty set (handshake not yet done) rejects everything optional.
    pub fn require(self, feature: Feature) -> Result<()> {
        if self.contains(feature) {
            Ok(())
        } else {
            Err(RingError::UnsupportedFeature(feature))
        }
    }
}

impl fmt::Display for FeatureSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<String> = self.iter().map(|feature| feature.to_string()).collect();
        write!(f, "{}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bits_contains() {
        let support = FeatureSupport::from_bits(0b0000_0101);
        assert!(support.contains(Feature::HeartRate));
        assert!(support.contains(Feature::Temperature));
        assert!(!support.contains(Feature::Spo2));
        assert!(!support.contains(Feature::Sleep));
    }

    #[test]
    fn test_handshake_payload_decode() {
        // bits 0, 1, 4 and 6: heart rate, SpO2, raw sensors, sleep
        let support = FeatureSupport::from_handshake_payload(&[0x53, 0x00, 0xFF]);
        assert!(support.contains(Feature::HeartRate));
        assert!(support.contains(Feature::Spo2));
        assert!(support.contains(Feature::RawSensors));
        assert!(support.contains(Feature::Sleep));
        assert!(!support.contains(Feature::Temperature));
        assert!(!support.contains(Feature::Gesture));
    }

    #[test]
    fn test_short_payload_is_empty() {
        let support = FeatureSupport::from_handshake_payload(&[0x01]);
        assert!(support.is_empty());
    }

    #[test]
    fn test_unknown_bits_are_preserved() {
        let support = FeatureSupport::from_bits(0xFF00);
        assert_eq!(support.bits(), 0xFF00);
        assert!(!support.contains(Feature::HeartRate));
    }

    #[test]
    fn test_require() {
        let mut support = FeatureSupport::empty();
        assert!(matches!(
            support.require(Feature::Spo2),
            Err(RingError::UnsupportedFeature(Feature::Spo2))
        ));
        support.insert(Feature::Spo2);
        assert!(support.require(Feature::Spo2).is_ok());
    }

    #[test]
    fn test_iter_in_bit_order() {
        let support = FeatureSupport::from_bits(0b0100_1001);
        let features: Vec<Feature> = support.iter().collect();
        assert_eq!(
            features,
            vec![Feature::HeartRate, Feature::Gesture, Feature::Sleep]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", FeatureSupport::empty()), "none");
        let support = FeatureSupport::from_bits(0b0000_0011);
        assert_eq!(format!("{}", support), "heart rate, SpO2");
    }
}
