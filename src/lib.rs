//! Colmi R02 BLE Communication Protocol
//!
//! This library provides a Rust implementation of the Colmi R02 smart ring
//! Bluetooth Low Energy protocol, including the 16 byte command packet codec,
//! the framed big data channel, serialized command dispatch and rotation
//! gesture recognition. The host supplies the BLE transport; this crate turns
//! raw characteristic bytes into typed updates and back.
//!
//! # Modules
//!
//! - `packet`: command packet encoding/decoding with checksum verification
//! - `bigdata`: big data framing, CRC16 and chunk reassembly
//! - `messages`: command construction and response classification
//! - `dispatch`: serialized command queue with one command in flight
//! - `session`: connection-scoped session tying the pieces together
//! - `types`: common types and enums used throughout the library

pub mod bigdata;
pub mod dispatch;
pub mod features;
pub mod gesture;
pub mod messages;
pub mod packet;
pub mod session;
pub mod types;

pub use bigdata::{
    decode_big_data, encode_big_data, BigDataAssembler, BigDataPacket, BIG_DATA_MAGIC,
};
pub use dispatch::{CommandDispatcher, DispatcherConfig, PacketSink};
pub use features::{Feature, FeatureSupport};
pub use gesture::{
    GestureConfig, GestureEvent, GesturePhase, GestureRecognizer, ScrollDirection, SensorSample,
};
pub use messages::{
    classify, classify_big_data, parse_raw_accel, Command, HeartRateLog, RingUpdate, SleepDay,
    SleepPeriod, SleepRecord, TemperatureReading,
};
pub use packet::{decode_response, encode_command, ResponsePacket, PACKET_LEN, PAYLOAD_LEN};
pub use session::{
    FirmwareQuirks, GestureListener, RingSession, RingTransport, SessionConfig, UpdateListener,
};
pub use types::{RealtimeKind, Result, RingError, SleepStage};
