//! Ring command construction and response classification
//!
//! This module builds outbound command packets and classifies inbound
//! traffic into typed [`RingUpdate`]s. Classification is pure: the same
//! bytes always produce the same updates, no I/O, no session state.
//! Responses the library does not recognize classify to informational
//! updates rather than errors so newer firmware never breaks the stream.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};

use crate::bigdata::{
    BigDataPacket, BIG_DATA_ID_HEART_RATE_LOG, BIG_DATA_ID_SLEEP, BIG_DATA_ID_TEMPERATURE,
};
use crate::features::{Feature, FeatureSupport};
use crate::packet::{encode_command, ResponsePacket, PACKET_LEN};
use crate::types::{RealtimeKind, Result, RingError, SleepStage};

/// Time sync; its response doubles as the capability handshake
pub const CMD_SET_TIME: u8 = 0x01;
/// Ring-side wake trigger control and notifications
pub const CMD_WAKE_GESTURE: u8 = 0x02;
/// Battery level and charging state
pub const CMD_BATTERY: u8 = 0x03;
/// Reboot the ring
pub const CMD_REBOOT: u8 = 0x08;
/// Blink the ring LED twice, used to identify a ring in pairing UIs
pub const CMD_BLINK_TWICE: u8 = 0x10;
/// Raw sensor stream control and streamed samples
pub const CMD_RAW_SENSOR: u8 = 0x21;
/// Today's accumulated activity counters
pub const CMD_ACTIVITY: u8 = 0x43;
/// Start or continue a realtime measurement stream
pub const CMD_START_REALTIME: u8 = 0x69;
/// Stop a realtime measurement stream
pub const CMD_STOP_REALTIME: u8 = 0x6A;

/// Subtype byte marking a streamed accelerometer sample
pub const RAW_SENSOR_ACCEL: u8 = 0x03;
/// Wake gesture payload byte signalling a ring-side trigger
pub const WAKE_GESTURE_TRIGGERED: u8 = 0x01;

/// Accelerometer counts per g in streamed samples
pub const ACCEL_COUNTS_PER_G: f64 = 512.0;

const REALTIME_ACTION_START: u8 = 0x01;
const REALTIME_ACTION_CONTINUE: u8 = 0x03;

/// An outbound request to the ring
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Sync the ring clock; the response carries the feature bitmask
    SetTime(DateTime<Local>),
    Battery,
    Reboot,
    BlinkTwice,
    /// Query today's step, calorie and distance counters
    Activity,
    StartRealtime(RealtimeKind),
    /// Keep-alive for an already running realtime stream
    ContinueRealtime(RealtimeKind),
    StopRealtime(RealtimeKind),
    /// Enable or disable the raw accelerometer stream
    RawSensor { enable: bool },
    /// Enable or disable ring-side wake trigger notifications
    WakeGesture { enable: bool },
}

impl Command {
    /// Logical command id written into packet byte 0
    pub fn id(&self) -> u8 {
        match self {
            Command::SetTime(_) => CMD_SET_TIME,
            Command::Battery => CMD_BATTERY,
            Command::Reboot => CMD_REBOOT,
            Command::BlinkTwice => CMD_BLINK_TWICE,
            Command::Activity => CMD_ACTIVITY,
            Command::StartRealtime(_) | Command::ContinueRealtime(_) => CMD_START_REALTIME,
            Command::StopRealtime(_) => CMD_STOP_REALTIME,
            Command::RawSensor { .. } => CMD_RAW_SENSOR,
            Command::WakeGesture { .. } => CMD_WAKE_GESTURE,
        }
    }

    /// Payload bytes before zero padding
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Command::SetTime(when) => bcd_datetime(when).to_vec(),
            Command::Battery | Command::Reboot | Command::BlinkTwice | Command::Activity => {
                Vec::new()
            }
            Command::StartRealtime(kind) => vec![kind.to_u8(), REALTIME_ACTION_START],
            Command::ContinueRealtime(kind) => vec![kind.to_u8(), REALTIME_ACTION_CONTINUE],
            Command::StopRealtime(kind) => vec![kind.to_u8(), 0x00],
            Command::RawSensor { enable } => vec![*enable as u8],
            Command::WakeGesture { enable } => vec![*enable as u8],
        }
    }

    /// Capability the ring must advertise before this command may be sent
    ///
    /// None means the command is mandatory for every ring.
    pub fn required_feature(&self) -> Option<Feature> {
        match self {
            Command::StartRealtime(kind)
            | Command::ContinueRealtime(kind)
            | Command::StopRealtime(kind) => realtime_feature(*kind),
            Command::RawSensor { .. } => Some(Feature::RawSensors),
            Command::WakeGesture { .. } => Some(Feature::Gesture),
            _ => None,
        }
    }

    /// Build the wire packet for this command
    pub fn encode(&self) -> Result<[u8; PACKET_LEN]> {
        encode_command(self.id(), &self.payload())
    }
}

fn realtime_feature(kind: RealtimeKind) -> Option<Feature> {
    match kind {
        RealtimeKind::HeartRate => Some(Feature::HeartRate),
        RealtimeKind::Spo2 => Some(Feature::Spo2),
        RealtimeKind::Stress => Some(Feature::Stress),
        RealtimeKind::BloodPressure => Some(Feature::BloodPressure),
        _ => None,
    }
}

fn bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// BCD `yy mm dd hh mm ss`, the layout the firmware's clock expects
fn bcd_datetime(when: &DateTime<Local>) -> [u8; 6] {
    [
        bcd((when.year() % 100) as u8),
        bcd(when.month() as u8),
        bcd(when.day() as u8),
        bcd(when.hour() as u8),
        bcd(when.minute() as u8),
        bcd(when.second() as u8),
    ]
}

/// One decoded sleep stage period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPeriod {
    pub stage: SleepStage,
    pub minutes: u8,
}

/// One decoded day of sleep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepDay {
    /// Days before the sync this night ended, 0 = last night
    pub days_ago: u8,
    /// Minutes after midnight the ring considers sleep start
    pub sleep_start_min: u16,
    /// Minutes after midnight the ring considers sleep end
    pub sleep_end_min: u16,
    pub periods: Vec<SleepPeriod>,
}

/// Decoded sleep history, newest day first as the ring sends it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepRecord {
    pub days: Vec<SleepDay>,
}

/// Decoded interval heart rate log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartRateLog {
    /// Hours the log covers
    pub range_hours: u8,
    /// Minutes between samples
    pub interval_min: u8,
    pub start: DateTime<Utc>,
    /// One bpm per interval; 0 means no measurement was taken
    pub samples: Vec<u8>,
}

/// One decoded skin temperature record
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub timestamp: DateTime<Utc>,
    pub celsius: f32,
}

/// A typed update decoded from ring traffic
#[derive(Debug, Clone, PartialEq)]
pub enum RingUpdate {
    Battery { level: u8, charging: bool },
    /// Capability mask from the handshake response
    SupportFlags(FeatureSupport),
    Activity { steps: u32, calories: u32, distance: u32 },
    Realtime { kind: RealtimeKind, value: u8 },
    /// The ring's own wake detection fired
    WakeTriggered,
    /// Acknowledgement of a wake gesture control command
    WakeDetectionState { enabled: bool },
    /// Acknowledgement of a raw sensor control command
    RawSensorState { enabled: bool },
    Sleep(SleepRecord),
    HeartRateLog(HeartRateLog),
    Temperature(Vec<TemperatureReading>),
    /// The ring flagged this command as failed
    CommandFailed { command: u8 },
    /// Response id this library does not know; informational, never an error
    Unrecognized { command: u8 },
    /// Big data id this library does not know
    UnrecognizedBigData { data_id: u8 },
}

/// Classify one verified response into typed updates
///
/// Error-flagged responses classify to [`RingUpdate::CommandFailed`]
/// regardless of payload. Streamed accelerometer samples (raw sensor id
/// with the accel subtype) classify to nothing; the session routes them
/// to the gesture recognizer before classification.
pub fn classify(packet: &ResponsePacket) -> Vec<RingUpdate> {
    if packet.is_error {
        return vec![RingUpdate::CommandFailed {
            command: packet.command,
        }];
    }

    let payload = &packet.payload;
    match packet.command {
        CMD_SET_TIME => vec![RingUpdate::SupportFlags(
            FeatureSupport::from_handshake_payload(payload),
        )],
        CMD_BATTERY => vec![RingUpdate::Battery {
            level: payload[0],
            charging: payload[1] != 0,
        }],
        CMD_ACTIVITY => vec![RingUpdate::Activity {
            steps: u24_le(&payload[0..3]),
            calories: u24_le(&payload[3..6]),
            distance: u24_le(&payload[6..9]),
        }],
        CMD_START_REALTIME | CMD_STOP_REALTIME => match RealtimeKind::from_u8(payload[0]) {
            Some(kind) => vec![RingUpdate::Realtime {
                kind,
                value: payload[1],
            }],
            None => vec![RingUpdate::Unrecognized {
                command: packet.command,
            }],
        },
        CMD_WAKE_GESTURE => {
            if payload[0] == WAKE_GESTURE_TRIGGERED {
                vec![RingUpdate::WakeTriggered]
            } else {
                vec![RingUpdate::WakeDetectionState {
                    enabled: payload[1] != 0,
                }]
            }
        }
        CMD_RAW_SENSOR => {
            if payload[0] == RAW_SENSOR_ACCEL {
                Vec::new()
            } else {
                vec![RingUpdate::RawSensorState {
                    enabled: payload[0] != 0,
                }]
            }
        }
        // Bare acknowledgements carry nothing worth surfacing
        CMD_REBOOT | CMD_BLINK_TWICE => Vec::new(),
        _ => vec![RingUpdate::Unrecognized {
            command: packet.command,
        }],
    }
}

/// Classify one big data frame by its data id
///
/// Truncated or implausible blobs are decode errors; the session logs and
/// drops them. Unknown data ids are informational, same contract as
/// unknown command ids.
pub fn classify_big_data(packet: &BigDataPacket) -> Result<Vec<RingUpdate>> {
    match packet.data_id {
        BIG_DATA_ID_SLEEP => Ok(vec![RingUpdate::Sleep(decode_sleep(&packet.data)?)]),
        BIG_DATA_ID_HEART_RATE_LOG => Ok(vec![RingUpdate::HeartRateLog(decode_heart_rate_log(
            &packet.data,
        )?)]),
        BIG_DATA_ID_TEMPERATURE => Ok(vec![RingUpdate::Temperature(decode_temperature(
            &packet.data,
        )?)]),
        _ => Ok(vec![RingUpdate::UnrecognizedBigData {
            data_id: packet.data_id,
        }]),
    }
}

/// Parse a streamed accelerometer packet into g-unit axes
///
/// Returns None for anything that is not a sample; control
/// acknowledgements share the command id.
pub fn parse_raw_accel(packet: &ResponsePacket) -> Option<(f64, f64, f64)> {
    if packet.command != CMD_RAW_SENSOR || packet.is_error || packet.payload[0] != RAW_SENSOR_ACCEL
    {
        return None;
    }
    let p = &packet.payload;
    let axis = |lo: usize| i16::from_le_bytes([p[lo], p[lo + 1]]) as f64 / ACCEL_COUNTS_PER_G;
    Some((axis(1), axis(3), axis(5)))
}

fn u24_le(bytes: &[u8]) -> u32 {
    bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16
}

/// Sleep blob: `[days]`, then per day `[days_ago, day_len, start u16 LE,
/// end u16 LE, (stage, minutes)*]` where day_len counts the bytes after
/// itself.
fn decode_sleep(data: &[u8]) -> Result<SleepRecord> {
    if data.is_empty() {
        return Err(RingError::InvalidPayload("empty sleep blob".to_string()));
    }

    let day_count = data[0] as usize;
    let mut days = Vec::with_capacity(day_count);
    let mut offset = 1;

    for _ in 0..day_count {
        if data.len() < offset + 6 {
            return Err(RingError::InvalidPayload(format!(
                "sleep blob truncated at offset {}",
                offset
            )));
        }
        let days_ago = data[offset];
        let day_len = data[offset + 1] as usize;
        if day_len < 4 || data.len() < offset + 2 + day_len {
            return Err(RingError::InvalidPayload(format!(
                "sleep day at offset {} declares {} bytes, blob holds {}",
                offset,
                day_len,
                data.len() - offset - 2
            )));
        }

        let sleep_start_min = u16::from_le_bytes([data[offset + 2], data[offset + 3]]);
        let sleep_end_min = u16::from_le_bytes([data[offset + 4], data[offset + 5]]);

        let stage_bytes = &data[offset + 6..offset + 2 + day_len];
        if stage_bytes.len() % 2 != 0 {
            return Err(RingError::InvalidPayload(format!(
                "sleep day at offset {} has a dangling stage byte",
                offset
            )));
        }
        let mut periods = Vec::with_capacity(stage_bytes.len() / 2);
        for pair in stage_bytes.chunks_exact(2) {
            let stage = SleepStage::from_u8(pair[0]).ok_or_else(|| {
                RingError::InvalidPayload(format!("unknown sleep stage {}", pair[0]))
            })?;
            periods.push(SleepPeriod {
                stage,
                minutes: pair[1],
            });
        }

        days.push(SleepDay {
            days_ago,
            sleep_start_min,
            sleep_end_min,
            periods,
        });
        offset += 2 + day_len;
    }

    Ok(SleepRecord { days })
}

/// Heart rate log blob: `[range_hours, interval_min, start u32 LE unix
/// seconds, (bpm)*]`. Zero bpm entries mean no measurement and are kept;
/// filtering is a caller concern.
fn decode_heart_rate_log(data: &[u8]) -> Result<HeartRateLog> {
    if data.len() < 6 {
        return Err(RingError::InvalidPayload(
            "heart rate log header truncated".to_string(),
        ));
    }
    let secs = u32::from_le_bytes([data[2], data[3], data[4], data[5]]);
    let start = parse_timestamp(secs)?;
    Ok(HeartRateLog {
        range_hours: data[0],
        interval_min: data[1],
        start,
        samples: data[6..].to_vec(),
    })
}

/// Temperature blob: repeated `(timestamp u32 LE, decicelsius i16 LE)`
fn decode_temperature(data: &[u8]) -> Result<Vec<TemperatureReading>> {
    if data.len() % 6 != 0 {
        return Err(RingError::InvalidPayload(format!(
            "temperature blob length {} is not a whole number of records",
            data.len()
        )));
    }
    let mut readings = Vec::with_capacity(data.len() / 6);
    for record in data.chunks_exact(6) {
        let secs = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
        let raw = i16::from_le_bytes([record[4], record[5]]);
        readings.push(TemperatureReading {
            timestamp: parse_timestamp(secs)?,
            celsius: raw as f32 / 10.0,
        });
    }
    Ok(readings)
}

fn parse_timestamp(secs: u32) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .ok_or_else(|| RingError::InvalidPayload(format!("implausible timestamp {}", secs)))
}
