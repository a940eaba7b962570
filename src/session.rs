//! Connection-scoped session tying the protocol pieces together
//!
//! The session owns the dispatcher, the capability table, the big data
//! assembler and the gesture recognizer for one ring connection. Host
//! BLE plumbing stays outside: the host implements [`RingTransport`]
//! for writes, feeds command-channel notifications through
//! [`RingSession::handle_notification`] and big data chunks through
//! [`RingSession::handle_big_data`], and reports link state through
//! [`RingSession::connection_changed`].

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Local;
use log::{debug, info, warn};
use uuid::{uuid, Uuid};

use crate::bigdata::{
    encode_big_data, BigDataAssembler, BIG_DATA_ID_HEART_RATE_LOG, BIG_DATA_ID_SLEEP,
    BIG_DATA_ID_TEMPERATURE,
};
use crate::dispatch::{CommandDispatcher, DispatcherConfig, PacketSink};
use crate::features::{Feature, FeatureSupport};
use crate::gesture::{GestureConfig, GestureEvent, GesturePhase, GestureRecognizer, SensorSample};
use crate::messages::{classify, classify_big_data, parse_raw_accel, Command, RingUpdate};
use crate::packet::{decode_response, encode_command, ResponsePacket, PACKET_LEN};
use crate::types::Result;

/// Nordic UART style service carrying 16 byte command packets
pub const COMMAND_SERVICE_UUID: Uuid = uuid!("6e40fff0-b5a3-f393-e0a9-e50e24dcca9e");
/// Write characteristic for command packets
pub const COMMAND_WRITE_UUID: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");
/// Notify characteristic for command responses and streams
pub const COMMAND_NOTIFY_UUID: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");
/// Service carrying framed big data transfers
pub const BIG_DATA_SERVICE_UUID: Uuid = uuid!("de5bf728-d711-4e47-af26-65e3012a5dc7");
/// Write characteristic for big data requests
pub const BIG_DATA_WRITE_UUID: Uuid = uuid!("de5bf72a-d711-4e47-af26-65e3012a5dc7");
/// Notify characteristic for big data frames
pub const BIG_DATA_NOTIFY_UUID: Uuid = uuid!("de5bf729-d711-4e47-af26-65e3012a5dc7");

/// Host-side BLE writes for one connected ring
#[async_trait::async_trait]
pub trait RingTransport: Send + Sync {
    /// Write one command packet to the command service
    async fn write_command(&self, packet: &[u8; PACKET_LEN]) -> Result<()>;
    /// Write one framed request to the big data service
    async fn write_big_data(&self, frame: &[u8]) -> Result<()>;
}

/// Receives updates the ring sent on its own
pub trait UpdateListener: Send + Sync {
    fn on_update(&self, update: &RingUpdate);
}

/// Receives gesture events from the recognizer
pub trait GestureListener: Send + Sync {
    fn on_gesture(&self, event: &GestureEvent);
}

/// Adapts the command side of a [`RingTransport`] to the dispatcher
struct CommandChannelSink {
    transport: Arc<dyn RingTransport>,
}

#[async_trait::async_trait]
impl PacketSink for CommandChannelSink {
    async fn write_packet(&self, packet: &[u8; PACKET_LEN]) -> Result<()> {
        self.transport.write_command(packet).await
    }
}

/// Firmware oddities the session papers over
#[derive(Debug, Clone, Copy, Default)]
pub struct FirmwareQuirks {
    /// Some firmware revisions report calories multiplied by ten
    pub calories_reported_times_ten: bool,
}

/// Session tuning; the defaults suit stock rings
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub dispatcher: DispatcherConfig,
    pub gesture: GestureConfig,
    pub quirks: FirmwareQuirks,
}

struct SessionState {
    connected: bool,
    handshake_done: bool,
    features: FeatureSupport,
    gesture: GestureRecognizer,
    assembler: BigDataAssembler,
    update_listeners: Vec<Arc<dyn UpdateListener>>,
    gesture_listeners: Vec<Arc<dyn GestureListener>>,
}

/// One ring connection's worth of protocol state
pub struct RingSession {
    dispatcher: CommandDispatcher,
    transport: Arc<dyn RingTransport>,
    state: Mutex<SessionState>,
    quirks: FirmwareQuirks,
    started_at: Instant,
}

impl RingSession {
    pub fn new(transport: Arc<dyn RingTransport>, config: SessionConfig) -> Arc<Self> {
        let sink = Arc::new(CommandChannelSink {
            transport: Arc::clone(&transport),
        });
        Arc::new(RingSession {
            dispatcher: CommandDispatcher::new(sink, config.dispatcher),
            transport,
            state: Mutex::new(SessionState {
                connected: false,
                handshake_done: false,
                features: FeatureSupport::empty(),
                gesture: GestureRecognizer::new(config.gesture),
                assembler: BigDataAssembler::new(),
                update_listeners: Vec::new(),
                gesture_listeners: Vec::new(),
            }),
            quirks: config.quirks,
            started_at: Instant::now(),
        })
    }

    /// Tell the session the BLE link came up or went down
    ///
    /// Going down fails every pending command and clears all
    /// per-connection state; the next handshake re-learns the
    /// capability table.
    pub fn connection_changed(&self, connected: bool) {
        if connected {
            info!("Ring connected");
            self.state.lock().unwrap().connected = true;
            self.dispatcher.start();
        } else {
            info!("Ring disconnected");
            {
                let mut state = self.state.lock().unwrap();
                state.connected = false;
                state.handshake_done = false;
                state.features = FeatureSupport::empty();
                state.gesture.reset();
                state.assembler.reset();
            }
            self.dispatcher.cancel_all();
            self.dispatcher.close();
        }
    }

    /// Sync the ring clock and learn what this ring can do
    ///
    /// Must run once per connection before any capability-gated
    /// command.
    pub async fn initialize(&self) -> Result<FeatureSupport> {
        self.execute(Command::SetTime(Local::now())).await?;
        let features = self.state.lock().unwrap().features;
        info!("Ring handshake complete, supports: {}", features);
        Ok(features)
    }

    /// Run one command through the serialized queue and classify its
    /// response
    ///
    /// Capability-gated commands fail before touching the transport
    /// when the ring does not advertise the feature.
    pub async fn execute(&self, command: Command) -> Result<Vec<RingUpdate>> {
        if let Some(feature) = command.required_feature() {
            let features = self.state.lock().unwrap().features;
            features.require(feature)?;
        }
        let packet = command.encode()?;
        let response = self.dispatcher.execute(command.id(), packet).await?;
        Ok(self.apply_updates(classify(&response)))
    }

    /// Send an arbitrary command id and payload, for ids this library
    /// does not model
    pub async fn execute_raw(&self, command: u8, payload: &[u8]) -> Result<ResponsePacket> {
        let packet = encode_command(command, payload)?;
        self.dispatcher.execute(command, packet).await
    }

    /// Feed one notification from the command channel
    ///
    /// Corrupt packets are logged and dropped. Streamed accelerometer
    /// samples go straight to the gesture recognizer; responses that
    /// match the in-flight command resolve it and everything else is
    /// classified and fanned out.
    pub async fn handle_notification(&self, bytes: &[u8]) {
        let response = match decode_response(bytes) {
            Ok(response) => response,
            Err(err) => {
                warn!("Dropping corrupt packet: {}", err);
                return;
            }
        };

        if let Some((x, y, z)) = parse_raw_accel(&response) {
            let sample = SensorSample {
                x,
                y,
                z,
                timestamp: self.started_at.elapsed().as_secs_f64(),
            };
            self.feed_sensor_sample(&sample);
            return;
        }

        if let Some(unsolicited) = self.dispatcher.on_response(response).await {
            self.process_updates(classify(&unsolicited));
        }
    }

    /// Feed one notification from the big data channel
    ///
    /// Chunks reassemble into frames; each completed frame is decoded
    /// and fanned out. Undecodable blobs are logged and dropped.
    pub fn handle_big_data(&self, bytes: &[u8]) {
        let frames = {
            let mut state = self.state.lock().unwrap();
            state.assembler.receive(bytes)
        };
        for frame in frames {
            match classify_big_data(&frame) {
                Ok(updates) => {
                    self.process_updates(updates);
                }
                Err(err) => {
                    warn!("Dropping big data frame 0x{:02X}: {}", frame.data_id, err);
                }
            }
        }
    }

    /// Feed one accelerometer sample to the gesture recognizer
    ///
    /// Exposed for hosts that source motion data elsewhere, e.g.
    /// replaying a capture.
    pub fn feed_sensor_sample(&self, sample: &SensorSample) {
        let (events, listeners) = {
            let mut state = self.state.lock().unwrap();
            let events = state.gesture.process_sample(sample);
            (events, state.gesture_listeners.clone())
        };
        for event in &events {
            for listener in &listeners {
                listener.on_gesture(event);
            }
        }
    }

    /// Force the wake trigger, as if the ring's own detection fired
    pub fn trigger_wake(&self) {
        let now = self.started_at.elapsed().as_secs_f64();
        self.state.lock().unwrap().gesture.wake_triggered(now);
    }

    /// Enable ring-side wake detection and the raw sensor stream, then
    /// arm the recognizer
    pub async fn start_gesture_tracking(&self) -> Result<()> {
        self.execute(Command::WakeGesture { enable: true }).await?;
        self.execute(Command::RawSensor { enable: true }).await?;
        self.state.lock().unwrap().gesture.start();
        Ok(())
    }

    /// Stop the raw sensor stream and disarm the recognizer
    ///
    /// The recognizer resets even when the disable commands fail, e.g.
    /// on a dying link.
    pub async fn stop_gesture_tracking(&self) -> Result<()> {
        let raw = self.execute(Command::RawSensor { enable: false }).await;
        let wake = self.execute(Command::WakeGesture { enable: false }).await;
        self.state.lock().unwrap().gesture.reset();
        raw?;
        wake?;
        Ok(())
    }

    pub fn gesture_phase(&self) -> GesturePhase {
        self.state.lock().unwrap().gesture.phase()
    }

    /// Request the sleep history; results arrive as
    /// [`RingUpdate::Sleep`]
    pub async fn sync_sleep(&self) -> Result<()> {
        self.request_big_data(Feature::Sleep, BIG_DATA_ID_SLEEP).await
    }

    /// Request the interval heart rate log
    pub async fn sync_heart_rate_log(&self) -> Result<()> {
        self.request_big_data(Feature::HeartRate, BIG_DATA_ID_HEART_RATE_LOG)
            .await
    }

    /// Request the skin temperature history
    pub async fn sync_temperature(&self) -> Result<()> {
        self.request_big_data(Feature::Temperature, BIG_DATA_ID_TEMPERATURE)
            .await
    }

    /// Fire a big data request; the ring answers through
    /// [`RingSession::handle_big_data`] whenever it gets around to it
    async fn request_big_data(&self, feature: Feature, data_id: u8) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            state.features.require(feature)?;
        }
        let frame = encode_big_data(data_id, &[])?;
        debug!("Requesting big data 0x{:02X}", data_id);
        self.transport.write_big_data(&frame).await
    }

    /// Register for updates the ring volunteers on its own
    ///
    /// Listeners see unsolicited notifications and big data results.
    /// Responses to [`RingSession::execute`] are returned to that
    /// caller, not echoed here.
    pub fn subscribe_updates(&self, listener: Arc<dyn UpdateListener>) {
        self.state.lock().unwrap().update_listeners.push(listener);
    }

    pub fn subscribe_gesture_events(&self, listener: Arc<dyn GestureListener>) {
        self.state.lock().unwrap().gesture_listeners.push(listener);
    }

    /// Capability table learned from the handshake; empty before it
    pub fn feature_support(&self) -> FeatureSupport {
        self.state.lock().unwrap().features
    }

    pub fn handshake_complete(&self) -> bool {
        self.state.lock().unwrap().handshake_done
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    /// Apply quirks and absorb session-level updates
    ///
    /// Shared by both delivery paths; solicited responses stop here and
    /// go back to the caller, unsolicited ones continue to subscribers.
    fn apply_updates(&self, updates: Vec<RingUpdate>) -> Vec<RingUpdate> {
        let updates: Vec<RingUpdate> = updates
            .into_iter()
            .map(|update| self.apply_quirks(update))
            .collect();

        let mut state = self.state.lock().unwrap();
        for update in &updates {
            match update {
                RingUpdate::SupportFlags(features) => {
                    debug!("Learned feature support: {}", features);
                    state.features = *features;
                    state.handshake_done = true;
                }
                RingUpdate::WakeTriggered => {
                    let now = self.started_at.elapsed().as_secs_f64();
                    state.gesture.wake_triggered(now);
                }
                _ => {}
            }
        }
        updates
    }

    /// Absorb unsolicited updates and fan them out to subscribers
    fn process_updates(&self, updates: Vec<RingUpdate>) {
        let updates = self.apply_updates(updates);
        let listeners = self.state.lock().unwrap().update_listeners.clone();
        for update in &updates {
            for listener in &listeners {
                listener.on_update(update);
            }
        }
    }

    fn apply_quirks(&self, update: RingUpdate) -> RingUpdate {
        match update {
            RingUpdate::Activity {
                steps,
                calories,
                distance,
            } if self.quirks.calories_reported_times_ten => RingUpdate::Activity {
                steps,
                calories: calories / 10,
                distance,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{
        CMD_ACTIVITY, CMD_BATTERY, CMD_RAW_SENSOR, CMD_SET_TIME, CMD_WAKE_GESTURE,
        RAW_SENSOR_ACCEL,
    };
    use crate::types::{RealtimeKind, RingError};
    use std::time::Duration;
    use tokio::time::sleep;

    struct MockTransport {
        command_writes: Mutex<Vec<[u8; PACKET_LEN]>>,
        big_data_writes: Mutex<Vec<Vec<u8>>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(MockTransport {
                command_writes: Mutex::new(Vec::new()),
                big_data_writes: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<[u8; PACKET_LEN]> {
            self.command_writes.lock().unwrap().clone()
        }

        fn big_data(&self) -> Vec<Vec<u8>> {
            self.big_data_writes.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl RingTransport for MockTransport {
        async fn write_command(&self, packet: &[u8; PACKET_LEN]) -> Result<()> {
            self.command_writes.lock().unwrap().push(*packet);
            Ok(())
        }

        async fn write_big_data(&self, frame: &[u8]) -> Result<()> {
            self.big_data_writes.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectingListener {
        updates: Mutex<Vec<RingUpdate>>,
    }

    impl UpdateListener for CollectingListener {
        fn on_update(&self, update: &RingUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }
    }

    #[derive(Default)]
    struct CollectingGestures {
        events: Mutex<Vec<GestureEvent>>,
    }

    impl GestureListener for CollectingGestures {
        fn on_gesture(&self, event: &GestureEvent) {
            self.events.lock().unwrap().push(*event);
        }
    }

    async fn wait_for_commands(transport: &MockTransport, count: usize) {
        for _ in 0..100 {
            if transport.commands().len() >= count {
                return;
            }
            sleep(Duration::from_millis(2)).await;
        }
        panic!("transport never saw {} command write(s)", count);
    }

    #[tokio::test]
    async fn test_handshake_learns_features() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        let init = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.initialize().await })
        };

        wait_for_commands(&transport, 1).await;
        assert_eq!(transport.commands()[0][0], CMD_SET_TIME);

        // Ring advertises heart rate, SpO2, raw sensors and sleep
        let response = encode_command(CMD_SET_TIME, &[0x53, 0x00]).unwrap();
        session.handle_notification(&response).await;

        let features = init.await.unwrap().unwrap();
        assert!(features.contains(Feature::HeartRate));
        assert!(features.contains(Feature::RawSensors));
        assert!(!features.contains(Feature::Gesture));
        assert!(session.handshake_complete());
    }

    #[tokio::test]
    async fn test_gated_command_rejected_before_handshake() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        let err = session
            .execute(Command::StartRealtime(RealtimeKind::HeartRate))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RingError::UnsupportedFeature(Feature::HeartRate)
        ));
        assert!(transport.commands().is_empty());
    }

    #[tokio::test]
    async fn test_unsolicited_update_reaches_listeners() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        let listener = Arc::new(CollectingListener::default());
        session.subscribe_updates(listener.clone());

        let bytes = encode_command(CMD_BATTERY, &[64, 1]).unwrap();
        session.handle_notification(&bytes).await;

        assert_eq!(
            listener.updates.lock().unwrap().clone(),
            vec![RingUpdate::Battery {
                level: 64,
                charging: true
            }]
        );
    }

    #[tokio::test]
    async fn test_solicited_response_not_echoed_to_listeners() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        let listener = Arc::new(CollectingListener::default());
        session.subscribe_updates(listener.clone());

        let pending = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.execute(Command::Battery).await })
        };
        wait_for_commands(&transport, 1).await;
        session
            .handle_notification(&encode_command(CMD_BATTERY, &[77, 0]).unwrap())
            .await;

        // The caller gets the update; subscribers see nothing extra
        let updates = pending.await.unwrap().unwrap();
        assert_eq!(
            updates,
            vec![RingUpdate::Battery {
                level: 77,
                charging: false
            }]
        );
        assert!(listener.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_notification_dropped() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        let listener = Arc::new(CollectingListener::default());
        session.subscribe_updates(listener.clone());

        let mut bytes = encode_command(CMD_BATTERY, &[64, 1]).unwrap();
        bytes[5] ^= 0xFF;
        session.handle_notification(&bytes).await;
        assert!(listener.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_raw_sensor_stream_drives_gesture() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        let gestures = Arc::new(CollectingGestures::default());
        session.subscribe_gesture_events(gestures.clone());

        // Arm the recognizer directly, skipping the enable round trips
        session.state.lock().unwrap().gesture.start();
        session.trigger_wake();

        for step in 0..21u32 {
            let angle = 0.3 * step as f64;
            let x = (angle.cos() * 512.0).round() as i16;
            let y = (angle.sin() * 512.0).round() as i16;
            let mut payload = vec![RAW_SENSOR_ACCEL];
            payload.extend_from_slice(&x.to_le_bytes());
            payload.extend_from_slice(&y.to_le_bytes());
            payload.extend_from_slice(&0i16.to_le_bytes());
            let bytes = encode_command(CMD_RAW_SENSOR, &payload).unwrap();
            session.handle_notification(&bytes).await;
        }

        let events = gestures.events.lock().unwrap().clone();
        assert!(events.contains(&GestureEvent::WakeConfirmed));
        assert_eq!(session.gesture_phase(), GesturePhase::Active);
    }

    #[tokio::test]
    async fn test_start_gesture_tracking_sends_enables() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        // Pretend the handshake advertised gesture and raw sensors
        session.process_updates(vec![RingUpdate::SupportFlags(FeatureSupport::from_bits(
            0b0001_1000,
        ))]);

        let start = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.start_gesture_tracking().await })
        };

        wait_for_commands(&transport, 1).await;
        assert_eq!(transport.commands()[0][0], CMD_WAKE_GESTURE);
        session
            .handle_notification(&encode_command(CMD_WAKE_GESTURE, &[0x00, 0x01]).unwrap())
            .await;

        wait_for_commands(&transport, 2).await;
        assert_eq!(transport.commands()[1][0], CMD_RAW_SENSOR);
        session
            .handle_notification(&encode_command(CMD_RAW_SENSOR, &[0x01]).unwrap())
            .await;

        start.await.unwrap().unwrap();
        assert_eq!(session.gesture_phase(), GesturePhase::WaitingForWake);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_and_clears() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        session.process_updates(vec![RingUpdate::SupportFlags(FeatureSupport::from_bits(
            0xFF,
        ))]);
        assert!(session.handshake_complete());

        // Leave a gesture verification and a half-received frame behind
        session.state.lock().unwrap().gesture.start();
        session.trigger_wake();
        assert_eq!(session.gesture_phase(), GesturePhase::VerifyingWakeIntent);
        let frame = encode_big_data(BIG_DATA_ID_SLEEP, &[1, 2, 3, 4]).unwrap();
        session.handle_big_data(&frame[..4]);
        assert!(session.state.lock().unwrap().assembler.pending_bytes() > 0);

        let pending = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.execute(Command::Battery).await })
        };
        wait_for_commands(&transport, 1).await;

        session.connection_changed(false);
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, RingError::Cancelled));
        assert!(!session.is_connected());
        assert!(!session.handshake_complete());
        assert!(session.feature_support().is_empty());
        assert_eq!(session.gesture_phase(), GesturePhase::Idle);
        assert_eq!(session.state.lock().unwrap().assembler.pending_bytes(), 0);
    }

    #[tokio::test]
    async fn test_calorie_quirk_rescales_activity() {
        let transport = MockTransport::new();
        let config = SessionConfig {
            quirks: FirmwareQuirks {
                calories_reported_times_ten: true,
            },
            ..SessionConfig::default()
        };
        let session = RingSession::new(transport.clone(), config);
        session.connection_changed(true);

        let listener = Arc::new(CollectingListener::default());
        session.subscribe_updates(listener.clone());

        let payload = [0x10, 0x27, 0x00, 0x20, 0x4E, 0x00, 0x30, 0x75, 0x00];
        let bytes = encode_command(CMD_ACTIVITY, &payload).unwrap();
        session.handle_notification(&bytes).await;

        assert_eq!(
            listener.updates.lock().unwrap().clone(),
            vec![RingUpdate::Activity {
                steps: 10000,
                calories: 2000,
                distance: 30000
            }]
        );
    }

    #[tokio::test]
    async fn test_sync_sleep_gated_then_requests() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        let err = session.sync_sleep().await.unwrap_err();
        assert!(matches!(err, RingError::UnsupportedFeature(Feature::Sleep)));
        assert!(transport.big_data().is_empty());

        session.process_updates(vec![RingUpdate::SupportFlags(FeatureSupport::from_bits(
            1 << 6,
        ))]);
        session.sync_sleep().await.unwrap();

        let frames = transport.big_data();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0][0], 0xBC);
        assert_eq!(frames[0][1], BIG_DATA_ID_SLEEP);
    }

    #[tokio::test]
    async fn test_big_data_sleep_frame_fans_out() {
        let transport = MockTransport::new();
        let session = RingSession::new(transport.clone(), SessionConfig::default());
        session.connection_changed(true);

        let listener = Arc::new(CollectingListener::default());
        session.subscribe_updates(listener.clone());

        let blob = [1, 0, 8, 0x46, 0x05, 0x95, 0x01, 2, 120, 3, 90];
        let frame = encode_big_data(BIG_DATA_ID_SLEEP, &blob).unwrap();
        // Deliver in two chunks to exercise reassembly
        session.handle_big_data(&frame[..4]);
        session.handle_big_data(&frame[4..]);

        let updates = listener.updates.lock().unwrap().clone();
        match &updates[..] {
            [RingUpdate::Sleep(record)] => {
                assert_eq!(record.days.len(), 1);
                assert_eq!(record.days[0].sleep_start_min, 1350);
            }
            other => panic!("unexpected updates: {:?}", other),
        }
    }
}
