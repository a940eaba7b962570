//! Rotation gesture recognition from streamed accelerometer samples
//!
//! Worn on a finger, the ring traces an arc in the accelerometer's x/y
//! plane when rotated around the finger axis. The recognizer tracks the
//! gravity angle across samples and runs a small state machine: a
//! ring-side wake trigger opens a verification window, a full rotation
//! inside the window confirms intent, and a confirmed session turns
//! further rotation into scroll events and net acceleration spikes into
//! taps. Verification windows stretch while the wearer keeps making
//! rotational progress, up to a hard cap.
//!
//! The recognizer is pure state with host-relative timestamps in
//! seconds; the session feeds it samples and fans out the events it
//! returns.

use std::f64::consts::{PI, TAU};

use log::debug;

/// One accelerometer sample in g units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Host-relative seconds
    pub timestamp: f64,
}

/// Where the recognizer currently is in the gesture lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    /// Not tracking; samples only refresh continuity state
    Idle,
    /// Armed, waiting for the ring-side wake trigger
    WaitingForWake,
    /// Wake trigger seen, waiting for a confirming rotation
    VerifyingWakeIntent,
    /// Confirmed session, emitting scrolls and taps
    Active,
    /// Tap seen, waiting for a confirming rotation
    VerifyingSelectionIntent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// An event produced by the recognizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    WakeConfirmed,
    WakeCancelled,
    SelectionConfirmed,
    SelectionCancelled,
    Scroll {
        direction: ScrollDirection,
        /// Angular speed in rad/s, always positive
        velocity: f64,
    },
    TapDetected,
}

/// Thresholds for the gesture state machine
#[derive(Debug, Clone, Copy)]
pub struct GestureConfig {
    /// Cumulative rotation in rad that confirms intent
    pub full_rotation_threshold: f64,
    /// Cumulative reversal in rad that cancels verification
    pub cancel_threshold: f64,
    /// Angular speed in rad/s above which a scroll event fires
    pub scroll_velocity_threshold: f64,
    /// Net acceleration in g above which a tap fires
    pub tap_force_threshold: f64,
    /// Initial verification window in seconds
    pub verify_window: f64,
    /// Seconds added to the window per extension grant
    pub verify_extension: f64,
    /// Rotation in rad since the last grant that earns an extension
    pub extension_progress: f64,
    /// Extension grants per verification window
    pub max_extensions: u32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        GestureConfig {
            full_rotation_threshold: 5.5,
            cancel_threshold: -0.5,
            scroll_velocity_threshold: 5.0,
            tap_force_threshold: 0.5,
            verify_window: 2.0,
            verify_extension: 0.5,
            extension_progress: 1.0,
            max_extensions: 4,
        }
    }
}

/// Stateful gesture recognizer fed from the raw sensor stream
pub struct GestureRecognizer {
    config: GestureConfig,
    phase: GesturePhase,
    cumulative: f64,
    deadline: f64,
    extensions: u32,
    extension_mark: f64,
    last_position: Option<f64>,
    last_timestamp: Option<f64>,
    last_net_accel: f64,
}

impl GestureRecognizer {
    pub fn new(config: GestureConfig) -> Self {
        GestureRecognizer {
            config,
            phase: GesturePhase::Idle,
            cumulative: 0.0,
            deadline: 0.0,
            extensions: 0,
            extension_mark: 0.0,
            last_position: None,
            last_timestamp: None,
            last_net_accel: 0.0,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    /// Arm the recognizer; no-op unless idle
    pub fn start(&mut self) {
        if self.phase == GesturePhase::Idle {
            debug!("Gesture tracking armed");
            self.phase = GesturePhase::WaitingForWake;
        }
    }

    /// Drop back to idle and clear all continuity state
    pub fn reset(&mut self) {
        self.phase = GesturePhase::Idle;
        self.cumulative = 0.0;
        self.deadline = 0.0;
        self.extensions = 0;
        self.extension_mark = 0.0;
        self.last_position = None;
        self.last_timestamp = None;
        self.last_net_accel = 0.0;
    }

    /// The ring's own wake detection fired
    ///
    /// Only honored while waiting for a wake; triggers arriving in any
    /// other phase are stale and ignored.
    pub fn wake_triggered(&mut self, now: f64) {
        if self.phase != GesturePhase::WaitingForWake {
            debug!("Ignoring wake trigger in phase {:?}", self.phase);
            return;
        }
        debug!("Wake trigger received, verifying intent");
        self.enter_verification(GesturePhase::VerifyingWakeIntent, now);
    }

    /// Feed one accelerometer sample and collect any resulting events
    pub fn process_sample(&mut self, sample: &SensorSample) -> Vec<GestureEvent> {
        let position = sample.y.atan2(sample.x);
        let delta = match self.last_position {
            Some(prev) => wrap_angle(position - prev),
            None => 0.0,
        };
        let dt = match self.last_timestamp {
            Some(prev) => sample.timestamp - prev,
            None => 0.0,
        };
        let magnitude =
            (sample.x * sample.x + sample.y * sample.y + sample.z * sample.z).sqrt();
        let net = (magnitude - 1.0).abs();
        let prev_net = self.last_net_accel;

        let events = match self.phase {
            GesturePhase::Idle | GesturePhase::WaitingForWake => Vec::new(),
            GesturePhase::VerifyingWakeIntent => self.step_verification(
                sample.timestamp,
                delta,
                GestureEvent::WakeConfirmed,
                GestureEvent::WakeCancelled,
                GesturePhase::WaitingForWake,
            ),
            GesturePhase::VerifyingSelectionIntent => self.step_verification(
                sample.timestamp,
                delta,
                GestureEvent::SelectionConfirmed,
                GestureEvent::SelectionCancelled,
                GesturePhase::Active,
            ),
            GesturePhase::Active => self.step_active(sample.timestamp, delta, dt, prev_net, net),
        };

        self.last_position = Some(position);
        self.last_timestamp = Some(sample.timestamp);
        self.last_net_accel = net;
        events
    }

    fn enter_verification(&mut self, phase: GesturePhase, now: f64) {
        // Continuity fields survive so the first sample after the
        // trigger contributes real rotation
        self.phase = phase;
        self.cumulative = 0.0;
        self.extensions = 0;
        self.extension_mark = 0.0;
        self.deadline = now + self.config.verify_window;
    }

    fn step_verification(
        &mut self,
        now: f64,
        delta: f64,
        confirmed: GestureEvent,
        cancelled: GestureEvent,
        cancel_phase: GesturePhase,
    ) -> Vec<GestureEvent> {
        self.cumulative += delta;

        if self.cumulative.abs() >= self.config.full_rotation_threshold {
            debug!("Intent confirmed after {:.2} rad", self.cumulative);
            self.phase = GesturePhase::Active;
            self.cumulative = 0.0;
            return vec![confirmed];
        }

        if self.cumulative < self.config.cancel_threshold {
            debug!("Intent cancelled by reversal at {:.2} rad", self.cumulative);
            self.phase = cancel_phase;
            return vec![cancelled];
        }

        if now >= self.deadline {
            debug!("Verification window expired at {:.2} rad", self.cumulative);
            self.phase = cancel_phase;
            return vec![cancelled];
        }

        // Only samples that landed inside the window can stretch it
        if self.extensions < self.config.max_extensions
            && self.cumulative - self.extension_mark >= self.config.extension_progress
        {
            self.extensions += 1;
            self.extension_mark = self.cumulative;
            self.deadline += self.config.verify_extension;
            debug!(
                "Verification window extended ({} of {})",
                self.extensions, self.config.max_extensions
            );
        }

        Vec::new()
    }

    fn step_active(
        &mut self,
        now: f64,
        delta: f64,
        dt: f64,
        prev_net: f64,
        net: f64,
    ) -> Vec<GestureEvent> {
        let mut events = Vec::new();

        if dt > 0.0 {
            let velocity = delta / dt;
            if velocity.abs() > self.config.scroll_velocity_threshold {
                let direction = if velocity > 0.0 {
                    ScrollDirection::Up
                } else {
                    ScrollDirection::Down
                };
                events.push(GestureEvent::Scroll {
                    direction,
                    velocity: velocity.abs(),
                });
            }
        }

        // Rising edge only, so a sustained shake is one tap
        if prev_net < self.config.tap_force_threshold && net >= self.config.tap_force_threshold {
            debug!("Tap detected, net acceleration {:.2} g", net);
            events.push(GestureEvent::TapDetected);
            self.enter_verification(GesturePhase::VerifyingSelectionIntent, now);
        }

        events
    }
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

/// Fold an angle difference into `[-pi, pi]`
fn wrap_angle(delta: f64) -> f64 {
    let mut folded = delta % TAU;
    if folded > PI {
        folded -= TAU;
    } else if folded < -PI {
        folded += TAU;
    }
    folded
}
