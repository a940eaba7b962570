//! Serialized command execution over the shared notify channel
//!
//! The ring answers commands on the same characteristic that carries
//! unsolicited traffic and its packets have no transaction ids, so
//! responses can only be correlated by ordering. The dispatcher keeps a
//! FIFO of pending commands with at most one in flight: the head is
//! written, its response awaited, then the next head follows. Inbound
//! packets that match the in-flight command id resolve it; everything
//! else passes back to the caller for classification.
//!
//! A background ticker expires in-flight commands that never get an
//! answer, so one lost response cannot wedge the queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

use crate::packet::{ResponsePacket, PACKET_LEN};
use crate::types::{Result, RingError};

/// Writes encoded command packets to the ring
#[async_trait::async_trait]
pub trait PacketSink: Send + Sync {
    async fn write_packet(&self, packet: &[u8; PACKET_LEN]) -> Result<()>;
}

/// Dispatcher tuning
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// How long a written command may wait for its response
    pub response_timeout: Duration,
    /// Deadline check cadence
    pub tick_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            response_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Nothing in flight
    Idle,
    /// Head claimed by a driver, write in progress
    AwaitingWrite,
    /// Head written, waiting for the matching response
    AwaitingResponse { command: u8, deadline: Instant },
}

struct PendingCommand {
    command: u8,
    packet: [u8; PACKET_LEN],
    enqueued_at: Instant,
    responder: Option<oneshot::Sender<Result<ResponsePacket>>>,
}

struct DispatchState {
    queue: VecDeque<PendingCommand>,
    phase: Phase,
    /// Bumped on cancel_all so stale write completions no-op
    generation: u64,
}

/// FIFO command queue enforcing one in-flight command
pub struct CommandDispatcher {
    state: Arc<Mutex<DispatchState>>,
    sink: Arc<dyn PacketSink>,
    config: DispatcherConfig,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl CommandDispatcher {
    pub fn new(sink: Arc<dyn PacketSink>, config: DispatcherConfig) -> Self {
        CommandDispatcher {
            state: Arc::new(Mutex::new(DispatchState {
                queue: VecDeque::new(),
                phase: Phase::Idle,
                generation: 0,
            })),
            sink,
            config,
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Start the deadline ticker; idempotent
    pub fn start(&self) {
        let mut shutdown = self.shutdown_tx.lock().unwrap();
        if shutdown.is_some() {
            return;
        }
        let (tx, mut rx) = mpsc::channel(1);
        *shutdown = Some(tx);

        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let config = self.config;
        tokio::spawn(async move {
            loop {
                sleep(config.tick_interval).await;
                if rx.try_recv().is_ok() {
                    debug!("Dispatcher ticker shutting down");
                    break;
                }
                Self::check_deadline(&state, &sink, &config).await;
            }
        });
    }

    /// Stop the deadline ticker; queued commands are left alone
    pub fn close(&self) {
        let tx = self.shutdown_tx.lock().unwrap().take();
        if let Some(tx) = tx {
            let _ = tx.try_send(());
        }
    }

    /// Queue a command and wait for its response
    pub async fn execute(&self, command: u8, packet: [u8; PACKET_LEN]) -> Result<ResponsePacket> {
        let (tx, rx) = oneshot::channel();
        let drive = {
            let mut state = self.state.lock().unwrap();
            state.queue.push_back(PendingCommand {
                command,
                packet,
                enqueued_at: Instant::now(),
                responder: Some(tx),
            });
            // Only the caller that found the dispatcher idle drives the
            // queue; otherwise a driver is already at work
            if matches!(state.phase, Phase::Idle) {
                state.phase = Phase::AwaitingWrite;
                true
            } else {
                false
            }
        };

        if drive {
            Self::drive_queue(&self.state, &self.sink, &self.config).await;
        }

        rx.await.unwrap_or(Err(RingError::Cancelled))
    }

    /// Feed one inbound packet; hands it back if no in-flight command
    /// matches
    pub async fn on_response(&self, response: ResponsePacket) -> Option<ResponsePacket> {
        let (pending, drive) = {
            let mut state = self.state.lock().unwrap();
            let matched = matches!(
                state.phase,
                Phase::AwaitingResponse { command, .. } if command == response.command
            );
            if !matched {
                drop(state);
                debug!(
                    "Response 0x{:02X} matches no in-flight command, passing through",
                    response.command
                );
                return Some(response);
            }
            let pending = state.queue.pop_front();
            let drive = !state.queue.is_empty();
            state.phase = if drive { Phase::AwaitingWrite } else { Phase::Idle };
            (pending, drive)
        };

        if let Some(mut pending) = pending {
            debug!(
                "Command 0x{:02X} completed in {:?}",
                pending.command,
                pending.enqueued_at.elapsed()
            );
            if let Some(tx) = pending.responder.take() {
                let _ = tx.send(Ok(response));
            }
        }

        if drive {
            Self::drive_queue(&self.state, &self.sink, &self.config).await;
        }
        None
    }

    /// Fail every queued command; used on disconnect
    pub fn cancel_all(&self) {
        let drained: Vec<PendingCommand> = {
            let mut state = self.state.lock().unwrap();
            state.generation += 1;
            state.phase = Phase::Idle;
            state.queue.drain(..).collect()
        };
        if !drained.is_empty() {
            info!("Cancelling {} pending command(s)", drained.len());
        }
        for mut pending in drained {
            if let Some(tx) = pending.responder.take() {
                let _ = tx.send(Err(RingError::Cancelled));
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    /// Write queue heads until a write sticks or the queue drains
    ///
    /// Only ever entered by the actor holding the AwaitingWrite claim,
    /// so at most one driver runs at a time.
    async fn drive_queue(
        state: &Arc<Mutex<DispatchState>>,
        sink: &Arc<dyn PacketSink>,
        config: &DispatcherConfig,
    ) {
        loop {
            let (packet, command, generation) = {
                let mut locked = state.lock().unwrap();
                if !matches!(locked.phase, Phase::AwaitingWrite) {
                    return;
                }
                match locked.queue.front() {
                    Some(head) => (head.packet, head.command, locked.generation),
                    None => {
                        locked.phase = Phase::Idle;
                        return;
                    }
                }
            };

            debug!("Writing command 0x{:02X}", command);
            match sink.write_packet(&packet).await {
                Ok(()) => {
                    let mut locked = state.lock().unwrap();
                    if locked.generation == generation
                        && matches!(locked.phase, Phase::AwaitingWrite)
                    {
                        locked.phase = Phase::AwaitingResponse {
                            command,
                            deadline: Instant::now() + config.response_timeout,
                        };
                    }
                    return;
                }
                Err(err) => {
                    let responder = {
                        let mut locked = state.lock().unwrap();
                        if locked.generation != generation {
                            return;
                        }
                        let mut head = match locked.queue.pop_front() {
                            Some(head) => head,
                            None => {
                                locked.phase = Phase::Idle;
                                return;
                            }
                        };
                        if locked.queue.is_empty() {
                            locked.phase = Phase::Idle;
                        }
                        head.responder.take()
                    };
                    warn!("Write for command 0x{:02X} failed: {}", command, err);
                    if let Some(tx) = responder {
                        let _ = tx.send(Err(err));
                    }
                    // Later commands may still succeed; keep driving
                }
            }
        }
    }

    async fn check_deadline(
        state: &Arc<Mutex<DispatchState>>,
        sink: &Arc<dyn PacketSink>,
        config: &DispatcherConfig,
    ) {
        let (expired, drive) = {
            let mut locked = state.lock().unwrap();
            match locked.phase {
                Phase::AwaitingResponse { deadline, .. } if Instant::now() >= deadline => {
                    let expired = locked.queue.pop_front();
                    let drive = !locked.queue.is_empty();
                    locked.phase = if drive { Phase::AwaitingWrite } else { Phase::Idle };
                    (expired, drive)
                }
                _ => return,
            }
        };

        if let Some(mut pending) = expired {
            warn!(
                "Command 0x{:02X} timed out after {:?}",
                pending.command,
                pending.enqueued_at.elapsed()
            );
            if let Some(tx) = pending.responder.take() {
                let _ = tx.send(Err(RingError::CommandTimeout {
                    command: pending.command,
                }));
            }
        }

        if drive {
            Self::drive_queue(state, sink, config).await;
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}
