//! Async station: a [`Link`] running over a real UDP transport.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(packet) / recv()          StationHandle
//!      │                                ┌──────────────────────┐
//!      └──────────────────────────────▶ │  send_tx  (bounded)  │
//!                                       │  recv_rx  (unbounded)│
//!                                       └──────────┬───────────┘
//!                                                  │ event_loop task
//!    Link ◀── one Event at a time ─────────────────┤
//!      ├── TransmitWindow                          │
//!      ├── ReceiveWindow                           │
//!      └── QueuedEnv (outbox, timers) ── flush ──▶ FrameSocket (UDP)
//! ```
//!
//! The event loop multiplexes application packets, inbound frames, and the
//! earliest retransmission deadline with `tokio::select!`.  Application
//! packets are only read while the link has admission enabled, so a full
//! window pushes back on the bounded send channel instead of dropping data.
//!
//! # Shutdown
//!
//! Dropping the send side (see [`StationHandle::close`]) stops new packets.
//! The loop keeps running until every outstanding frame is acknowledged,
//! then lingers for [`StationConfig::linger`] so the peer's final frames
//! still get ACKs, and exits.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::env::QueuedEnv;
use crate::event::Event;
use crate::link::{Link, LinkConfig, LinkError, LinkStats};
use crate::socket::{FrameSocket, SocketError};

/// Capacity of the application → station channel.
const SEND_QUEUE: usize = 64;

/// Station parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationConfig {
    pub link: LinkConfig,
    /// How long to keep answering the peer after the last own frame was
    /// acknowledged and the application closed the station.
    pub linger: Duration,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            linger: Duration::from_secs(1),
        }
    }
}

/// Errors that end a station.
#[derive(Debug, Error)]
pub enum StationError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("station event loop has stopped")]
    Closed,
    #[error("station task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// StationHandle
// ---------------------------------------------------------------------------

/// Handle to a running station.
pub struct StationHandle {
    send_tx: mpsc::Sender<Vec<u8>>,
    recv_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    packet_len: usize,
    handle: JoinHandle<Result<LinkStats, StationError>>,
}

impl StationHandle {
    /// Spawn the station's event loop on the current tokio runtime.
    pub fn spawn(socket: FrameSocket, config: StationConfig) -> Self {
        let (send_tx, send_rx) = mpsc::channel::<Vec<u8>>(SEND_QUEUE);
        let (recv_tx, recv_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        log::info!(
            "[station] {} ↔ {} packet_len={}",
            socket.local_addr,
            socket.peer,
            config.link.packet_len
        );
        let handle = tokio::spawn(event_loop(socket, config, send_rx, recv_tx));

        Self {
            send_tx,
            recv_rx,
            packet_len: config.link.packet_len,
            handle,
        }
    }

    /// Queue a packet for reliable delivery.
    ///
    /// Waits while the send queue is full.  Packets must be exactly the
    /// link's packet size.
    pub async fn send(&self, packet: Vec<u8>) -> Result<(), StationError> {
        if packet.len() != self.packet_len {
            return Err(LinkError::PacketSize {
                expected: self.packet_len,
                actual: packet.len(),
            }
            .into());
        }
        self.send_tx
            .send(packet)
            .await
            .map_err(|_| StationError::Closed)
    }

    /// Next packet delivered by the peer, or `None` once the station stopped.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.recv_rx.recv().await
    }

    /// A clone of the send side, for feeding packets from another task.
    ///
    /// Packets of the wrong size sent this way are logged and dropped by the
    /// station; they never reach the link.
    pub fn sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.send_tx.clone()
    }

    /// Stop accepting packets, wait for the loop to drain and exit, and
    /// return the link's statistics.
    ///
    /// Any sender obtained from [`sender`](Self::sender) must be dropped too,
    /// or the loop keeps waiting for packets.
    pub async fn close(self) -> Result<LinkStats, StationError> {
        drop(self.send_tx);
        drop(self.recv_rx);
        self.handle.await?
    }
}

// ---------------------------------------------------------------------------
// Background event loop
// ---------------------------------------------------------------------------

async fn event_loop(
    socket: FrameSocket,
    config: StationConfig,
    mut app_rx: mpsc::Receiver<Vec<u8>>,
    app_tx: mpsc::UnboundedSender<Vec<u8>>,
) -> Result<LinkStats, StationError> {
    let mut link = Link::new(config.link);
    let mut env = QueuedEnv::new(Instant::now());
    link.start(&mut env);

    // A wake-up this far out stands in for "no timer armed".
    let far_future = Duration::from_secs(365 * 24 * 3600);
    let mut app_open = true;
    let mut linger_until: Option<Instant> = None;

    // The socket can take a frame right away.
    dispatch(&mut link, &mut env, &socket, &app_tx, Event::PhysicalLayerReady).await?;

    loop {
        if !app_open && link.sender().nbuffered() == 0 {
            let deadline = *linger_until.get_or_insert_with(|| Instant::now() + config.linger);
            if Instant::now() >= deadline {
                break;
            }
        }

        let wake_at = [env.timers.next_deadline(), linger_until]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or_else(|| Instant::now() + far_future);

        let event = tokio::select! {
            // ── Branch 1: packet from the application ────────────────────
            // Only eligible while the link admits new packets.
            maybe_packet = app_rx.recv(), if app_open && link.admission_enabled() => {
                match maybe_packet {
                    // Packets queued through `sender()` bypass the size check in `send`.
                    Some(packet) if packet.len() != config.link.packet_len => {
                        log::warn!(
                            "[station] dropping {}-byte packet; link packet size is {}",
                            packet.len(),
                            config.link.packet_len
                        );
                        continue;
                    }
                    Some(packet) => {
                        env.push_packet(packet);
                        Event::NetworkLayerReady
                    }
                    None => {
                        log::debug!("[station] application closed; draining");
                        app_open = false;
                        continue;
                    }
                }
            }

            // ── Branch 2: inbound frame ──────────────────────────────────
            result = socket.recv() => {
                match result {
                    Ok(bytes) => Event::FrameReceived(bytes),
                    Err(e) if e.is_peer_unreachable() => {
                        log::debug!("[station] peer unreachable");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            // ── Branch 3: retransmission timer or linger deadline ────────
            _ = tokio::time::sleep_until(wake_at) => {
                env.now = Instant::now();
                match env.timers.pop_expired(env.now) {
                    Some(seq) => Event::DataTimeout(seq),
                    None => continue,
                }
            }
        };

        dispatch(&mut link, &mut env, &socket, &app_tx, event).await?;
    }

    let stats = link.stats();
    log::info!("[station] {} done: {}", socket.local_addr, stats);
    Ok(stats)
}

/// Run one event through the link, then deliver packets and flush frames.
async fn dispatch(
    link: &mut Link,
    env: &mut QueuedEnv<Instant>,
    socket: &FrameSocket,
    app_tx: &mpsc::UnboundedSender<Vec<u8>>,
    event: Event,
) -> Result<(), StationError> {
    env.now = Instant::now();
    link.handle_event(event, env)?;

    for packet in env.take_delivered() {
        // The application may have stopped reading; delivery still counts.
        let _ = app_tx.send(packet);
    }

    let frames = env.take_outbox();
    if frames.is_empty() {
        return Ok(());
    }
    for frame in &frames {
        match socket.send(frame).await {
            Ok(()) => {}
            Err(e) if e.is_peer_unreachable() => {
                log::debug!("[station] frame lost: peer unreachable");
            }
            Err(e) => return Err(e.into()),
        }
    }

    // The datagrams are with the OS; the transport is free again.
    env.now = Instant::now();
    link.handle_event(Event::PhysicalLayerReady, env)?;
    Ok(())
}
