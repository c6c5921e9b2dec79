//! The link: protocol state plus the event dispatcher.
//!
//! A [`Link`] owns the complete state of one end of a point-to-point link:
//! the [`TransmitWindow`], the [`ReceiveWindow`], and the transport-ready
//! flag.  Its responsibilities are:
//! - Dispatching each [`Event`] to the right window.
//! - Encoding outgoing frames and handing them to the transport.
//! - Arming and stopping per-frame retransmission timers.
//! - Recomputing admission control after every event, so the network layer
//!   is only asked for a packet when the window has room and the transport
//!   is ready.
//!
//! The link performs no I/O of its own.  Every side effect goes through the
//! collaborator traits ([`NetworkLayer`], [`PhysicalLayer`], [`Timers`]),
//! which lets the same state machine run inside the deterministic simulator
//! and behind a real UDP socket.

use std::time::Duration;

use thiserror::Error;

use crate::event::{Event, EventSource};
use crate::frame::{Frame, FrameKind, DEFAULT_PACKET_LEN};
use crate::receiver::ReceiveWindow;
use crate::sender::TransmitWindow;
use crate::seq::{inc, Seq};
use crate::timer::TimerConfig;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Producer and consumer of packets above the link.
pub trait NetworkLayer {
    /// Next packet to send.  Only called after the link enabled admission
    /// and a [`Event::NetworkLayerReady`] was raised.
    fn get_packet(&mut self) -> Option<Vec<u8>>;
    /// Hand a received packet up, in order, exactly once.
    fn put_packet(&mut self, packet: &[u8]);
    /// Allow [`Event::NetworkLayerReady`] to be raised.
    fn enable_network_layer(&mut self);
    /// Stop raising [`Event::NetworkLayerReady`].
    fn disable_network_layer(&mut self);
}

/// The unreliable frame transport below the link.
pub trait PhysicalLayer {
    fn send_frame(&mut self, frame: &[u8]);
}

/// Retransmission timers, one per outstanding sequence number.
pub trait Timers {
    /// Arm (or re-arm) the timer for `seq`.  On expiry the driver raises
    /// [`Event::DataTimeout`] with the same number.
    fn start_timer(&mut self, seq: Seq, timeout: Duration);
    /// Stop the timer for `seq`.  Must be a no-op if it already fired.
    fn stop_timer(&mut self, seq: Seq);
}

/// Everything a [`Link`] needs from its surroundings.
pub trait Environment: NetworkLayer + PhysicalLayer + Timers {}

impl<T: NetworkLayer + PhysicalLayer + Timers + ?Sized> Environment for T {}

// ---------------------------------------------------------------------------
// Configuration, statistics, errors
// ---------------------------------------------------------------------------

/// Static parameters of one link.  Both ends must agree on `packet_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Fixed size of every network-layer packet.
    pub packet_len: usize,
    pub timers: TimerConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            packet_len: DEFAULT_PACKET_LEN,
            timers: TimerConfig::default(),
        }
    }
}

/// Counters for everything the link recovers from silently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Packets taken from the network layer.
    pub packets_accepted: u64,
    /// Packets handed to the network layer.
    pub packets_delivered: u64,
    /// First transmissions of DATA frames.
    pub data_sent: u64,
    /// DATA frames resent after a timeout or NAK.
    pub retransmissions: u64,
    pub acks_sent: u64,
    pub naks_sent: u64,
    /// Frames read from the transport, valid or not.
    pub frames_received: u64,
    /// Frames dropped for a bad checksum, length, or kind.
    pub bad_frames: u64,
    /// DATA frames that were duplicates or outside the receive window.
    pub duplicates: u64,
}

impl std::fmt::Display for LinkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "accepted={} delivered={} data={} retx={} ack={} nak={} rx={} bad={} dup={}",
            self.packets_accepted,
            self.packets_delivered,
            self.data_sent,
            self.retransmissions,
            self.acks_sent,
            self.naks_sent,
            self.frames_received,
            self.bad_frames,
            self.duplicates,
        )
    }
}

/// Contract violations by the link's collaborators.
///
/// Lost, corrupted, and duplicate frames are not errors; they are recovered
/// inside the protocol and only show up in [`LinkStats`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("network layer raised ready while the transmit window is full")]
    WindowFull,
    #[error("network layer raised ready but supplied no packet")]
    NoPacket,
    #[error("packet of {actual} bytes does not match the link packet size of {expected}")]
    PacketSize { expected: usize, actual: usize },
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// One end of a selective-repeat link.
#[derive(Debug)]
pub struct Link {
    config: LinkConfig,
    sender: TransmitWindow,
    receiver: ReceiveWindow,
    /// `true` when the transport can take another frame.
    phl_ready: bool,
    /// Admission state last pushed to the network layer.
    admission: bool,
    stats: LinkStats,
}

impl Link {
    /// Create a link with empty windows.  The transport starts out not ready;
    /// drivers raise [`Event::PhysicalLayerReady`] once it is.
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            sender: TransmitWindow::new(),
            receiver: ReceiveWindow::new(),
            phl_ready: false,
            admission: false,
            stats: LinkStats::default(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn sender(&self) -> &TransmitWindow {
        &self.sender
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Whether the transport is ready for another frame.
    pub fn phl_ready(&self) -> bool {
        self.phl_ready
    }

    /// Whether the network layer is currently allowed to supply a packet.
    pub fn admission_enabled(&self) -> bool {
        self.admission
    }

    /// Push the initial (disabled) admission state to the network layer.
    pub fn start<E: Environment + ?Sized>(&mut self, env: &mut E) {
        env.disable_network_layer();
        self.admission = false;
        log::info!(
            "[link] up: window={} packet_len={} timeout={:?}",
            crate::seq::NR_BUFS,
            self.config.packet_len,
            self.config.timers.data_timeout
        );
    }

    /// Process one event to completion, then recompute admission.
    pub fn handle_event<E: Environment + ?Sized>(
        &mut self,
        event: Event,
        env: &mut E,
    ) -> Result<(), LinkError> {
        let result = match event {
            Event::NetworkLayerReady => self.on_network_ready(env).map(|_| ()),
            Event::PhysicalLayerReady => {
                self.phl_ready = true;
                Ok(())
            }
            Event::FrameReceived(bytes) => {
                self.on_frame(&bytes, env);
                Ok(())
            }
            Event::DataTimeout(seq) => {
                log::debug!("[link] DATA {seq} timeout");
                self.retransmit(seq, env);
                Ok(())
            }
        };
        self.update_admission(env);
        result
    }

    // -----------------------------------------------------------------------
    // Transmit side
    // -----------------------------------------------------------------------

    /// Pull one packet from the network layer and send it.
    fn on_network_ready<E: Environment + ?Sized>(&mut self, env: &mut E) -> Result<Seq, LinkError> {
        if !self.sender.can_accept() {
            return Err(LinkError::WindowFull);
        }
        let packet = env.get_packet().ok_or(LinkError::NoPacket)?;
        self.accept(packet, env)
    }

    /// Buffer `packet` in the transmit window, send it as DATA, arm its timer.
    ///
    /// Callers must only call this while the window has room; admission
    /// control guarantees that for packets arriving through
    /// [`Event::NetworkLayerReady`].
    pub fn accept<E: Environment + ?Sized>(
        &mut self,
        packet: Vec<u8>,
        env: &mut E,
    ) -> Result<Seq, LinkError> {
        if packet.len() != self.config.packet_len {
            return Err(LinkError::PacketSize {
                expected: self.config.packet_len,
                actual: packet.len(),
            });
        }
        if !self.sender.can_accept() {
            return Err(LinkError::WindowFull);
        }
        let bytes = Frame::encode_data(self.sender.next_frame_to_send, &packet);
        let seq = self.sender.accept(packet);
        self.stats.packets_accepted += 1;
        self.stats.data_sent += 1;
        log::debug!(
            "[link] → DATA seq={} nbuffered={}",
            seq,
            self.sender.nbuffered()
        );
        self.put_bytes(&bytes, env);
        env.start_timer(seq, self.config.timers.data_timeout);
        Ok(seq)
    }

    /// Resend DATA frame `seq` and re-arm its timer, if it is still
    /// outstanding.  Returns whether anything was sent.
    pub fn retransmit<E: Environment + ?Sized>(&mut self, seq: Seq, env: &mut E) -> bool {
        let Some(bytes) = self
            .sender
            .on_retransmit(seq)
            .map(|payload| Frame::encode_data(seq, payload))
        else {
            log::debug!("[link] DATA {seq} no longer outstanding; not resent");
            return false;
        };
        self.stats.retransmissions += 1;
        log::debug!(
            "[link] → DATA seq={} (retransmit #{})",
            seq,
            self.sender.tx_count(seq) - 1
        );
        self.put_bytes(&bytes, env);
        env.start_timer(seq, self.config.timers.data_timeout);
        true
    }

    /// Cumulatively retire every outstanding frame up to and including `ack`,
    /// stopping their timers.  Returns how many were retired.
    pub fn retire<E: Environment + ?Sized>(&mut self, ack: Seq, env: &mut E) -> usize {
        let retired = self.sender.retire(ack);
        for &seq in &retired {
            env.stop_timer(seq);
        }
        if !retired.is_empty() {
            log::debug!(
                "[link] retired {} frame(s) through {}; nbuffered={}",
                retired.len(),
                ack,
                self.sender.nbuffered()
            );
        }
        retired.len()
    }

    // -----------------------------------------------------------------------
    // Receive side
    // -----------------------------------------------------------------------

    fn on_frame<E: Environment + ?Sized>(&mut self, bytes: &[u8], env: &mut E) {
        self.stats.frames_received += 1;

        let frame = match Frame::decode(bytes, self.config.packet_len) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.bad_frames += 1;
                log::debug!("[link] ← bad frame dropped: {e}");
                if let Some(ack) = self.receiver.request_nak() {
                    self.send_nak(ack, env);
                }
                return;
            }
        };

        match frame.kind {
            FrameKind::Data => {
                log::debug!("[link] ← DATA seq={}", frame.seq);
                let outcome = self.receiver.on_data(frame.seq, frame.payload);
                if let Some(ack) = outcome.nak {
                    self.send_nak(ack, env);
                }
                if !outcome.stored {
                    self.stats.duplicates += 1;
                    log::debug!("[link] DATA {} duplicate or outside window", frame.seq);
                }
                for packet in &outcome.delivered {
                    env.put_packet(packet);
                    self.stats.packets_delivered += 1;
                }
                if let Some(ack) = outcome.ack {
                    self.send_ack(ack, env);
                }
            }
            FrameKind::Ack => {
                log::debug!("[link] ← ACK ack={}", frame.seq);
                self.retire(frame.seq, env);
            }
            FrameKind::Nak => {
                log::debug!("[link] ← NAK ack={}", frame.seq);
                let wanted = inc(frame.seq);
                if self.sender.is_outstanding(wanted) {
                    self.retransmit(wanted, env);
                }
                self.retire(frame.seq, env);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn send_ack<E: Environment + ?Sized>(&mut self, ack: Seq, env: &mut E) {
        self.stats.acks_sent += 1;
        log::debug!("[link] → ACK ack={ack}");
        self.put_frame(&Frame::ack(ack), env);
    }

    fn send_nak<E: Environment + ?Sized>(&mut self, ack: Seq, env: &mut E) {
        self.stats.naks_sent += 1;
        log::debug!("[link] → NAK ack={ack}");
        self.put_frame(&Frame::nak(ack), env);
    }

    fn put_frame<E: Environment + ?Sized>(&mut self, frame: &Frame, env: &mut E) {
        self.put_bytes(&frame.encode(), env);
    }

    /// Transmit; the transport is busy until it signals ready.
    fn put_bytes<E: Environment + ?Sized>(&mut self, bytes: &[u8], env: &mut E) {
        env.send_frame(bytes);
        self.phl_ready = false;
    }

    fn update_admission<E: Environment + ?Sized>(&mut self, env: &mut E) {
        let allow = self.sender.can_accept() && self.phl_ready;
        if allow {
            env.enable_network_layer();
        } else {
            env.disable_network_layer();
        }
        if allow != self.admission {
            log::trace!("[link] network layer {}", if allow { "enabled" } else { "disabled" });
        }
        self.admission = allow;
    }
}

/// Drive `link` with events from `source` until the source is exhausted.
///
/// Returns the link's final statistics, or the first collaborator contract
/// violation.
pub fn run<S, E>(link: &mut Link, source: &mut S, env: &mut E) -> Result<LinkStats, LinkError>
where
    S: EventSource + ?Sized,
    E: Environment + ?Sized,
{
    link.start(env);
    while let Some(event) = source.wait_for_event() {
        log::trace!("[link] event {event}");
        link.handle_event(event, env)?;
    }
    Ok(link.stats())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
