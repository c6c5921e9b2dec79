//! Deterministic two-station network simulator.
//!
//! Real channels drop, corrupt, and reorder frames.  To exercise the
//! recovery paths reproducibly, this module joins two [`Link`]s (stations
//! [`StationId::A`] and [`StationId::B`]) over a virtual channel driven by a
//! virtual clock and a seeded RNG, applying a configurable fault model:
//!
//! | Fault            | Description                                          |
//! |------------------|------------------------------------------------------|
//! | Frame loss       | Drop a frame with probability `loss_rate`.           |
//! | Corruption       | Flip one random bit with probability `corrupt_rate`. |
//! | Reordering       | Delay a frame by up to `reorder_jitter` extra, with  |
//! |                  | probability `reorder_rate`, letting later frames     |
//! |                  | overtake it.                                         |
//! | Scripted drops   | A user filter that drops chosen frames.              |
//!
//! # Frame lifetime
//!
//! With `NR_BUFS` equal to half the sequence space, selective repeat is only
//! unambiguous if no frame outlives the reuse of its sequence number: a DATA
//! frame still in flight when its sender has moved `NR_BUFS` numbers past it
//! would land inside the receiver's next window and be delivered as a
//! different packet.  The channel therefore has a maximum frame lifetime,
//! measured in sequence numbers rather than time:
//! - a DATA frame expires once its sender has accepted the packet that reuses
//!   its transmit slot;
//! - an ACK or NAK expires once its sender has delivered `NR_BUFS` more
//!   packets, after which its number could fall inside the peer's next
//!   transmit window.
//!
//! Expired frames are discarded on arrival and counted in
//! [`ChannelStats::expired`].  Any `reorder_jitter` is therefore safe.
//!
//! Transmitting a frame keeps the sender's transport busy for `frame_time`.
//! Frames from later events queue behind those still being sent, and a
//! single physical-layer-ready event fires when the last one is out.  Network-layer-ready events are
//! raised only while a station's link has admission enabled and the station
//! has packets queued.  Events are processed one at a time in virtual time
//! order, so a given seed always produces the same run.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::env::QueuedEnv;
use crate::event::Event;
use crate::frame::{Frame, FrameKind};
use crate::link::{Link, LinkConfig, LinkError, LinkStats};
use crate::seq::{Seq, NR_BUFS, SEQ_SPACE};

/// Fault-model settings rejected by [`SimulatorConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum SimulatorError {
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
    #[error("a loss rate of 1 never delivers anything")]
    TotalLoss,
    #[error("frame time must be nonzero")]
    ZeroFrameTime,
}

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.  [`Simulator::new`]
/// clamps values outside it; use [`validate`](Self::validate) to reject them
/// instead.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a frame has one bit flipped.
    pub corrupt_rate: f64,
    /// Probability that a frame is delayed by a random extra amount.
    pub reorder_rate: f64,
    /// One-way propagation delay.
    pub latency: Duration,
    /// Upper bound of the extra delay applied to reordered frames.
    pub reorder_jitter: Duration,
    /// Time the transport is busy per transmitted frame.
    pub frame_time: Duration,
    /// RNG seed; identical seeds give identical runs.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default — the channel is a perfect pipe.
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            reorder_rate: 0.0,
            latency: Duration::from_millis(10),
            reorder_jitter: Duration::from_millis(50),
            frame_time: Duration::from_millis(1),
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    /// Check the fault model describes a channel a link can make progress on.
    pub fn validate(&self) -> Result<(), SimulatorError> {
        for (name, value) in [
            ("loss rate", self.loss_rate),
            ("corrupt rate", self.corrupt_rate),
            ("reorder rate", self.reorder_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimulatorError::Probability { name, value });
            }
        }
        if self.loss_rate >= 1.0 {
            return Err(SimulatorError::TotalLoss);
        }
        if self.frame_time.is_zero() {
            return Err(SimulatorError::ZeroFrameTime);
        }
        Ok(())
    }
}

/// One of the two simulated stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StationId {
    A,
    B,
}

impl StationId {
    pub fn peer(self) -> Self {
        match self {
            StationId::A => StationId::B,
            StationId::B => StationId::A,
        }
    }

    fn index(self) -> usize {
        match self {
            StationId::A => 0,
            StationId::B => 1,
        }
    }
}

impl std::fmt::Display for StationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// What the channel did to the frames it carried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub carried: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub reordered: u64,
    /// Frames discarded for outliving the reuse of their sequence number.
    pub expired: u64,
}

/// Predicate deciding whether to drop a frame sent by a station.
pub type DropFilter = Box<dyn FnMut(StationId, &[u8]) -> bool>;

// ---------------------------------------------------------------------------
// Scheduled events
// ---------------------------------------------------------------------------

/// Point at which an in-flight frame has outlived its sequence number,
/// expressed as a value of one of its sender's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    /// Sender's `packets_accepted` reaches this.
    Accepted(u64),
    /// Sender's `packets_delivered` reaches this.
    Delivered(u64),
}

#[derive(Debug)]
enum Delivery {
    Frame {
        bytes: Vec<u8>,
        expiry: Option<Expiry>,
    },
    PhysicalReady,
}

#[derive(Debug)]
struct Scheduled {
    at: Duration,
    /// Insertion counter; breaks ties so equal-time events keep FIFO order.
    order: u64,
    to: StationId,
    what: Delivery,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: BinaryHeap is a max-heap and we want the earliest first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.order).cmp(&(self.at, self.order))
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Station {
    link: Link,
    env: QueuedEnv<Duration>,
    received: Vec<Vec<u8>>,
    /// End of the last frame handed to the transport.
    busy_until: Duration,
}

/// Two links joined by a faulty virtual channel.
pub struct Simulator {
    config: SimulatorConfig,
    now: Duration,
    rng: StdRng,
    stations: [Station; 2],
    queue: BinaryHeap<Scheduled>,
    next_order: u64,
    drop_filter: Option<DropFilter>,
    channel: ChannelStats,
}

impl Simulator {
    /// Create both stations and bring their transports up at time zero.
    pub fn new(link: LinkConfig, config: SimulatorConfig) -> Self {
        let station = || {
            let mut s = Station {
                link: Link::new(link),
                env: QueuedEnv::new(Duration::ZERO),
                received: Vec::new(),
                busy_until: Duration::ZERO,
            };
            s.link.start(&mut s.env);
            s
        };
        let stations = [station(), station()];

        let mut sim = Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            now: Duration::ZERO,
            stations,
            queue: BinaryHeap::new(),
            next_order: 0,
            drop_filter: None,
            channel: ChannelStats::default(),
        };
        sim.schedule(Duration::ZERO, StationId::A, Delivery::PhysicalReady);
        sim.schedule(Duration::ZERO, StationId::B, Delivery::PhysicalReady);
        sim
    }

    /// Install a filter that drops every frame it returns `true` for.
    pub fn set_drop_filter(&mut self, filter: impl FnMut(StationId, &[u8]) -> bool + 'static) {
        self.drop_filter = Some(Box::new(filter));
    }

    /// Queue a packet at `from`'s network layer.
    pub fn send(&mut self, from: StationId, packet: Vec<u8>) {
        self.station_mut(from).env.push_packet(packet);
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn link(&self, id: StationId) -> &Link {
        &self.station(id).link
    }

    pub fn stats(&self, id: StationId) -> LinkStats {
        self.station(id).link.stats()
    }

    pub fn channel_stats(&self) -> ChannelStats {
        self.channel
    }

    /// Every packet delivered to `id`'s network layer so far, in order.
    pub fn received(&self, id: StationId) -> &[Vec<u8>] {
        &self.station(id).received
    }

    /// `true` when neither station has queued or unacknowledged packets.
    pub fn is_idle(&self) -> bool {
        self.stations
            .iter()
            .all(|s| s.env.pending_packets() == 0 && s.link.sender().nbuffered() == 0)
    }

    /// Process exactly one event.  Returns `false` when nothing is left to do.
    pub fn step(&mut self) -> Result<bool, LinkError> {
        for id in [StationId::A, StationId::B] {
            if self.station(id).env.network_ready() {
                self.dispatch(id, Event::NetworkLayerReady)?;
                return Ok(true);
            }
        }

        let next_timer = [StationId::A, StationId::B]
            .into_iter()
            .filter_map(|id| self.station(id).env.timers.next_deadline().map(|at| (at, id)))
            .min_by_key(|&(at, _)| at);
        let next_delivery = self.queue.peek().map(|s| s.at);

        match (next_timer, next_delivery) {
            (None, None) => Ok(false),
            (Some((at, id)), delivery) if delivery.map_or(true, |d| at < d) => {
                self.now = self.now.max(at);
                let now = self.now;
                let Some(seq) = self.station_mut(id).env.timers.pop_expired(now) else {
                    return Ok(true);
                };
                self.dispatch(id, Event::DataTimeout(seq))?;
                Ok(true)
            }
            _ => {
                let Some(item) = self.queue.pop() else {
                    return Ok(false);
                };
                self.now = self.now.max(item.at);
                let event = match item.what {
                    Delivery::Frame { bytes, expiry } => {
                        if self.has_expired(item.to.peer(), expiry) {
                            self.channel.expired += 1;
                            log::debug!("[sim] {} → frame expired in flight", item.to.peer());
                            return Ok(true);
                        }
                        Event::FrameReceived(bytes)
                    }
                    // Superseded by a later ready for frames queued since.
                    Delivery::PhysicalReady if item.at < self.station(item.to).busy_until => {
                        return Ok(true);
                    }
                    Delivery::PhysicalReady => Event::PhysicalLayerReady,
                };
                self.dispatch(item.to, event)?;
                Ok(true)
            }
        }
    }

    /// Step until both stations are idle or virtual time passes `limit`.
    ///
    /// Returns whether the run settled.
    pub fn run_until_idle(&mut self, limit: Duration) -> Result<bool, LinkError> {
        while !self.is_idle() {
            if self.now > limit {
                log::warn!("[sim] not idle after {:?}", limit);
                return Ok(false);
            }
            if !self.step()? {
                break;
            }
        }
        Ok(self.is_idle())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn station(&self, id: StationId) -> &Station {
        &self.stations[id.index()]
    }

    fn station_mut(&mut self, id: StationId) -> &mut Station {
        &mut self.stations[id.index()]
    }

    fn schedule(&mut self, at: Duration, to: StationId, what: Delivery) {
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(Scheduled { at, order, to, what });
    }

    /// Hand one event to a station, then carry whatever it transmitted.
    fn dispatch(&mut self, id: StationId, event: Event) -> Result<(), LinkError> {
        let now = self.now;
        let frame_time = self.config.frame_time;
        let station = self.station_mut(id);
        station.env.now = now;
        station.link.handle_event(event, &mut station.env)?;

        let delivered = station.env.take_delivered();
        station.received.extend(delivered);
        let frames = station.env.take_outbox();

        if frames.is_empty() {
            return Ok(());
        }
        // Queue behind frames from earlier events still on the wire.
        let packet_len = station.link.config().packet_len;
        let stats = station.link.stats();
        let start = now.max(station.busy_until);
        station.busy_until = start + frame_time * frames.len() as u32;
        let ready_at = station.busy_until;

        for (i, frame) in frames.into_iter().enumerate() {
            let sent_at = start + frame_time * (i as u32 + 1);
            let expiry = frame_expiry(&frame, packet_len, &stats);
            self.transmit(id, frame, expiry, sent_at);
        }
        self.schedule(ready_at, id, Delivery::PhysicalReady);
        Ok(())
    }

    fn has_expired(&self, sender: StationId, expiry: Option<Expiry>) -> bool {
        let stats = self.station(sender).link.stats();
        match expiry {
            Some(Expiry::Accepted(at)) => stats.packets_accepted >= at,
            Some(Expiry::Delivered(at)) => stats.packets_delivered >= at,
            None => false,
        }
    }

    /// Apply the fault model to one frame and schedule its arrival.
    fn transmit(
        &mut self,
        from: StationId,
        mut frame: Vec<u8>,
        expiry: Option<Expiry>,
        sent_at: Duration,
    ) {
        self.channel.carried += 1;

        if let Some(filter) = self.drop_filter.as_mut() {
            if filter(from, &frame) {
                self.channel.dropped += 1;
                log::debug!("[sim] {from} → frame dropped by filter");
                return;
            }
        }
        if self.rng.random_bool(self.config.loss_rate.clamp(0.0, 1.0)) {
            self.channel.dropped += 1;
            log::debug!("[sim] {from} → frame lost");
            return;
        }
        if !frame.is_empty() && self.rng.random_bool(self.config.corrupt_rate.clamp(0.0, 1.0)) {
            let byte = self.rng.random_range(0..frame.len());
            let bit = self.rng.random_range(0..8);
            frame[byte] ^= 1 << bit;
            self.channel.corrupted += 1;
            log::debug!("[sim] {from} → frame corrupted at byte {byte}");
        }

        let mut arrival = sent_at + self.config.latency;
        if self.rng.random_bool(self.config.reorder_rate.clamp(0.0, 1.0)) {
            let jitter_ms = self.config.reorder_jitter.as_millis() as u64;
            arrival += Duration::from_millis(self.rng.random_range(0..=jitter_ms));
            self.channel.reordered += 1;
        }
        self.schedule(
            arrival,
            from.peer(),
            Delivery::Frame {
                bytes: frame,
                expiry,
            },
        );
    }
}

/// Lifetime of a frame its sender just transmitted, given the sender's
/// counters at that moment.  Undecodable frames never expire; the receiver
/// rejects them anyway.
fn frame_expiry(bytes: &[u8], packet_len: usize, sent: &LinkStats) -> Option<Expiry> {
    let frame = Frame::decode(bytes, packet_len).ok()?;
    Some(match frame.kind {
        FrameKind::Data => Expiry::Accepted(data_expiry(sent.packets_accepted, frame.seq)),
        FrameKind::Ack | FrameKind::Nak => {
            Expiry::Delivered(sent.packets_delivered + NR_BUFS as u64)
        }
    })
}

/// `packets_accepted` value at which DATA `seq` expires.
///
/// `accepted` counts every packet the sender ever took, so it is the
/// unwrapped `next_frame_to_send`.  An outstanding `seq` lies at most
/// `NR_BUFS` behind it; the packet `NR_BUFS` after `seq` reuses its slot.
fn data_expiry(accepted: u64, seq: Seq) -> u64 {
    let space = SEQ_SPACE as u64;
    let behind = (accepted % space + space - u64::from(seq)) % space;
    accepted.saturating_sub(behind) + NR_BUFS as u64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerConfig;

    const PKT: usize = 16;

    fn link_config() -> LinkConfig {
        LinkConfig {
            packet_len: PKT,
            timers: TimerConfig {
                data_timeout: Duration::from_millis(200),
            },
        }
    }

    fn packet(i: usize) -> Vec<u8> {
        let mut p = vec![0u8; PKT];
        p[..8].copy_from_slice(&(i as u64).to_be_bytes());
        p
    }

    #[test]
    fn perfect_channel_delivers_in_order() {
        let mut sim = Simulator::new(link_config(), SimulatorConfig::default());
        for i in 0..100 {
            sim.send(StationId::A, packet(i));
        }
        assert!(sim.run_until_idle(Duration::from_secs(60)).unwrap());

        let expected: Vec<_> = (0..100).map(packet).collect();
        assert_eq!(sim.received(StationId::B), expected.as_slice());
        assert_eq!(sim.stats(StationId::A).retransmissions, 0);
        assert_eq!(sim.channel_stats().dropped, 0);
    }

    #[test]
    fn scheduled_events_pop_earliest_first() {
        let mut heap = BinaryHeap::new();
        for (order, at) in [(0, 30), (1, 10), (2, 10), (3, 20)] {
            heap.push(Scheduled {
                at: Duration::from_millis(at),
                order,
                to: StationId::A,
                what: Delivery::PhysicalReady,
            });
        }
        let popped: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|s| s.order)).collect();
        assert_eq!(popped, vec![1, 2, 3, 0]);
    }

    #[test]
    fn same_seed_same_run() {
        let config = SimulatorConfig {
            loss_rate: 0.2,
            corrupt_rate: 0.1,
            reorder_rate: 0.2,
            seed: 7,
            ..SimulatorConfig::default()
        };
        let run = |config: SimulatorConfig| {
            let mut sim = Simulator::new(link_config(), config);
            for i in 0..50 {
                sim.send(StationId::A, packet(i));
            }
            sim.run_until_idle(Duration::from_secs(600)).unwrap();
            (sim.now(), sim.channel_stats(), sim.stats(StationId::A))
        };
        assert_eq!(run(config.clone()), run(config));
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn back_to_back_events_queue_on_the_transport() {
        let mut sim = Simulator::new(link_config(), SimulatorConfig::default());
        // Initial transport-ready for both stations.
        assert!(sim.step().unwrap());
        assert!(sim.step().unwrap());

        sim.send(StationId::A, packet(0));
        assert!(sim.step().unwrap());
        // Same instant: an out-of-order arrival makes A send a NAK while
        // DATA 0 is still on the wire.
        let early = Frame::data(1, packet(1)).encode();
        sim.dispatch(StationId::A, Event::FrameReceived(early)).unwrap();

        let mut arrivals: Vec<Duration> = sim
            .queue
            .iter()
            .filter(|s| matches!(s.what, Delivery::Frame { .. }))
            .map(|s| s.at)
            .collect();
        arrivals.sort();
        assert_eq!(arrivals, vec![ms(11), ms(12)]);
        assert_eq!(sim.stations[0].busy_until, ms(2));

        // The ready for DATA 0 alone is superseded.
        assert!(sim.step().unwrap());
        assert_eq!(sim.now(), ms(1));
        assert!(!sim.link(StationId::A).phl_ready());
        assert!(sim.step().unwrap());
        assert_eq!(sim.now(), ms(2));
        assert!(sim.link(StationId::A).phl_ready());
    }

    #[test]
    fn data_expiry_is_slot_reuse() {
        // 40 accepted: sequence numbers 8..=39 may be outstanding.
        assert_eq!(data_expiry(40, 39), 39 + 33);
        assert_eq!(data_expiry(40, 8), 8 + 33);
        // 130 accepted: seq 63 is packet 127.
        assert_eq!(data_expiry(130, 63), 127 + 33);
    }

    #[test]
    fn previous_cycle_frame_is_discarded() {
        let mut sim = Simulator::new(link_config(), SimulatorConfig::default());
        for i in 0..40 {
            sim.send(StationId::A, packet(i));
        }
        assert!(sim.run_until_idle(Duration::from_secs(60)).unwrap());
        while sim.step().unwrap() {}

        // A copy of packet 0 held back past 40 newer packets.  Seq 0 now
        // reads as packet 64, inside B's window starting at 40.
        let stale = Frame::data(0, packet(0)).encode();
        let sent = LinkStats {
            packets_accepted: 1,
            ..LinkStats::default()
        };
        let expiry = frame_expiry(&stale, PKT, &sent);
        assert_eq!(expiry, Some(Expiry::Accepted(33)));

        let before = sim.stats(StationId::B).frames_received;
        let at = sim.now();
        sim.schedule(at, StationId::B, Delivery::Frame { bytes: stale, expiry });
        assert!(sim.step().unwrap());

        assert_eq!(sim.channel_stats().expired, 1);
        assert_eq!(sim.stats(StationId::B).frames_received, before);
        assert_eq!(sim.received(StationId::B).len(), 40);
    }

    #[test]
    fn validate_rejects_unusable_channels() {
        assert_eq!(SimulatorConfig::default().validate(), Ok(()));

        let dead = SimulatorConfig {
            loss_rate: 1.0,
            ..SimulatorConfig::default()
        };
        assert_eq!(dead.validate(), Err(SimulatorError::TotalLoss));

        let bad = SimulatorConfig {
            reorder_rate: 1.5,
            ..SimulatorConfig::default()
        };
        assert_eq!(
            bad.validate(),
            Err(SimulatorError::Probability {
                name: "reorder rate",
                value: 1.5
            })
        );

        let frozen = SimulatorConfig {
            frame_time: Duration::ZERO,
            ..SimulatorConfig::default()
        };
        assert_eq!(frozen.validate(), Err(SimulatorError::ZeroFrameTime));
    }

    #[test]
    fn station_peer() {
        assert_eq!(StationId::A.peer(), StationId::B);
        assert_eq!(StationId::B.peer(), StationId::A);
    }
}
