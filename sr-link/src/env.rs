//! Buffering implementation of the link's collaborators.
//!
//! [`QueuedEnv`] stands in for the network layer, the transport, and the
//! timer service at once, by recording everything the link asks for:
//! - packets waiting to be sent are queued until the link pulls them,
//! - delivered packets and outgoing frames pile up until the driver takes
//!   them,
//! - timers live in a [`TimerWheel`] keyed to the driver-maintained `now`.
//!
//! The simulator and the UDP station both drive a [`crate::link::Link`]
//! through one of these, flushing the outbox after each event.

use std::collections::VecDeque;
use std::ops::Add;
use std::time::Duration;

use crate::link::{NetworkLayer, PhysicalLayer, Timers};
use crate::seq::Seq;
use crate::timer::TimerWheel;

#[derive(Debug)]
pub struct QueuedEnv<I> {
    /// Current time on the driver's clock; timers are armed relative to it.
    pub now: I,
    pub timers: TimerWheel<I>,
    outgoing: VecDeque<Vec<u8>>,
    delivered: Vec<Vec<u8>>,
    outbox: Vec<Vec<u8>>,
    admission: bool,
}

impl<I> QueuedEnv<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    pub fn new(now: I) -> Self {
        Self {
            now,
            timers: TimerWheel::new(),
            outgoing: VecDeque::new(),
            delivered: Vec::new(),
            outbox: Vec::new(),
            admission: false,
        }
    }

    /// Queue a packet for the link to pick up.
    pub fn push_packet(&mut self, packet: Vec<u8>) {
        self.outgoing.push_back(packet);
    }

    /// Packets still waiting to enter the transmit window.
    pub fn pending_packets(&self) -> usize {
        self.outgoing.len()
    }

    /// Whether the link currently allows the network layer to send.
    pub fn admission_enabled(&self) -> bool {
        self.admission
    }

    /// `true` when a [`crate::event::Event::NetworkLayerReady`] should be
    /// raised: admission is on and a packet is waiting.
    pub fn network_ready(&self) -> bool {
        self.admission && !self.outgoing.is_empty()
    }

    /// Frames the link transmitted since the last call, in order.
    pub fn take_outbox(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }

    /// Packets delivered since the last call, in order.
    pub fn take_delivered(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.delivered)
    }
}

impl<I> NetworkLayer for QueuedEnv<I> {
    fn get_packet(&mut self) -> Option<Vec<u8>> {
        self.outgoing.pop_front()
    }

    fn put_packet(&mut self, packet: &[u8]) {
        self.delivered.push(packet.to_vec());
    }

    fn enable_network_layer(&mut self) {
        self.admission = true;
    }

    fn disable_network_layer(&mut self) {
        self.admission = false;
    }
}

impl<I> PhysicalLayer for QueuedEnv<I> {
    fn send_frame(&mut self, frame: &[u8]) {
        self.outbox.push(frame.to_vec());
    }
}

impl<I> Timers for QueuedEnv<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    fn start_timer(&mut self, seq: Seq, timeout: Duration) {
        self.timers.arm(seq, self.now, timeout);
    }

    fn stop_timer(&mut self, seq: Seq) {
        self.timers.cancel(seq);
    }
}
