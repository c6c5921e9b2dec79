//! Events driving the link state machine.
//!
//! The link has no explicit state enum: its state is the window variables
//! held by [`crate::link::Link`].  What moves it is one of the [`Event`]s
//! below, delivered one at a time by an [`EventSource`].
//!
//! ```text
//!   NetworkLayerReady ──▶ accept packet ──▶ DATA ──▶ transport
//!   PhysicalLayerReady ─▶ transport ready
//!   FrameReceived ──────▶ decode ─┬─ DATA ─▶ receive window ─▶ network layer
//!                                 ├─ ACK ──▶ retire
//!                                 └─ NAK ──▶ retransmit one, retire
//!   DataTimeout(seq) ───▶ retransmit seq
//! ```

use crate::seq::Seq;

/// One input to the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The network layer has a packet and admission is enabled.
    NetworkLayerReady,
    /// The transport can take another frame.
    PhysicalLayerReady,
    /// Raw bytes of one frame as read from the transport.
    FrameReceived(Vec<u8>),
    /// The retransmission timer of DATA frame `seq` expired.
    DataTimeout(Seq),
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::NetworkLayerReady => write!(f, "NETWORK_LAYER_READY"),
            Event::PhysicalLayerReady => write!(f, "PHYSICAL_LAYER_READY"),
            Event::FrameReceived(bytes) => write!(f, "FRAME_RECEIVED ({} bytes)", bytes.len()),
            Event::DataTimeout(seq) => write!(f, "DATA_TIMEOUT {seq}"),
        }
    }
}

/// Blocking source of link events.
///
/// Returns `None` once the source is exhausted, which ends
/// [`crate::link::run`].
pub trait EventSource {
    fn wait_for_event(&mut self) -> Option<Event>;
}

impl<S: EventSource + ?Sized> EventSource for &mut S {
    fn wait_for_event(&mut self) -> Option<Event> {
        (**self).wait_for_event()
    }
}

/// Replays a fixed list of events.  Handy for driving a link by hand.
impl EventSource for std::collections::VecDeque<Event> {
    fn wait_for_event(&mut self) -> Option<Event> {
        self.pop_front()
    }
}
