//! `sr-link` — a selective-repeat sliding-window data-link layer.
//!
//! Packets from the network layer are carried reliably and in order across a
//! frame channel that may corrupt, lose, or reorder frames.
//!
//! # Architecture
//!
//! ```text
//!   network layer                              network layer
//!        │ get_packet                         ▲ put_packet
//!  ┌─────▼──────────┐                   ┌──────┴─────────┐
//!  │ TransmitWindow │◀── ACK / NAK ─────│ ReceiveWindow  │
//!  └─────┬──────────┘                   └──────▲─────────┘
//!        │ DATA                                │ DATA
//!  ┌─────▼──────────────────────────────────────┴─────────┐
//!  │         Link (event dispatcher, admission)           │
//!  │                frame codec (CRC-32)                  │
//!  └─────┬────────────────────────────────────────────────┘
//!        │ raw frames
//!  ┌─────▼───────────────┐      ┌─────────────────────────┐
//!  │ Simulator (virtual) │  or  │ FrameSocket + Station   │
//!  └─────────────────────┘      └─────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`seq`]       — cyclic sequence-number arithmetic
//! - [`frame`]     — wire format (encode / decode / checksum)
//! - [`sender`]    — transmit window: outstanding frames, cumulative retire
//! - [`receiver`]  — receive window: out-of-order buffer, NAK suppression
//! - [`event`]     — link events and the pluggable event source
//! - [`link`]      — protocol state, event dispatcher, collaborator traits
//! - [`timer`]     — per-frame retransmission deadlines
//! - [`env`]       — buffering implementation of the collaborators
//! - [`simulator`] — deterministic lossy/reordering two-station channel
//! - [`socket`]    — async UDP frame transport
//! - [`station`]   — tokio event loop running a link over a socket

pub mod env;
pub mod event;
pub mod frame;
pub mod link;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod socket;
pub mod station;
pub mod timer;
