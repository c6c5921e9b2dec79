//! Selective-repeat send-side window.
//!
//! [`TransmitWindow`] holds up to [`NR_BUFS`] outstanding packets, each in the
//! slot `seq mod NR_BUFS`.  Unlike Go-Back-N, a timeout or NAK resends only
//! the one frame concerned.
//!
//! # Protocol contract
//!
//! - At most [`NR_BUFS`] frames may be outstanding at once; callers check
//!   [`TransmitWindow::can_accept`] before [`TransmitWindow::accept`].
//! - ACKs are **cumulative**: `ack = K` retires every outstanding frame up to
//!   and including `K`.
//! - A frame may be retransmitted only while it is outstanding.
//!
//! This module only manages state; frame emission and timers are the
//! caller's responsibility.

use crate::seq::{between, inc, slot, Seq, NR_BUFS};

// ---------------------------------------------------------------------------
// OutstandingFrame
// ---------------------------------------------------------------------------

/// A packet that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutstandingFrame {
    /// The network-layer packet carried by the DATA frame.
    pub payload: Vec<u8>,
    /// Total number of times the frame has been transmitted.
    pub tx_count: u32,
}

// ---------------------------------------------------------------------------
// TransmitWindow
// ---------------------------------------------------------------------------

/// Send-side window state for one link.
///
/// # Sequence-number layout
///
/// ```text
///  ack_expected      next_frame_to_send
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space (mod 64)
///      │ <─ outstanding ─▶│ <── sendable ───▶
/// ```
#[derive(Debug)]
pub struct TransmitWindow {
    /// Oldest unacknowledged sequence number (lower window edge).
    pub ack_expected: Seq,

    /// Sequence number the next accepted packet will carry.
    pub next_frame_to_send: Seq,

    /// Number of occupied slots.
    nbuffered: usize,

    slots: [Option<OutstandingFrame>; NR_BUFS],
}

impl Default for TransmitWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl TransmitWindow {
    pub fn new() -> Self {
        Self {
            ack_expected: 0,
            next_frame_to_send: 0,
            nbuffered: 0,
            slots: std::array::from_fn(|_| None),
        }
    }

    /// `true` when there is room for at least one more outstanding frame.
    pub fn can_accept(&self) -> bool {
        self.nbuffered < NR_BUFS
    }

    /// Number of frames currently awaiting acknowledgement.
    pub fn nbuffered(&self) -> usize {
        self.nbuffered
    }

    /// `true` when `seq` lies in `[ack_expected, next_frame_to_send)`.
    pub fn is_outstanding(&self, seq: Seq) -> bool {
        between(self.ack_expected, seq, self.next_frame_to_send)
    }

    /// Buffer a new packet and assign it the next sequence number.
    ///
    /// Returns the assigned sequence number.  The caller sends the DATA frame
    /// and arms its timer.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is already full.  Check
    /// [`can_accept`](Self::can_accept) before calling.
    pub fn accept(&mut self, payload: Vec<u8>) -> Seq {
        debug_assert!(
            self.can_accept(),
            "accept called on a full transmit window ({} / {})",
            self.nbuffered,
            NR_BUFS
        );
        let seq = self.next_frame_to_send;
        self.slots[slot(seq)] = Some(OutstandingFrame {
            payload,
            tx_count: 1,
        });
        self.nbuffered += 1;
        self.next_frame_to_send = inc(seq);
        seq
    }

    /// Buffered payload of an outstanding frame.
    #[cfg(test)]
    pub fn payload(&self, seq: Seq) -> Option<&[u8]> {
        if !self.is_outstanding(seq) {
            return None;
        }
        self.slots[slot(seq)].as_ref().map(|e| e.payload.as_slice())
    }

    /// Record a retransmission of `seq` and return its payload.
    ///
    /// Returns `None` when `seq` is not outstanding (already retired, or
    /// never sent), in which case nothing should be resent.
    pub fn on_retransmit(&mut self, seq: Seq) -> Option<&[u8]> {
        if !self.is_outstanding(seq) {
            return None;
        }
        let entry = self.slots[slot(seq)].as_mut()?;
        entry.tx_count += 1;
        Some(entry.payload.as_slice())
    }

    /// Transmission count of an outstanding frame, or `0` if not outstanding.
    pub fn tx_count(&self, seq: Seq) -> u32 {
        if !self.is_outstanding(seq) {
            return 0;
        }
        self.slots[slot(seq)].as_ref().map_or(0, |e| e.tx_count)
    }

    /// Process a cumulative acknowledgement.
    ///
    /// Frees every outstanding slot from `ack_expected` up to and including
    /// `ack` and returns the retired sequence numbers oldest first, so the
    /// caller can stop their timers.  An `ack` outside the outstanding range
    /// (duplicate or stale) retires nothing.
    pub fn retire(&mut self, ack: Seq) -> Vec<Seq> {
        let mut retired = Vec::new();
        while self.is_outstanding(ack) {
            let seq = self.ack_expected;
            self.slots[slot(seq)] = None;
            self.nbuffered -= 1;
            self.ack_expected = inc(seq);
            retired.push(seq);
        }
        retired
    }

    /// Outstanding sequence numbers from oldest to newest.
    #[cfg(test)]
    pub fn outstanding(&self) -> impl Iterator<Item = Seq> + '_ {
        let mut seq = self.ack_expected;
        (0..self.nbuffered).map(move |_| {
            let current = seq;
            seq = inc(seq);
            current
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::{add, MAX_SEQ};

    fn fill(w: &mut TransmitWindow, n: usize) -> Vec<Seq> {
        (0..n).map(|i| w.accept(vec![i as u8])).collect()
    }

    #[test]
    fn initial_state() {
        let w = TransmitWindow::new();
        assert_eq!(w.ack_expected, 0);
        assert_eq!(w.next_frame_to_send, 0);
        assert_eq!(w.nbuffered(), 0);
        assert!(w.can_accept());
        assert!(!w.is_outstanding(0));
    }

    #[test]
    fn accept_assigns_consecutive_numbers() {
        let mut w = TransmitWindow::new();
        assert_eq!(fill(&mut w, 3), vec![0, 1, 2]);
        assert_eq!(w.next_frame_to_send, 3);
        assert_eq!(w.nbuffered(), 3);
        assert_eq!(w.payload(1), Some(&[1u8][..]));
    }

    #[test]
    fn window_full_blocks_accept() {
        let mut w = TransmitWindow::new();
        fill(&mut w, NR_BUFS);
        assert!(!w.can_accept());
        assert_eq!(w.nbuffered(), NR_BUFS);
    }

    #[test]
    fn ack_retires_one() {
        let mut w = TransmitWindow::new();
        fill(&mut w, 2);
        assert_eq!(w.retire(0), vec![0]);
        assert_eq!(w.ack_expected, 1);
        assert_eq!(w.nbuffered(), 1);
        assert_eq!(w.payload(0), None);
    }

    #[test]
    fn cumulative_ack_retires_full_window() {
        let mut w = TransmitWindow::new();
        let sent = fill(&mut w, NR_BUFS);
        let last = *sent.last().unwrap();

        let retired = w.retire(last);
        assert_eq!(retired, sent);
        assert_eq!(w.nbuffered(), 0);
        assert!(w.can_accept());
        assert_eq!(w.ack_expected, w.next_frame_to_send);
    }

    #[test]
    fn duplicate_ack_retires_nothing() {
        let mut w = TransmitWindow::new();
        fill(&mut w, 3);
        assert_eq!(w.retire(1).len(), 2);
        assert!(w.retire(1).is_empty());
        assert_eq!(w.nbuffered(), 1);
    }

    #[test]
    fn ack_beyond_next_frame_ignored() {
        let mut w = TransmitWindow::new();
        fill(&mut w, 3);
        assert!(w.retire(10).is_empty());
        assert_eq!(w.ack_expected, 0);
    }

    #[test]
    fn retransmit_only_outstanding() {
        let mut w = TransmitWindow::new();
        fill(&mut w, 2);
        assert_eq!(w.on_retransmit(1), Some(&[1u8][..]));
        assert_eq!(w.tx_count(1), 2);

        w.retire(1);
        assert_eq!(w.on_retransmit(1), None);
        assert_eq!(w.tx_count(1), 0);
        assert_eq!(w.on_retransmit(5), None);
    }

    #[test]
    fn slots_reused_across_wrap() {
        let mut w = TransmitWindow::new();
        // Walk the window edge to just below the wrap point.
        for _ in 0..60 {
            let seq = w.accept(vec![0]);
            w.retire(seq);
        }
        assert_eq!(w.ack_expected, 60);

        let sent = fill(&mut w, 8);
        assert_eq!(sent, vec![60, 61, 62, MAX_SEQ, 0, 1, 2, 3]);
        assert!(w.is_outstanding(0));
        assert_eq!(w.outstanding().collect::<Vec<_>>(), sent);

        assert_eq!(w.retire(1), vec![60, 61, 62, MAX_SEQ, 0, 1]);
        assert_eq!(w.ack_expected, 2);
        assert_eq!(w.nbuffered(), 2);
    }

    #[test]
    fn outstanding_lists_window_in_order() {
        let mut w = TransmitWindow::new();
        fill(&mut w, 4);
        w.retire(0);
        assert_eq!(
            w.outstanding().collect::<Vec<_>>(),
            vec![1, 2, add(1, 2)]
        );
    }
}
