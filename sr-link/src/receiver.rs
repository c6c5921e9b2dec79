//! Selective-repeat receive-side window.
//!
//! [`ReceiveWindow`] implements the receiver side of selective repeat:
//!
//! - Any DATA frame inside `[frame_expected, too_far)` is **buffered**, even
//!   when it arrives ahead of a gap.
//! - Buffered frames are delivered to the network layer as soon as they form
//!   a contiguous run starting at `frame_expected`.
//! - A frame that is not the expected one requests a NAK, but only one NAK is
//!   outstanding per gap; delivering a packet re-enables NAKs.
//! - Duplicates inside the window are dropped without effect.
//! - A frame behind the window was already delivered, so the sender missed
//!   an ACK.  It is dropped and answered with the current cumulative ACK,
//!   unless a NAK carrying the same number already goes out.
//!
//! This module only manages state; frame emission is the caller's
//! responsibility.

use crate::seq::{add, between, dec, inc, slot, Seq, NR_BUFS};

/// What the caller must do after a DATA frame was processed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DataOutcome {
    /// Send a NAK carrying this acknowledgement number first.
    pub nak: Option<Seq>,
    /// `true` when the frame was newly stored (not a duplicate, in window).
    pub stored: bool,
    /// Packets released to the network layer, in sequence order.
    pub delivered: Vec<Vec<u8>>,
    /// Send a cumulative ACK carrying this number, after delivery or in
    /// answer to an already-delivered frame.
    pub ack: Option<Seq>,
}

/// Receive-side window state for one link.
#[derive(Debug)]
pub struct ReceiveWindow {
    /// Oldest sequence number not yet delivered (lower window edge).
    pub frame_expected: Seq,

    /// One past the upper window edge; always `frame_expected + NR_BUFS`.
    pub too_far: Seq,

    /// `true` while no NAK is outstanding for the current gap.
    no_nak: bool,

    /// Out-of-order arrivals; `Some` marks the slot as arrived.
    slots: [Option<Vec<u8>>; NR_BUFS],
}

impl Default for ReceiveWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveWindow {
    pub fn new() -> Self {
        Self {
            frame_expected: 0,
            too_far: add(0, NR_BUFS),
            no_nak: true,
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Acknowledgement number carried by outgoing ACK and NAK frames.
    pub fn ack_number(&self) -> Seq {
        dec(self.frame_expected)
    }

    /// `true` while a NAK may still be sent for the current gap.
    #[cfg(test)]
    pub fn nak_allowed(&self) -> bool {
        self.no_nak
    }

    /// Claim the right to send a NAK.
    ///
    /// Returns the acknowledgement number to put in the NAK, or `None` when a
    /// NAK has already been sent for this gap.
    pub fn request_nak(&mut self) -> Option<Seq> {
        if !self.no_nak {
            return None;
        }
        self.no_nak = false;
        Some(self.ack_number())
    }

    /// `true` when `seq` has arrived and is waiting for the gap to fill.
    #[cfg(test)]
    pub fn has_arrived(&self, seq: Seq) -> bool {
        between(self.frame_expected, seq, self.too_far) && self.slots[slot(seq)].is_some()
    }

    /// Number of out-of-order frames currently buffered.
    #[cfg(test)]
    pub fn buffered(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Process a validated DATA frame.
    pub fn on_data(&mut self, seq: Seq, payload: Vec<u8>) -> DataOutcome {
        let mut outcome = DataOutcome::default();

        if seq != self.frame_expected {
            outcome.nak = self.request_nak();
        }

        if !between(self.frame_expected, seq, self.too_far) {
            if outcome.nak.is_none() {
                outcome.ack = Some(self.ack_number());
            }
            return outcome;
        }
        if self.slots[slot(seq)].is_some() {
            return outcome;
        }

        self.slots[slot(seq)] = Some(payload);
        outcome.stored = true;

        while let Some(packet) = self.slots[slot(self.frame_expected)].take() {
            outcome.delivered.push(packet);
            self.no_nak = true;
            self.frame_expected = inc(self.frame_expected);
            self.too_far = inc(self.too_far);
        }

        if !outcome.delivered.is_empty() {
            outcome.ack = Some(self.ack_number());
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq::{MAX_SEQ, SEQ_SPACE};
    use proptest::prelude::*;

    fn pkt(seq: Seq) -> Vec<u8> {
        vec![seq, !seq]
    }

    #[test]
    fn initial_state() {
        let r = ReceiveWindow::new();
        assert_eq!(r.frame_expected, 0);
        assert_eq!(r.too_far, NR_BUFS as Seq);
        assert_eq!(r.ack_number(), MAX_SEQ);
        assert!(r.nak_allowed());
    }

    #[test]
    fn in_order_frame_delivered_and_acked() {
        let mut r = ReceiveWindow::new();
        let out = r.on_data(0, pkt(0));
        assert_eq!(out.nak, None);
        assert!(out.stored);
        assert_eq!(out.delivered, vec![pkt(0)]);
        assert_eq!(out.ack, Some(0));
        assert_eq!(r.frame_expected, 1);
        assert_eq!(r.too_far, 33);
    }

    #[test]
    fn out_of_order_frame_buffered_with_one_nak() {
        let mut r = ReceiveWindow::new();

        let out = r.on_data(2, pkt(2));
        assert_eq!(out.nak, Some(MAX_SEQ));
        assert!(out.stored);
        assert!(out.delivered.is_empty());
        assert_eq!(out.ack, None);

        // Second gap frame: NAK suppressed.
        let out = r.on_data(1, pkt(1));
        assert_eq!(out.nak, None);
        assert!(out.delivered.is_empty());
        assert_eq!(r.buffered(), 2);
        assert!(r.has_arrived(1));
    }

    #[test]
    fn gap_fill_releases_contiguous_run() {
        let mut r = ReceiveWindow::new();
        r.on_data(1, pkt(1));
        r.on_data(2, pkt(2));
        r.on_data(4, pkt(4));

        let out = r.on_data(0, pkt(0));
        assert_eq!(out.delivered, vec![pkt(0), pkt(1), pkt(2)]);
        assert_eq!(out.ack, Some(2));
        assert_eq!(r.frame_expected, 3);
        assert!(r.nak_allowed());
        assert!(r.has_arrived(4));
    }

    #[test]
    fn duplicate_in_window_ignored() {
        let mut r = ReceiveWindow::new();
        r.on_data(3, pkt(3));
        let out = r.on_data(3, vec![0xff, 0xff]);
        assert!(!out.stored);
        assert!(out.delivered.is_empty());

        let out = r.on_data(0, pkt(0));
        assert_eq!(out.delivered, vec![pkt(0)]);
        r.on_data(1, pkt(1));
        let out = r.on_data(2, pkt(2));
        // The first copy of 3 wins.
        assert_eq!(out.delivered, vec![pkt(2), pkt(3)]);
    }

    #[test]
    fn old_duplicate_not_redelivered() {
        let mut r = ReceiveWindow::new();
        r.on_data(0, pkt(0));
        let out = r.on_data(0, pkt(0));
        assert!(!out.stored);
        assert!(out.delivered.is_empty());
        // Not the expected frame, so it provokes a NAK carrying the ACK.
        assert_eq!(out.nak, Some(0));
        assert_eq!(out.ack, None);
    }

    #[test]
    fn old_duplicate_reacked_while_nak_suppressed() {
        let mut r = ReceiveWindow::new();
        r.on_data(0, pkt(0));
        r.on_data(0, pkt(0)); // uses up the NAK
        let out = r.on_data(0, pkt(0));
        assert_eq!(out.nak, None);
        assert_eq!(out.ack, Some(0));
        assert!(out.delivered.is_empty());
    }

    #[test]
    fn frame_outside_window_dropped() {
        let mut r = ReceiveWindow::new();
        let out = r.on_data(NR_BUFS as Seq, pkt(32));
        assert!(!out.stored);
        assert!(out.delivered.is_empty());
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn window_slides_across_wrap() {
        let mut r = ReceiveWindow::new();
        for seq in 0..62u8 {
            r.on_data(seq, pkt(seq));
        }
        assert_eq!(r.frame_expected, 62);
        assert_eq!(r.too_far, 30);

        r.on_data(0, pkt(0));
        r.on_data(63, pkt(63));
        let out = r.on_data(62, pkt(62));
        assert_eq!(out.delivered, vec![pkt(62), pkt(63), pkt(0)]);
        assert_eq!(out.ack, Some(0));
    }

    proptest! {
        /// Feed arbitrary duplicates and reorderings drawn from a sliding
        /// span of the sequence stream: every packet is delivered at most once
        /// and in stream order.
        #[test]
        fn no_duplicate_or_out_of_order_delivery(
            picks in proptest::collection::vec(0usize..NR_BUFS, 1..400),
        ) {
            let mut r = ReceiveWindow::new();
            let mut delivered: Vec<usize> = Vec::new();

            for pick in picks {
                // Stream index of the frame: somewhere in the current window.
                let base = delivered.len();
                let index = base + pick;
                let seq = (index % SEQ_SPACE) as Seq;
                let payload = (index as u32).to_be_bytes().to_vec();

                for p in r.on_data(seq, payload).delivered {
                    let got = u32::from_be_bytes([p[0], p[1], p[2], p[3]]) as usize;
                    prop_assert_eq!(got, delivered.len());
                    delivered.push(got);
                }
            }
        }

        #[test]
        fn stale_frames_never_delivered(
            advance in 1usize..200,
            back in 1usize..=NR_BUFS,
        ) {
            let mut r = ReceiveWindow::new();
            for i in 0..advance {
                r.on_data((i % SEQ_SPACE) as Seq, vec![0]);
            }
            let stale = ((advance + SEQ_SPACE - back) % SEQ_SPACE) as Seq;
            let out = r.on_data(stale, vec![1]);
            prop_assert!(out.delivered.is_empty());
            prop_assert!(!out.stored);
        }
    }
}
