//! Sequence-number arithmetic over the 6-bit cyclic sequence space.
//!
//! Every window check in the protocol reduces to [`between`].  Sequence
//! numbers carry no absolute ordering; a number is only "before" or "after"
//! another relative to a window's lower edge.
//!
//! ```text
//!   0                      low            high                   63
//!   ├───────────────────────┼──────────────┼──────────────────────┤
//!                           │◀── window ──▶│
//!
//!   wrapped:
//!   0        high                                   low          63
//!   ├──────────┼─────────────────────────────────────┼────────────┤
//!   │◀─ win ──▶│                                     │◀── win ───▶│
//! ```

/// A sequence or acknowledgement number.  Always `<= MAX_SEQ`.
pub type Seq = u8;

/// Width of the sequence field in the frame control byte.
pub const SEQ_BITS: u32 = 6;

/// Largest sequence number; the space is `0..=MAX_SEQ`.
pub const MAX_SEQ: Seq = (1 << SEQ_BITS) - 1;

/// Number of distinct sequence numbers (`W`).
pub const SEQ_SPACE: usize = MAX_SEQ as usize + 1;

/// Window size for both directions.  Half the sequence space, so that a
/// retransmitted old frame can never be mistaken for a new one.
pub const NR_BUFS: usize = SEQ_SPACE / 2;

/// `k + 1` modulo the sequence space.
#[inline]
pub fn inc(k: Seq) -> Seq {
    ((k as usize + 1) % SEQ_SPACE) as Seq
}

/// `k - 1` modulo the sequence space.
#[inline]
pub fn dec(k: Seq) -> Seq {
    ((k as usize + MAX_SEQ as usize) % SEQ_SPACE) as Seq
}

/// Returns `true` when `x` lies in the cyclic half-open interval `[low, high)`.
///
/// Three cases cover every layout of the window:
/// - no wrap: `low <= x < high`
/// - wrapped, `x` above the wrap point: `high < low <= x`
/// - wrapped, `x` below the wrap point: `x < high < low`
///
/// `low == high` is the empty window.
#[inline]
pub fn between(low: Seq, x: Seq, high: Seq) -> bool {
    (low <= x && x < high) || (high < low && low <= x) || (x < high && high < low)
}

/// Buffer slot used by sequence number `seq` in either window.
#[inline]
pub fn slot(seq: Seq) -> usize {
    seq as usize % NR_BUFS
}

/// Advance `k` by `n` positions.
#[inline]
pub fn add(k: Seq, n: usize) -> Seq {
    ((k as usize + n) % SEQ_SPACE) as Seq
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Reference definition: walk forward from `low` until `high`.
    fn walk_contains(low: Seq, x: Seq, high: Seq) -> bool {
        let mut k = low;
        while k != high {
            if k == x {
                return true;
            }
            k = inc(k);
        }
        false
    }

    #[test]
    fn constants() {
        assert_eq!(MAX_SEQ, 63);
        assert_eq!(SEQ_SPACE, 64);
        assert_eq!(NR_BUFS, 32);
    }

    #[test]
    fn inc_wraps_at_max_seq() {
        assert_eq!(inc(0), 1);
        assert_eq!(inc(62), 63);
        assert_eq!(inc(MAX_SEQ), 0);
    }

    #[test]
    fn dec_wraps_at_zero() {
        assert_eq!(dec(1), 0);
        assert_eq!(dec(0), MAX_SEQ);
    }

    #[test]
    fn between_without_wrap() {
        assert!(between(3, 3, 7));
        assert!(between(3, 6, 7));
        assert!(!between(3, 7, 7));
        assert!(!between(3, 2, 7));
    }

    #[test]
    fn between_with_wrap() {
        // Window [60, 4) covers 60..=63 and 0..=3.
        assert!(between(60, 60, 4));
        assert!(between(60, 63, 4));
        assert!(between(60, 0, 4));
        assert!(between(60, 3, 4));
        assert!(!between(60, 4, 4));
        assert!(!between(60, 59, 4));
    }

    #[test]
    fn empty_window_contains_nothing() {
        for x in 0..=MAX_SEQ {
            assert!(!between(17, x, 17));
        }
    }

    #[test]
    fn slot_reuses_buffers_every_half_space() {
        assert_eq!(slot(0), 0);
        assert_eq!(slot(31), 31);
        assert_eq!(slot(32), 0);
        assert_eq!(slot(63), 31);
    }

    #[test]
    fn add_wraps() {
        assert_eq!(add(60, 4), 0);
        assert_eq!(add(10, NR_BUFS), 42);
        assert_eq!(add(40, NR_BUFS), 8);
    }

    proptest! {
        #[test]
        fn between_matches_cyclic_walk(low in 0..=MAX_SEQ, x in 0..=MAX_SEQ, high in 0..=MAX_SEQ) {
            prop_assert_eq!(between(low, x, high), walk_contains(low, x, high));
        }

        #[test]
        fn lower_edge_in_upper_edge_out(low in 0..=MAX_SEQ, len in 1usize..SEQ_SPACE) {
            let high = add(low, len);
            prop_assert!(between(low, low, high));
            prop_assert!(!between(low, high, high));
        }

        #[test]
        fn inc_dec_are_inverse(k in 0..=MAX_SEQ) {
            prop_assert_eq!(dec(inc(k)), k);
            prop_assert_eq!(inc(dec(k)), k);
        }
    }
}
