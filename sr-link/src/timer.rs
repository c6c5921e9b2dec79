//! Per-frame retransmission timers.
//!
//! Every outstanding DATA frame has its own timer.  When it fires the link
//! resends that frame alone.  This module provides:
//! - [`TimerConfig`] — the timeout applied to every DATA frame.
//! - [`TimerWheel`] — one optional deadline per transmit slot, used by the
//!   drivers that implement [`crate::link::Timers`].
//!
//! The wheel is generic over the clock's instant type so the same code runs
//! against the simulator's virtual clock (`Duration` since start) and
//! `tokio::time::Instant`.

use std::ops::Add;
use std::time::Duration;

use crate::seq::{slot, Seq, NR_BUFS};

/// Default DATA frame timeout.
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_millis(2000);

/// Adjustable timeout parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Time after which an unacknowledged DATA frame is resent.
    pub data_timeout: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            data_timeout: DEFAULT_DATA_TIMEOUT,
        }
    }
}

/// One armed timer: which sequence number it belongs to and when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadline<I> {
    seq: Seq,
    at: I,
}

/// Fixed set of [`NR_BUFS`] timers indexed by `seq mod NR_BUFS`.
///
/// Arming a sequence number replaces whatever its slot held.  Cancelling is
/// keyed by sequence number, so stopping a timer that already fired (or whose
/// slot has been reused) does nothing.
#[derive(Debug, Clone)]
pub struct TimerWheel<I> {
    deadlines: [Option<Deadline<I>>; NR_BUFS],
}

impl<I> Default for TimerWheel<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> TimerWheel<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    pub fn new() -> Self {
        Self {
            deadlines: [None; NR_BUFS],
        }
    }

    /// Arm (or re-arm) the timer for `seq` to fire `timeout` after `now`.
    pub fn arm(&mut self, seq: Seq, now: I, timeout: Duration) {
        self.deadlines[slot(seq)] = Some(Deadline {
            seq,
            at: now + timeout,
        });
    }

    /// Cancel the timer for `seq`.  A no-op if it is not armed.
    pub fn cancel(&mut self, seq: Seq) {
        let entry = &mut self.deadlines[slot(seq)];
        if entry.is_some_and(|d| d.seq == seq) {
            *entry = None;
        }
    }

    /// `true` when the timer for `seq` is armed.
    pub fn is_armed(&self, seq: Seq) -> bool {
        self.deadlines[slot(seq)].is_some_and(|d| d.seq == seq)
    }

    /// Number of armed timers.
    pub fn armed(&self) -> usize {
        self.deadlines.iter().filter(|d| d.is_some()).count()
    }

    /// Earliest pending deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<I> {
        self.deadlines.iter().flatten().map(|d| d.at).min()
    }

    /// Remove and return the earliest timer that has expired by `now`.
    ///
    /// Call repeatedly to drain every expired timer, oldest deadline first.
    pub fn pop_expired(&mut self, now: I) -> Option<Seq> {
        let index = self
            .deadlines
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.filter(|d| d.at <= now).map(|d| (d.at, i)))
            .min()?
            .1;
        self.deadlines[index].take().map(|d| d.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn default_timeout_is_two_seconds() {
        assert_eq!(TimerConfig::default().data_timeout, ms(2000));
    }

    #[test]
    fn empty_wheel_has_no_deadline() {
        let mut w: TimerWheel<Duration> = TimerWheel::new();
        assert_eq!(w.next_deadline(), None);
        assert_eq!(w.pop_expired(ms(10_000)), None);
    }

    #[test]
    fn arm_and_expire() {
        let mut w = TimerWheel::new();
        w.arm(3, ms(100), ms(50));
        assert!(w.is_armed(3));
        assert_eq!(w.next_deadline(), Some(ms(150)));
        assert_eq!(w.pop_expired(ms(149)), None);
        assert_eq!(w.pop_expired(ms(150)), Some(3));
        assert!(!w.is_armed(3));
    }

    #[test]
    fn expired_timers_pop_oldest_first() {
        let mut w = TimerWheel::new();
        w.arm(5, ms(20), ms(100));
        w.arm(1, ms(0), ms(100));
        w.arm(9, ms(10), ms(100));
        assert_eq!(w.pop_expired(ms(500)), Some(1));
        assert_eq!(w.pop_expired(ms(500)), Some(9));
        assert_eq!(w.pop_expired(ms(500)), Some(5));
        assert_eq!(w.pop_expired(ms(500)), None);
    }

    #[test]
    fn rearm_pushes_deadline_back() {
        let mut w = TimerWheel::new();
        w.arm(2, ms(0), ms(100));
        w.arm(2, ms(80), ms(100));
        assert_eq!(w.pop_expired(ms(100)), None);
        assert_eq!(w.next_deadline(), Some(ms(180)));
    }

    #[test]
    fn cancel_after_fire_is_noop() {
        let mut w = TimerWheel::new();
        w.arm(4, ms(0), ms(10));
        assert_eq!(w.pop_expired(ms(10)), Some(4));
        w.cancel(4);
        assert_eq!(w.armed(), 0);
    }

    #[test]
    fn cancel_ignores_other_sequence_in_same_slot() {
        let mut w = TimerWheel::new();
        // 36 shares slot 4 with sequence number 4.
        w.arm(36, ms(0), ms(10));
        w.cancel(4);
        assert!(w.is_armed(36));
        w.cancel(36);
        assert!(!w.is_armed(36));
    }
}
