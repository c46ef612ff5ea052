//! Segment buffer: an atomic cursor over one held interval
//!
//! ## Field discipline
//!
//! The cursor advances through `fetch_add` only and is never rewound; the
//! bounds are republished only through [`SegmentBuffer::install`], which
//! closes the window (`end := i64::MIN`) before writing the new bounds. A
//! `take` racing with an install can therefore only observe Exhausted or
//! burn a single ID of the incoming interval; it can never cross into a
//! foreign interval.
//!
//! ## Refresh flag
//!
//! `need_refresh` is the prefetch gate: the CAS winner spawns the refill
//! task, and the flag stays up until the refreshed interval is installed.
//! A task killed mid-flight would leave the flag stuck, so a loser whose
//! observed attempt timestamp is older than the refresh timeout steals the
//! gate by swapping the timestamp.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use stride_core::{Interval, Role};

/// In-memory cursor over the currently-held interval of one
/// (business, time, role) sequence.
#[derive(Debug)]
pub struct SegmentBuffer {
    role: Role,
    start: AtomicI64,
    end: AtomicI64,
    cursor: AtomicI64,
    need_refresh: AtomicBool,
    /// Epoch-ms of the last refresh attempt; 0 when unset.
    last_refresh_attempt_at: AtomicI64,
    /// Next interval reserved by a prefetch, installed at exhaustion.
    staged: Mutex<Option<Interval>>,
}

impl SegmentBuffer {
    /// Create a buffer holding `interval`.
    pub fn with_interval(role: Role, interval: Interval) -> Self {
        Self {
            role,
            start: AtomicI64::new(interval.start),
            end: AtomicI64::new(interval.end),
            cursor: AtomicI64::new(interval.start),
            need_refresh: AtomicBool::new(false),
            last_refresh_attempt_at: AtomicI64::new(0),
            staged: Mutex::new(None),
        }
    }

    /// Create an exhausted buffer; the first `take` forces a refill.
    ///
    /// Used by the failover take-over, which claims the peer's segments
    /// without allocating intervals for them up front.
    pub fn exhausted(role: Role) -> Self {
        Self::with_interval(role, Interval { start: 1, end: 0 })
    }

    /// The interval-parity class this buffer issues from.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Atomically claim the next ID, or None when the interval is spent.
    ///
    /// The cursor is not rewound on exhaustion; callers refill and retry.
    pub fn take(&self) -> Option<i64> {
        let id = self.cursor.fetch_add(1, Ordering::AcqRel);
        if id <= self.end.load(Ordering::Acquire) {
            Some(id)
        } else {
            None
        }
    }

    /// Consumed fraction of the held interval, clipped to [0, 1].
    pub fn utilisation(&self) -> f64 {
        let start = self.start.load(Ordering::Acquire);
        let end = self.end.load(Ordering::Acquire);
        if end < start {
            return 1.0;
        }
        let consumed = (self.cursor.load(Ordering::Acquire) - start) as f64;
        (consumed / (end - start + 1) as f64).clamp(0.0, 1.0)
    }

    /// Whether the held interval is spent.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.load(Ordering::Acquire) > self.end.load(Ordering::Acquire)
    }

    /// Try to win the refresh gate.
    ///
    /// Returns true when this caller should schedule the refill. A stuck
    /// gate, held longer than `timeout_ms` with no install, is stolen by
    /// swapping the attempt timestamp, which tolerates refill tasks killed
    /// by network failure.
    pub fn try_mark_refresh(&self, timeout_ms: u64, now_ms: i64) -> bool {
        if self
            .need_refresh
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.last_refresh_attempt_at.store(now_ms, Ordering::Release);
            return true;
        }

        let last = self.last_refresh_attempt_at.load(Ordering::Acquire);
        if last != 0
            && now_ms.saturating_sub(last) > timeout_ms as i64
            && self
                .last_refresh_attempt_at
                .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            return true;
        }
        false
    }

    /// Drop the refresh gate after a failed or timed-out refill.
    pub fn clear_refresh(&self) {
        self.need_refresh.store(false, Ordering::Release);
        self.last_refresh_attempt_at.store(0, Ordering::Release);
    }

    /// Whether the refresh gate is currently held.
    pub fn refresh_marked(&self) -> bool {
        self.need_refresh.load(Ordering::Acquire)
    }

    /// Timestamp of the last refresh attempt, 0 when unset.
    pub fn last_refresh_attempt_at(&self) -> i64 {
        self.last_refresh_attempt_at.load(Ordering::Acquire)
    }

    /// Replace the held interval and reset the cursor to its start.
    ///
    /// Closes the window before republishing so concurrent `take`s cannot
    /// observe a mixed epoch. Clears the refresh gate.
    pub fn install(&self, interval: Interval) {
        self.end.store(i64::MIN, Ordering::Release);
        self.start.store(interval.start, Ordering::Release);
        self.cursor.store(interval.start, Ordering::Release);
        self.end.store(interval.end, Ordering::Release);
        self.clear_refresh();
    }

    /// Park a prefetched interval for installation at exhaustion.
    pub fn stage(&self, interval: Interval) {
        *self.staged.lock() = Some(interval);
    }

    /// Claim the staged interval, if any.
    pub fn take_staged(&self) -> Option<Interval> {
        self.staged.lock().take()
    }

    /// Whether a prefetched interval is waiting.
    pub fn has_staged(&self) -> bool {
        self.staged.lock().is_some()
    }

    /// The held bounds, for status reporting.
    pub fn bounds(&self) -> Interval {
        Interval {
            start: self.start.load(Ordering::Acquire),
            end: self.end.load(Ordering::Acquire),
        }
    }
}
