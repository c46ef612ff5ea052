//! Odd/even interval allocation
//!
//! The integer line for a (business, time) pair is divided into contiguous
//! intervals of width `step`: interval `k` covers `[k*S + 1, (k+1)*S]` for
//! `k = 0, 1, 2, ...`. The Odd role owns intervals with even `k`, the Even
//! role owns intervals with odd `k`. This partitions the line per role with
//! no per-ID parity tests and no wasted IDs inside an interval; on refill a
//! role simply jumps over the peer's intervals.
//!
//! All functions here are pure. Refill interval selection always anchors on
//! the *global* maximum (the larger of the two roles' stored bounds) so a
//! freshly selected interval lies strictly above every interval either role
//! has ever claimed.

use crate::types::Role;

/// An inclusive ID range `[start, end]` of one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// First ID of the interval.
    pub start: i64,
    /// Last ID of the interval; also the `max_value` persisted for it.
    pub end: i64,
}

impl Interval {
    /// Number of IDs in the interval.
    pub fn width(&self) -> i64 {
        self.end - self.start + 1
    }

    /// Whether `id` falls inside the interval.
    pub fn contains(&self, id: i64) -> bool {
        id >= self.start && id <= self.end
    }
}

/// The role that owns interval index `k`.
pub fn owner_of(k: i64) -> Role {
    if k % 2 == 0 {
        Role::Odd
    } else {
        Role::Even
    }
}

/// The bounds of interval index `k` at width `step`.
pub fn interval_of(k: i64, step: u32) -> Interval {
    let s = step as i64;
    Interval {
        start: k * s + 1,
        end: (k + 1) * s,
    }
}

/// The first interval a role claims on a fresh record.
///
/// Odd starts at k = 0 (`max_value = S`), Even at k = 1 (`max_value = 2S`).
pub fn initial_interval(role: Role, step: u32) -> Interval {
    match role {
        Role::Odd => interval_of(0, step),
        Role::Even => interval_of(1, step),
    }
}

/// The index of the interval ending at `max_value`.
///
/// Only meaningful when `max_value` is a positive multiple of `step`.
pub fn index_ending_at(max_value: i64, step: u32) -> i64 {
    (max_value - 1) / step as i64
}

/// Whether a stored `max_value` is consistent with its role and step.
///
/// A record is aligned when `max_value` is a positive multiple of `step`
/// and the parity of the interval ending there matches the role. A record
/// failing this check is corrupt and must not be issued from.
pub fn is_aligned(max_value: i64, step: u32, role: Role) -> bool {
    max_value > 0
        && max_value % step as i64 == 0
        && owner_of(index_ending_at(max_value, step)) == role
}

/// The next interval a role may claim, strictly above the global maximum.
///
/// `global_max` is the larger of the two roles' stored bounds for the
/// (business, time) pair; `None` when both records are absent, in which
/// case it defaults to `step`. The candidate index starts one past the
/// interval containing `global_max` and advances at most one more slot to
/// reach the role's parity.
///
/// When the step size is changing, the caller passes the *new* step; the
/// result still lands strictly above `global_max`.
pub fn next_interval(global_max: Option<i64>, step: u32, role: Role) -> Interval {
    let global_max = global_max.unwrap_or(step as i64).max(1);
    let mut candidate = index_ending_at(global_max, step) + 1;
    if owner_of(candidate) != role {
        candidate += 1;
    }
    interval_of(candidate, step)
}
