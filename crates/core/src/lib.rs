//! Core types for the Stride ID issuance engine
//!
//! This crate defines the foundational vocabulary shared by every layer:
//! - Role: the Even/Odd interval-parity class of a node
//! - SegmentKey / Segment: the persistent per-(business, time, role) record
//! - NodeRecord: cluster membership rows
//! - BufferKey: the in-memory buffer addressing scheme
//! - The interval allocator: the odd/even partition algebra
//! - Error: the unified error type for all Stride APIs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod interval;
pub mod limits;
pub mod types;

pub use error::{Error, Result};
pub use interval::{initial_interval, next_interval, Interval};
pub use types::{BufferKey, BufferKind, NodeRecord, NodeStatus, Role, Segment, SegmentKey};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
