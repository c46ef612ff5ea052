//! Foundational types for the issuance core
//!
//! - Role: Even/Odd interval-parity class
//! - SegmentKey: (business_type, time_key) addressing for segment records
//! - Segment: the persistent row tracking the last claimed interval
//! - NodeRecord / NodeStatus: cluster membership rows
//! - BufferKey / BufferKind: in-memory buffer addressing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interval-parity class of a node or segment record.
///
/// Odd owns intervals with even index (the first interval `[1, S]` among
/// them); Even owns intervals with odd index. The two classes partition the
/// integer line with no per-ID parity tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Shard type 0: owns intervals with odd index ([S+1, 2S], [3S+1, 4S], ...)
    Even,
    /// Shard type 1: owns intervals with even index ([1, S], [2S+1, 3S], ...)
    Odd,
}

impl Role {
    /// The opposite role.
    pub fn opposite(self) -> Role {
        match self {
            Role::Even => Role::Odd,
            Role::Odd => Role::Even,
        }
    }

    /// Numeric shard type as exposed on the wire (Even = 0, Odd = 1).
    pub fn index(self) -> u8 {
        match self {
            Role::Even => 0,
            Role::Odd => 1,
        }
    }

    /// Parse a wire shard type.
    ///
    /// Returns None for anything other than 0 or 1.
    pub fn from_index(index: u8) -> Option<Role> {
        match index {
            0 => Some(Role::Even),
            1 => Some(Role::Odd),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Even => write!(f, "even"),
            Role::Odd => write!(f, "odd"),
        }
    }
}

/// Addressing for a segment record: the (business_type, time_key) pair.
///
/// The time key is an opaque sub-namespace, typically a yyyymmdd date.
/// An empty time key is a valid, distinct key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentKey {
    /// Caller-supplied namespace; independent ID sequence space.
    pub business_type: String,
    /// Optional sub-namespace for periodic rollover. Empty allowed.
    pub time_key: String,
}

impl SegmentKey {
    /// Create a segment key.
    pub fn new(business_type: impl Into<String>, time_key: impl Into<String>) -> Self {
        Self {
            business_type: business_type.into(),
            time_key: time_key.into(),
        }
    }
}

// Displays as "business@time" ("business@-" for the empty time key) so log
// lines stay grep-able.
impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.time_key.is_empty() {
            write!(f, "{}@-", self.business_type)
        } else {
            write!(f, "{}@{}", self.business_type, self.time_key)
        }
    }
}

/// Persistent segment record: one per (business_type, time_key, role).
///
/// `max_value` is the inclusive upper bound of the last interval this role
/// has claimed; it only ever moves forward. `max_value` is always equal to
/// `(k + 1) * step_size` for some non-negative interval index `k` whose
/// parity matches `role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Business namespace.
    pub business_type: String,
    /// Time sub-namespace (may be empty).
    pub time_key: String,
    /// Interval-parity class this record belongs to.
    pub role: Role,
    /// End of the currently-reserved interval (inclusive).
    pub max_value: i64,
    /// Current interval width.
    pub step_size: u32,
    /// Last update timestamp, milliseconds since epoch.
    pub updated_at_ms: i64,
}

impl Segment {
    /// The (business, time) addressing pair of this record.
    pub fn key(&self) -> SegmentKey {
        SegmentKey::new(self.business_type.clone(), self.time_key.clone())
    }

    /// Progress ratio used for least-loaded role selection.
    pub fn load_ratio(&self) -> f64 {
        self.max_value as f64 / self.step_size as f64
    }
}

/// Liveness status of a node record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Heartbeat seen recently.
    Online,
    /// Heartbeat missed past the staleness threshold (or never registered).
    Offline,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Persistent node record: one per node instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node identity (host + address + role).
    pub node_id: String,
    /// The node's configured role.
    pub role: Role,
    /// Current liveness status.
    pub status: NodeStatus,
    /// Last heartbeat timestamp, milliseconds since epoch.
    pub last_heartbeat_ms: i64,
}

/// How a node came to hold a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferKind {
    /// Created through normal issuance on this node.
    Own,
    /// Created by the failover take-over for the peer's role; abandoned
    /// when the peer returns.
    Proxy,
}

/// In-memory buffer addressing: (business, time, role, kind).
///
/// Own and Proxy buffers for the same (business, time, role) are distinct
/// entries so the abandon pass can drop proxies without touching regular
/// buffers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferKey {
    /// Business namespace.
    pub business_type: String,
    /// Time sub-namespace.
    pub time_key: String,
    /// Which role's interval class the buffer issues from.
    pub role: Role,
    /// Own vs failover-proxy.
    pub kind: BufferKind,
}

impl BufferKey {
    /// Create a buffer key.
    pub fn new(
        business_type: impl Into<String>,
        time_key: impl Into<String>,
        role: Role,
        kind: BufferKind,
    ) -> Self {
        Self {
            business_type: business_type.into(),
            time_key: time_key.into(),
            role,
            kind,
        }
    }

    /// The persistent-record key this buffer draws from.
    pub fn segment_key(&self) -> SegmentKey {
        SegmentKey::new(self.business_type.clone(), self.time_key.clone())
    }
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BufferKind::Own => "own",
            BufferKind::Proxy => "proxy",
        };
        write!(
            f,
            "{}@{}/{}/{}",
            self.business_type,
            if self.time_key.is_empty() { "-" } else { &self.time_key },
            self.role,
            kind
        )
    }
}
