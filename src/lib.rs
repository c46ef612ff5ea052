//! # Stride
//!
//! A dual-role segmented ID issuance engine: monotonically-advancing
//! 64-bit identifiers at high throughput, with strong uniqueness across a
//! cluster of two cooperating nodes sharing a relational store.
//!
//! Each node is **Even** or **Odd** and owns half of the interval sequence
//! for every (business type, time key) pair; under single-node operation
//! the surviving role transparently takes over the other's intervals.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stride::{Engine, EngineConfig, GenerateRequest, MemoryStore, Role};
//!
//! fn main() -> stride::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let engine = Engine::new(
//!         EngineConfig::for_role(Role::Odd),
//!         store.clone(),
//!         store,
//!     )?;
//!     engine.start()?;
//!
//!     let mut request = GenerateRequest::new("order");
//!     request.count = 10;
//!     let batch = engine.generate(&request)?;
//!     assert_eq!(batch.ids.len(), 10);
//!
//!     engine.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! | Layer | Crate | Responsibility |
//! |-------|-------|----------------|
//! | Types & algebra | `stride-core` | Roles, records, errors, the odd/even interval allocator |
//! | Store adapter | `stride-store` | The atomic operations the core needs from the shared store |
//! | Buffers | `stride-buffer` | Atomic cursors over held intervals, concurrent buffer map |
//! | Engine | `stride-engine` | Issuance, heartbeat, failover, step change, admin |
//!
//! The [`Engine`] struct is the entry point; the RPC transport on top of
//! it is deliberately out of scope. Stores are passed in as trait objects:
//! [`MemoryStore`] for tests and single-node use, a SQL adapter for the
//! shared cluster store.

pub use stride_core::{
    interval, limits, now_ms, BufferKey, BufferKind, Error, Interval, NodeRecord, NodeStatus,
    Result, Role, Segment, SegmentKey,
};

pub use stride_buffer::{BufferMap, SegmentBuffer};

pub use stride_store::{MemoryStore, NodeStore, SegmentStore};

pub use stride_engine::{
    routing_hint, ConflictReport, Engine, EngineConfig, GenerateRequest, GenerateResponse,
    RoutingHint, ServerStatus, StepChangeReport, StepChangeRequest, StepDistribution,
};
