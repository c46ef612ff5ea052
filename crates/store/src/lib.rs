//! Store adapters for the Stride issuance engine
//!
//! The relational store backing the cluster is external; this crate defines
//! the exact set of atomic operations the issuance core requires
//! ([`SegmentStore`], [`NodeStore`]) and ships [`MemoryStore`], a
//! process-local reference implementation used by tests and single-node
//! deployments. A SQL adapter implements the same traits against two
//! tables (`segments`, `nodes`) with a unique index on
//! (business_type, time_key, role).
//!
//! The core relies on exactly three store properties: atomic single-row
//! updates, the unique index, and read-your-writes. No multi-row
//! transactions are required.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{NodeStore, SegmentStore};
