//! Issuance engine for Stride
//!
//! This crate orchestrates the lower layers into one node of the dual-role
//! cluster:
//! - Engine: wiring, lifecycle, and the public operation surface
//! - Issuer: per-request issuance, refills, and prefetching
//! - NodeRegistry: self-registration and heartbeat
//! - FailoverController: role selection, take-over, abandon
//! - Step-size change and operator maintenance sweeps
//!
//! The engine is the only component that knows about cross-layer
//! coordination; the store traits and the buffer map know nothing about
//! each other.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod background;
pub mod config;
pub mod engine;
pub mod failover;
pub mod issuer;
pub mod registry;
pub mod routing;
pub mod stepchange;

pub use admin::{ConflictReport, LoadBalanceInfo, ServerStatus, StepDistribution};
pub use background::{BackpressureError, PoolStats, PrefetchPool};
pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use engine::Engine;
pub use failover::{FailoverController, RoleChoice, RoleSelector};
pub use issuer::{GenerateRequest, GenerateResponse, Issuer};
pub use registry::NodeRegistry;
pub use routing::{routing_hint, RoutingHint};
pub use stepchange::{StepChangeEntry, StepChangeReport, StepChangeRequest};
