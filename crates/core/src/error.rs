//! Error types for the Stride issuance engine
//!
//! One unified error type for all Stride APIs, built with `thiserror`.
//!
//! ## Error Categories
//!
//! - **Validation**: bad caller input; fix the input, never retry
//! - **Store**: the backing store failed; surfaces at the request boundary
//! - **SegmentRace**: a concurrent update won the guarded advance; retryable
//! - **RefillTimeout**: a prefetch exceeded its deadline; retryable
//! - **CorruptSegment**: stored record violates the parity invariant;
//!   requires operator conflict resolution
//! - **Config**: invalid engine configuration at startup
//! - **Internal**: a bug; log and investigate

use crate::types::{Role, SegmentKey};
use thiserror::Error;

/// Result type alias for Stride operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the Stride issuance engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid caller input (empty business type, count < 1, step <= 0, ...).
    #[error("validation error: {message}")]
    Validation {
        /// What is wrong with the input.
        message: String,
    },

    /// The backing store failed a read or write.
    #[error("store error: {message}")]
    Store {
        /// Error message.
        message: String,
        /// Optional underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A concurrent update won the guarded segment advance (0 rows affected).
    ///
    /// Retryable: the next refill re-reads the record and anchors above the
    /// winner's interval.
    #[error("segment race on {key} ({role})")]
    SegmentRace {
        /// The contended segment key.
        key: SegmentKey,
        /// The role whose record was contended.
        role: Role,
    },

    /// A prefetch exceeded its deadline.
    #[error("refill timed out after {elapsed_ms}ms (deadline {deadline_ms}ms)")]
    RefillTimeout {
        /// How long the refill actually took.
        elapsed_ms: u64,
        /// The configured deadline.
        deadline_ms: u64,
    },

    /// The parity of a stored `max_value` does not match its role.
    ///
    /// The record is not issued from; the operator must run conflict
    /// resolution.
    #[error("corrupt segment {key} ({role}): max_value {max_value} misaligned for step {step_size}")]
    CorruptSegment {
        /// The corrupt segment key.
        key: SegmentKey,
        /// The role the record claims.
        role: Role,
        /// The misaligned stored bound.
        max_value: i64,
        /// The stored step size.
        step_size: u32,
    },

    /// Invalid engine configuration.
    #[error("config error: {message}")]
    Config {
        /// What is wrong with the configuration.
        message: String,
    },

    /// Unexpected internal state; a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Create a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create a Store error.
    pub fn store(message: impl Into<String>) -> Self {
        Error::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Store error wrapping an underlying cause.
    pub fn store_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a SegmentRace error.
    pub fn segment_race(key: SegmentKey, role: Role) -> Self {
        Error::SegmentRace { key, role }
    }

    /// Create a RefillTimeout error.
    pub fn refill_timeout(elapsed_ms: u64, deadline_ms: u64) -> Self {
        Error::RefillTimeout {
            elapsed_ms,
            deadline_ms,
        }
    }

    /// Create a CorruptSegment error.
    pub fn corrupt_segment(key: SegmentKey, role: Role, max_value: i64, step_size: u32) -> Self {
        Error::CorruptSegment {
            key,
            role,
            max_value,
            step_size,
        }
    }

    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Bad input; don't retry, fix the request.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. } | Error::Config { .. })
    }

    /// May succeed on retry after re-reading store state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SegmentRace { .. } | Error::RefillTimeout { .. })
    }

    /// Data-integrity failure requiring operator intervention.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::CorruptSegment { .. })
    }

    /// Store unavailability (as opposed to logical failure).
    pub fn is_store_error(&self) -> bool {
        matches!(self, Error::Store { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        let e = Error::validation("business_type must not be empty");
        assert!(e.is_validation());
        assert!(!e.is_retryable());
        assert!(!e.is_corruption());
        assert!(e.to_string().contains("business_type"));
    }

    #[test]
    fn test_segment_race_is_retryable() {
        let e = Error::segment_race(SegmentKey::new("order", ""), Role::Odd);
        assert!(e.is_retryable());
        assert!(!e.is_validation());
        assert!(e.to_string().contains("order@-"));
    }

    #[test]
    fn test_refill_timeout_is_retryable() {
        let e = Error::refill_timeout(6200, 5000);
        assert!(e.is_retryable());
        assert!(e.to_string().contains("6200"));
        assert!(e.to_string().contains("5000"));
    }

    #[test]
    fn test_corrupt_segment_classification() {
        let e = Error::corrupt_segment(SegmentKey::new("user", "20260801"), Role::Even, 2500, 1000);
        assert!(e.is_corruption());
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("2500"));
    }

    #[test]
    fn test_store_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "db down");
        let e = Error::store_with_source("segment read failed", io);
        assert!(e.is_store_error());
        assert!(std::error::Error::source(&e).is_some());
    }
}
