//! Downstream sharding hints
//!
//! A pure function of the issued ID and caller-supplied shard counts; the
//! engine computes it from the first ID of a batch when the caller asks
//! for routing.

use serde::{Deserialize, Serialize};
use stride_core::limits::validate_shard_count;
use stride_core::Result;

/// Sharding hint for downstream database/table routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingHint {
    /// Database index: `id mod shard_db_count`.
    pub db_index: i64,
    /// Table index within the database, when a table count was supplied:
    /// `(id div shard_db_count) mod shard_table_count`.
    pub table_index: Option<i64>,
    /// Echo of the database shard count used.
    pub shard_db_count: u32,
    /// Echo of the table shard count used.
    pub shard_table_count: Option<u32>,
    /// The key routed on: the ID itself.
    pub routing_key: i64,
}

/// Compute the routing hint for one ID.
///
/// # Errors
///
/// Returns a validation error when a shard count is zero.
pub fn routing_hint(id: i64, shard_db_count: u32, shard_table_count: Option<u32>) -> Result<RoutingHint> {
    validate_shard_count("shard_db_count", shard_db_count)?;
    if let Some(tables) = shard_table_count {
        validate_shard_count("shard_table_count", tables)?;
    }

    let db = shard_db_count as i64;
    Ok(RoutingHint {
        db_index: id % db,
        table_index: shard_table_count.map(|tables| (id / db) % tables as i64),
        shard_db_count,
        shard_table_count,
        routing_key: id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_index_is_modulo() {
        let hint = routing_hint(1234, 8, None).unwrap();
        assert_eq!(hint.db_index, 1234 % 8);
        assert_eq!(hint.table_index, None);
        assert_eq!(hint.routing_key, 1234);
    }

    #[test]
    fn test_table_index_uses_quotient() {
        let hint = routing_hint(1234, 8, Some(4)).unwrap();
        assert_eq!(hint.db_index, 1234 % 8);
        assert_eq!(hint.table_index, Some((1234 / 8) % 4));
    }

    #[test]
    fn test_db_index_always_in_range() {
        for id in [1i64, 999, 1000, 123_456_789] {
            for dbs in [1u32, 2, 7, 32] {
                let hint = routing_hint(id, dbs, Some(3)).unwrap();
                assert!(hint.db_index >= 0 && hint.db_index < dbs as i64);
                assert!(hint.table_index.unwrap() < 3);
            }
        }
    }

    #[test]
    fn test_zero_counts_rejected() {
        assert!(routing_hint(1, 0, None).unwrap_err().is_validation());
        assert!(routing_hint(1, 4, Some(0)).unwrap_err().is_validation());
    }
}
