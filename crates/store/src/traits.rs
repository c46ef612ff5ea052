//! Storage abstraction for segment and node records
//!
//! These traits enable swapping the backing store (in-memory, SQL) without
//! touching the issuance core. Every operation either succeeds fully or
//! leaves the store unchanged.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (implementations are `Send + Sync`).

use stride_core::{NodeRecord, NodeStatus, Result, Role, Segment, SegmentKey};

/// Typed operations over the `segments` table.
///
/// Guarded updates (`advance_*`) are the concurrency lever of the whole
/// design: two nodes refilling the same record race on the expected
/// `max_value`, and exactly one wins. The unconditional writes exist for
/// the step-change protocol and operator conflict resolution, where
/// re-anchoring above the global maximum makes lost updates harmless.
pub trait SegmentStore: Send + Sync {
    /// Fetch one segment record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn get_segment(&self, key: &SegmentKey, role: Role) -> Result<Option<Segment>>;

    /// Insert a fresh record. Returns false when the unique
    /// (business, time, role) index rejects the insert.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn create_segment(
        &self,
        key: &SegmentKey,
        role: Role,
        initial_max: i64,
        step: u32,
    ) -> Result<bool>;

    /// Guarded single-row advance: stores `new_max` only while the row
    /// still holds `expected_max`. Returns the number of rows affected;
    /// 0 signals a concurrent update (a segment race).
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn advance_max_value(
        &self,
        key: &SegmentKey,
        role: Role,
        expected_max: i64,
        new_max: i64,
    ) -> Result<u64>;

    /// Guarded advance writing the step size together with the new bound,
    /// for refills that adopt a changed step.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn advance_max_value_and_step(
        &self,
        key: &SegmentKey,
        role: Role,
        expected_max: i64,
        new_max: i64,
        new_step: u32,
    ) -> Result<u64>;

    /// Unconditional store of `max_value`. Returns rows affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn set_max_value(&self, key: &SegmentKey, role: Role, new_max: i64) -> Result<u64>;

    /// Unconditional store of `max_value` and `step_size` together.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn set_max_value_and_step(
        &self,
        key: &SegmentKey,
        role: Role,
        new_max: i64,
        new_step: u32,
    ) -> Result<u64>;

    /// List records for a business type, optionally restricted to one
    /// time key. Sorted by (time_key, role).
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn list_segments(&self, business_type: &str, time_key: Option<&str>) -> Result<Vec<Segment>>;

    /// List every record belonging to a role.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn list_by_role(&self, role: Role) -> Result<Vec<Segment>>;

    /// Distinct business types present in the store, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn list_business_types(&self) -> Result<Vec<String>>;

    /// Delete records whose time key sorts strictly below the cutoff.
    /// Returns the number of deleted rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn delete_where_time_key_lt(&self, cutoff: &str) -> Result<u64>;

    /// Sum of `max_value` across a role's records, a coarse load signal
    /// for role selection tiebreaks.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn sum_max_value(&self, role: Role) -> Result<i64>;
}

/// Typed operations over the `nodes` table.
pub trait NodeStore: Send + Sync {
    /// Upsert a node as Online and stamp its heartbeat. Called on startup
    /// and whenever a heartbeat finds its row missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn upsert_online(&self, node_id: &str, role: Role, now_ms: i64) -> Result<()>;

    /// Stamp the heartbeat of an existing Online row. Returns rows
    /// affected; 0 when the row is missing or was swept Offline.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn touch(&self, node_id: &str, now_ms: i64) -> Result<u64>;

    /// Force a node's status. Returns rows affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn set_status(&self, node_id: &str, status: NodeStatus) -> Result<u64>;

    /// Whether at least one Online record exists for the role.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn any_online(&self, role: Role) -> Result<bool>;

    /// Mark nodes whose heartbeat is older than `cutoff_ms` as Offline.
    /// Returns the number of rows flipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn mark_stale_offline(&self, cutoff_ms: i64) -> Result<u64>;

    /// All node records, sorted by node id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    fn list_nodes(&self) -> Result<Vec<NodeRecord>>;
}
