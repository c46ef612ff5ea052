//! Operator-facing status and maintenance operations
//!
//! Everything here is either a read-only snapshot (server status, step
//! distribution) or a recovery sweep (stuck-refresh reset, conflict
//! resolution, expiry). The transport exposing these is external.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use stride_buffer::BufferMap;
use stride_core::{interval, now_ms, BufferKind, NodeRecord, NodeStatus, Result, Role};
use stride_store::SegmentStore;
use tracing::{info, warn};

/// Snapshot of one node's engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    /// This node's identity.
    pub node_id: String,
    /// This node's shard type (0 = Even, 1 = Odd).
    pub shard_type: u8,
    /// Buffers held, proxies included.
    pub buffer_count: usize,
    /// Failover-proxy buffers held.
    pub proxy_buffer_count: usize,
    /// Whether this node currently serves both interval classes.
    pub in_failover_mode: bool,
    /// Online peer-role nodes.
    pub peers_online: usize,
    /// Offline peer-role nodes.
    pub peers_offline: usize,
    /// Buffers with the refresh gate currently held.
    pub refresh_marked: usize,
    /// Buffers holding a staged (prefetched) interval.
    pub refresh_staged: usize,
    /// Cluster-wide issuance progress per role.
    pub load_balance: LoadBalanceInfo,
}

/// Coarse per-role load signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalanceInfo {
    /// Sum of max_value across Even records.
    pub sum_even: i64,
    /// Sum of max_value across Odd records.
    pub sum_odd: i64,
}

/// Distribution of step sizes across stored records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDistribution {
    /// Total records inspected.
    pub total: usize,
    /// Record count per step size.
    pub by_step: BTreeMap<u32, usize>,
}

/// Outcome of a conflict-resolution sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictReport {
    /// Records re-aligned.
    pub repaired: usize,
    /// Human-readable identifiers of the repaired records.
    pub segments: Vec<String>,
}

/// Build a status snapshot.
///
/// # Errors
///
/// Returns an error if a store read fails.
pub fn server_status(
    node_id: &str,
    role: Role,
    in_failover_mode: bool,
    buffers: &BufferMap,
    segments: &Arc<dyn SegmentStore>,
    nodes: &[NodeRecord],
) -> Result<ServerStatus> {
    let peer = role.opposite();
    let peers_online = nodes
        .iter()
        .filter(|n| n.role == peer && n.status == NodeStatus::Online)
        .count();
    let peers_offline = nodes
        .iter()
        .filter(|n| n.role == peer && n.status == NodeStatus::Offline)
        .count();

    let mut refresh_marked = 0;
    let mut refresh_staged = 0;
    for (_, buffer) in buffers.snapshot() {
        if buffer.refresh_marked() {
            refresh_marked += 1;
        }
        if buffer.has_staged() {
            refresh_staged += 1;
        }
    }

    Ok(ServerStatus {
        node_id: node_id.to_string(),
        shard_type: role.index(),
        buffer_count: buffers.len(),
        proxy_buffer_count: buffers.count_kind(BufferKind::Proxy),
        in_failover_mode,
        peers_online,
        peers_offline,
        refresh_marked,
        refresh_staged,
        load_balance: LoadBalanceInfo {
            sum_even: segments.sum_max_value(Role::Even)?,
            sum_odd: segments.sum_max_value(Role::Odd)?,
        },
    })
}

/// Report the step sizes currently stored, grouped by width.
///
/// # Errors
///
/// Returns an error if a store read fails.
pub fn step_distribution(segments: &Arc<dyn SegmentStore>) -> Result<StepDistribution> {
    let mut by_step: BTreeMap<u32, usize> = BTreeMap::new();
    let mut total = 0;
    for business_type in segments.list_business_types()? {
        for seg in segments.list_segments(&business_type, None)? {
            *by_step.entry(seg.step_size).or_insert(0) += 1;
            total += 1;
        }
    }
    Ok(StepDistribution { total, by_step })
}

/// Reset refresh gates held longer than the timeout with no progress.
///
/// Returns the keys of the buffers reset. Complements the inline steal in
/// `try_mark_refresh` for buffers that stopped receiving requests.
pub fn recover_timeout_refresh(buffers: &BufferMap, refresh_timeout_ms: u64) -> Vec<String> {
    let now = now_ms();
    let mut reset = Vec::new();
    for (key, buffer) in buffers.snapshot() {
        let last = buffer.last_refresh_attempt_at();
        if buffer.refresh_marked() && last != 0 && now - last > refresh_timeout_ms as i64 {
            buffer.clear_refresh();
            warn!(buffer = %key, "stuck refresh gate reset");
            reset.push(key.to_string());
        }
    }
    reset
}

/// Re-align records whose stored bound violates the parity invariant.
///
/// For each misaligned record, writes an aligned next-interval bound
/// strictly above the pair's global maximum. IDs inside the abandoned
/// bound are wasted.
///
/// # Errors
///
/// Returns an error if a store operation fails.
pub fn resolve_conflicts(segments: &Arc<dyn SegmentStore>) -> Result<ConflictReport> {
    let mut report = ConflictReport {
        repaired: 0,
        segments: Vec::new(),
    };

    for business_type in segments.list_business_types()? {
        for seg in segments.list_segments(&business_type, None)? {
            if interval::is_aligned(seg.max_value, seg.step_size, seg.role) {
                continue;
            }

            let key = seg.key();
            let peer_max = segments
                .get_segment(&key, seg.role.opposite())?
                .map(|peer| peer.max_value);
            let global_max = peer_max.map_or(seg.max_value, |p| p.max(seg.max_value));
            let next = interval::next_interval(Some(global_max), seg.step_size, seg.role);

            segments.set_max_value(&key, seg.role, next.end)?;
            info!(
                segment = %key,
                role = %seg.role,
                old_max = seg.max_value,
                new_max = next.end,
                "misaligned segment repaired"
            );
            report.repaired += 1;
            report.segments.push(format!("{} ({})", key, seg.role));
        }
    }
    Ok(report)
}

/// Delete records whose time key sorts strictly below the cutoff.
///
/// # Errors
///
/// Returns an error if the store operation fails.
pub fn delete_expired(segments: &Arc<dyn SegmentStore>, cutoff: &str) -> Result<u64> {
    let deleted = segments.delete_where_time_key_lt(cutoff)?;
    if deleted > 0 {
        info!(cutoff, deleted, "expired segments deleted");
    }
    Ok(deleted)
}
