//! Consistency-preserving step-size change
//!
//! Changing the interval width is a three-part move per affected record:
//! write the new step together with an aligned next-interval `max_value`
//! (so the `max_value = (k + 1) * step` invariant keeps holding), then
//! drop the corresponding local buffers so the next request refills at the
//! new width. The reserved alignment interval is handed to no buffer and
//! is wasted; accepted, like any crash loss.
//!
//! Peer nodes observe the change lazily: their buffers keep the old width
//! until natural exhaustion, and because every refill re-reads the global
//! maximum from the store, the first refill after the change adopts the
//! new step without overlap risk.
//!
//! The protocol is idempotent (a repeat with the same step matches
//! nothing and changes nothing) and preview mode produces the exact
//! per-record diff of an execution without writing.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stride_buffer::BufferMap;
use stride_core::limits::{validate_business_type, validate_step, validate_time_key};
use stride_core::{interval, BufferKey, BufferKind, Result, Role, SegmentKey};
use stride_store::SegmentStore;
use tracing::info;

/// A step-size change request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepChangeRequest {
    /// Business namespace to change.
    pub business_type: String,
    /// Restrict the change to one time key; all of the business's keys
    /// when absent.
    #[serde(default)]
    pub time_key: Option<String>,
    /// The new interval width.
    pub new_step_size: u32,
    /// Report the diff without writing.
    #[serde(default)]
    pub preview: bool,
}

/// Per-record outcome of a step change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepChangeEntry {
    /// Business namespace of the record.
    pub business_type: String,
    /// Time key of the record.
    pub time_key: String,
    /// Shard type of the record (0 = Even, 1 = Odd).
    pub shard_type: u8,
    /// Step size before the change.
    pub old_step_size: u32,
    /// Step size after the change (equal to old when skipped).
    pub new_step_size: u32,
    /// `max_value` before the change.
    pub old_max_value: i64,
    /// The aligned `max_value` written by an execution; None in preview
    /// and for skipped records.
    pub new_max_value: Option<i64>,
    /// Whether the record was (or would be) rewritten.
    pub changed: bool,
}

/// Aggregate step-change report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepChangeReport {
    /// Records rewritten (or, in preview, that would be).
    pub changed: usize,
    /// Records already at the requested step.
    pub skipped: usize,
    /// Whether this report came from a preview.
    pub preview: bool,
    /// Per-record diff.
    pub entries: Vec<StepChangeEntry>,
}

impl StepChangeReport {
    fn empty(preview: bool) -> Self {
        Self {
            changed: 0,
            skipped: 0,
            preview,
            entries: Vec::new(),
        }
    }

    fn absorb(&mut self, other: StepChangeReport) {
        self.changed += other.changed;
        self.skipped += other.skipped;
        self.entries.extend(other.entries);
    }
}

/// Apply (or preview) a step change for one business type.
///
/// # Errors
///
/// Returns a validation error for a non-positive step and store errors
/// from the sweep; a failed write aborts the sweep mid-way, leaving
/// already-rewritten records at the new step (re-running converges).
pub fn change_step(
    segments: &Arc<dyn SegmentStore>,
    buffers: &BufferMap,
    request: &StepChangeRequest,
) -> Result<StepChangeReport> {
    validate_business_type(&request.business_type)?;
    if let Some(time_key) = &request.time_key {
        validate_time_key(time_key)?;
    }
    validate_step(request.new_step_size)?;

    let new_step = request.new_step_size;
    let mut report = StepChangeReport::empty(request.preview);

    for seg in segments.list_segments(&request.business_type, request.time_key.as_deref())? {
        if seg.step_size == new_step {
            report.skipped += 1;
            report.entries.push(StepChangeEntry {
                business_type: seg.business_type,
                time_key: seg.time_key,
                shard_type: seg.role.index(),
                old_step_size: seg.step_size,
                new_step_size: new_step,
                old_max_value: seg.max_value,
                new_max_value: None,
                changed: false,
            });
            continue;
        }

        let new_max_value = if request.preview {
            None
        } else {
            let key = seg.key();
            Some(execute_change(segments, buffers, &key, seg.role, new_step)?)
        };

        report.changed += 1;
        report.entries.push(StepChangeEntry {
            business_type: seg.business_type,
            time_key: seg.time_key,
            shard_type: seg.role.index(),
            old_step_size: seg.step_size,
            new_step_size: new_step,
            old_max_value: seg.max_value,
            new_max_value,
            changed: true,
        });
    }

    if !request.preview && report.changed > 0 {
        info!(
            business = %request.business_type,
            new_step,
            changed = report.changed,
            skipped = report.skipped,
            "step size changed"
        );
    }
    Ok(report)
}

/// Apply (or preview) a step change across every business type.
///
/// # Errors
///
/// Same conditions as [`change_step`].
pub fn change_step_global(
    segments: &Arc<dyn SegmentStore>,
    buffers: &BufferMap,
    new_step_size: u32,
    preview: bool,
) -> Result<StepChangeReport> {
    validate_step(new_step_size)?;

    let mut report = StepChangeReport::empty(preview);
    for business_type in segments.list_business_types()? {
        let request = StepChangeRequest {
            business_type,
            time_key: None,
            new_step_size,
            preview,
        };
        report.absorb(change_step(segments, buffers, &request)?);
    }
    Ok(report)
}

/// Rewrite one record to the new step and drop its local buffers.
fn execute_change(
    segments: &Arc<dyn SegmentStore>,
    buffers: &BufferMap,
    key: &SegmentKey,
    role: Role,
    new_step: u32,
) -> Result<i64> {
    // Anchor the aligned bound above everything either role has claimed.
    let own = segments.get_segment(key, role)?;
    let peer = segments.get_segment(key, role.opposite())?;
    let global_max = match (
        own.as_ref().map(|s| s.max_value),
        peer.as_ref().map(|s| s.max_value),
    ) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    let next = interval::next_interval(global_max, new_step, role);
    segments.set_max_value_and_step(key, role, next.end, new_step)?;

    for kind in [BufferKind::Own, BufferKind::Proxy] {
        buffers.remove(&BufferKey::new(
            key.business_type.clone(),
            key.time_key.clone(),
            role,
            kind,
        ));
    }
    Ok(next.end)
}
