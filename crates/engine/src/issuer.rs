//! Issuance engine
//!
//! End-to-end ID issuance: validate the request, pick a role, find or
//! materialise the buffer, walk its cursor, refill on exhaustion, and
//! compute the routing hint.
//!
//! ## Refill discipline
//!
//! Every store reservation goes through one guarded allocation path:
//! read both roles' records, verify alignment, compute the next interval
//! strictly above the global maximum, then perform the guarded advance. A
//! lost race surfaces as a `SegmentRace` error and the buffer is left
//! untouched. Refills are serialised per buffer key by the refill mutex;
//! lazy creation has its own critical section so it never contends with
//! refills of other keys.
//!
//! ## Prefetch
//!
//! When a take pushes utilisation past the threshold, the winner of the
//! refresh-flag CAS submits a prefetch to the bounded pool. The prefetch
//! reserves the next interval and *stages* it on the buffer; the staged
//! interval is installed the moment the live one is spent, which keeps
//! batch IDs contiguous until a genuine interval jump. Prefetches are
//! never cancelled from outside: they run to completion or overrun the
//! deadline, and the refresh-flag timeout is the sole recovery for a task
//! that died silently.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stride_buffer::{BufferMap, SegmentBuffer};
use stride_core::limits::{
    validate_business_type, validate_count, validate_shard_count, validate_step,
    validate_time_key,
};
use stride_core::{
    interval, now_ms, BufferKey, BufferKind, Error, Interval, Result, Role, SegmentKey,
};
use stride_store::{NodeStore, SegmentStore};
use tracing::{debug, error, info, warn};

use crate::background::PrefetchPool;
use crate::config::EngineConfig;
use crate::failover::RoleSelector;
use crate::routing::{routing_hint, RoutingHint};

/// One issuance request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Business namespace. Required, non-empty.
    pub business_type: String,
    /// Time sub-namespace; the current local date (yyyymmdd) when absent.
    #[serde(default)]
    pub time_key: Option<String>,
    /// How many IDs to issue.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Whether to compute a routing hint from the first ID.
    #[serde(default)]
    pub include_routing: bool,
    /// Database shard count for the routing hint.
    #[serde(default)]
    pub shard_db_count: Option<u32>,
    /// Table shard count for the routing hint.
    #[serde(default)]
    pub shard_table_count: Option<u32>,
    /// Interval width override for this key.
    #[serde(default)]
    pub custom_step_size: Option<u32>,
    /// Forced shard type (0 = Even, 1 = Odd), bypassing role selection.
    #[serde(default)]
    pub force_shard_type: Option<u8>,
}

fn default_count() -> u32 {
    1
}

impl GenerateRequest {
    /// A single-ID request for a business type, with defaults everywhere else.
    pub fn new(business_type: impl Into<String>) -> Self {
        Self {
            business_type: business_type.into(),
            time_key: None,
            count: 1,
            include_routing: false,
            shard_db_count: None,
            shard_table_count: None,
            custom_step_size: None,
            force_shard_type: None,
        }
    }
}

/// One issued batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The issued IDs: contiguous except across an interval jump.
    pub ids: Vec<i64>,
    /// Echo of the business namespace.
    pub business_type: String,
    /// The effective time key (caller-supplied or the substituted date).
    pub time_key: String,
    /// The interval class the batch was issued from (0 = Even, 1 = Odd).
    pub shard_type: u8,
    /// Identity of the issuing node.
    pub node_id: String,
    /// Server-side issue timestamp, milliseconds since epoch.
    pub timestamp_ms: i64,
    /// Routing hint computed from the first ID, when requested.
    pub routing: Option<RoutingHint>,
}

/// The issuance engine. Cheap to clone; all state is shared.
#[derive(Clone, Debug)]
pub struct Issuer {
    inner: Arc<IssuerInner>,
}

pub(crate) struct IssuerInner {
    config: EngineConfig,
    node_id: String,
    segments: Arc<dyn SegmentStore>,
    selector: RoleSelector,
    buffers: Arc<BufferMap>,
    pool: PrefetchPool,
}

impl std::fmt::Debug for IssuerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerInner")
            .field("node_id", &self.node_id)
            .field("role", &self.config.role)
            .finish()
    }
}

impl Issuer {
    /// Create an issuer over the given stores and buffer map.
    pub fn new(
        config: EngineConfig,
        segments: Arc<dyn SegmentStore>,
        nodes: Arc<dyn NodeStore>,
        buffers: Arc<BufferMap>,
    ) -> Self {
        let node_id = config.node_id();
        let selector = RoleSelector::new(config.role, Arc::clone(&segments), nodes);
        let pool = PrefetchPool::new(config.prefetch_workers, config.prefetch_queue_depth);
        Self {
            inner: Arc::new(IssuerInner {
                config,
                node_id,
                segments,
                selector,
                buffers,
                pool,
            }),
        }
    }

    /// Issue a batch of IDs.
    ///
    /// # Errors
    ///
    /// Validation errors surface without touching any state; store errors
    /// and lost refill races fail the whole request.
    pub fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let inner = &self.inner;
        validate_business_type(&request.business_type)?;
        if let Some(time_key) = &request.time_key {
            validate_time_key(time_key)?;
        }
        validate_count(request.count)?;

        // The effective interval width is resolved closest to the store:
        // a caller override wins, then the stored record's step, then the
        // configured default. Only the override is threaded through.
        let step = request.custom_step_size;
        if let Some(step) = step {
            validate_step(step)?;
        }

        let forced = match request.force_shard_type {
            Some(index) => Some(Role::from_index(index).ok_or_else(|| {
                Error::validation(format!("unknown forced shard type {}", index))
            })?),
            None => None,
        };

        // Routing parameters are checked before any ID is issued so a bad
        // request cannot burn part of an interval.
        let routing_db_count = if request.include_routing {
            let db_count = request
                .shard_db_count
                .ok_or_else(|| Error::validation("include_routing requires shard_db_count"))?;
            validate_shard_count("shard_db_count", db_count)?;
            if let Some(tables) = request.shard_table_count {
                validate_shard_count("shard_table_count", tables)?;
            }
            Some(db_count)
        } else {
            None
        };

        let time_key = request
            .time_key
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d").to_string());
        let segment_key = SegmentKey::new(request.business_type.clone(), time_key.clone());

        let choice = inner.selector.select(&segment_key, forced)?;
        let kind = if choice.role != inner.config.role && !choice.peer_online {
            BufferKind::Proxy
        } else {
            BufferKind::Own
        };
        let key = BufferKey::new(
            request.business_type.clone(),
            time_key.clone(),
            choice.role,
            kind,
        );

        let mut ids = Vec::with_capacity(request.count as usize);
        for _ in 0..request.count {
            let id = loop {
                let buffer = inner.buffer_for(&key, step)?;
                if let Some(id) = buffer.take() {
                    self.maybe_prefetch(&key, &buffer, step);
                    break id;
                }
                inner.refill_blocking(&key, step)?;
            };
            ids.push(id);
        }

        let routing = match routing_db_count {
            Some(db_count) => Some(routing_hint(ids[0], db_count, request.shard_table_count)?),
            None => None,
        };

        Ok(GenerateResponse {
            ids,
            business_type: request.business_type.clone(),
            time_key,
            shard_type: choice.role.index(),
            node_id: inner.node_id.clone(),
            timestamp_ms: now_ms(),
            routing,
        })
    }

    /// Schedule a prefetch when the buffer crossed the threshold and this
    /// caller won the refresh gate.
    fn maybe_prefetch(&self, key: &BufferKey, buffer: &SegmentBuffer, step: Option<u32>) {
        let inner = &self.inner;
        if buffer.utilisation() <= inner.config.refresh_threshold || buffer.has_staged() {
            return;
        }
        if !buffer.try_mark_refresh(inner.config.refresh_timeout_ms, now_ms()) {
            return;
        }

        let task_inner = Arc::clone(inner);
        let task_key = key.clone();
        if inner
            .pool
            .submit(move || task_inner.prefetch(&task_key, step))
            .is_err()
        {
            // Queue full: drop the gate so a later request retries.
            buffer.clear_refresh();
            debug!(buffer = %key, "prefetch rejected by pool backpressure");
        }
    }

    /// Wait until every queued and running prefetch has finished.
    ///
    /// Test and shutdown aid; steady-state callers never need it.
    pub fn drain_prefetches(&self) {
        self.inner.pool.drain();
    }

    /// Pool metrics for status reporting.
    pub fn pool_stats(&self) -> crate::background::PoolStats {
        self.inner.pool.stats()
    }

    /// Shut down the prefetch pool.
    pub fn shutdown(&self) {
        self.inner.pool.shutdown();
    }
}

impl IssuerInner {
    /// Look up a buffer, materialising it under the init lock on miss.
    fn buffer_for(&self, key: &BufferKey, step: Option<u32>) -> Result<Arc<SegmentBuffer>> {
        if let Some(buffer) = self.buffers.get(key) {
            return Ok(buffer);
        }

        let lock = self.buffers.init_lock(key);
        let _guard = lock.lock();
        if let Some(buffer) = self.buffers.get(key) {
            return Ok(buffer);
        }
        self.materialise(key, step)
    }

    /// Create the buffer for a key, claiming its first interval.
    ///
    /// A fresh record starts at the role's initial interval. An existing
    /// record means a previous process life may have issued part of its
    /// interval, so the buffer opens on a freshly-advanced one instead;
    /// the remainder is wasted, never re-issued.
    fn materialise(&self, key: &BufferKey, step: Option<u32>) -> Result<Arc<SegmentBuffer>> {
        let segment_key = key.segment_key();
        let interval = match self.segments.get_segment(&segment_key, key.role)? {
            None => {
                let width = step.unwrap_or(self.config.default_step_size);
                let initial = interval::initial_interval(key.role, width);
                if self
                    .segments
                    .create_segment(&segment_key, key.role, initial.end, width)?
                {
                    initial
                } else {
                    // Lost the creation race with the peer node.
                    self.allocate_next(key, step)?
                }
            }
            Some(_) => self.allocate_next(key, step)?,
        };

        let buffer = Arc::new(SegmentBuffer::with_interval(key.role, interval));
        self.buffers.insert(key.clone(), Arc::clone(&buffer));
        info!(
            buffer = %key,
            start = interval.start,
            end = interval.end,
            "buffer materialised"
        );
        Ok(buffer)
    }

    /// Reserve the next interval for a key in the store.
    ///
    /// Reads both roles' records, anchors strictly above the global
    /// maximum, and performs the guarded advance. Returns `SegmentRace`
    /// when a concurrent update wins.
    fn allocate_next(&self, key: &BufferKey, step: Option<u32>) -> Result<Interval> {
        let segment_key = key.segment_key();
        let role = key.role;
        let own = self.segments.get_segment(&segment_key, role)?;
        let peer = self.segments.get_segment(&segment_key, role.opposite())?;
        let width = step
            .or(own.as_ref().map(|seg| seg.step_size))
            .unwrap_or(self.config.default_step_size);

        if let Some(seg) = &own {
            if !interval::is_aligned(seg.max_value, seg.step_size, seg.role) {
                error!(
                    segment = %segment_key,
                    role = %role,
                    max_value = seg.max_value,
                    step_size = seg.step_size,
                    "stored segment misaligned, refusing to issue"
                );
                return Err(Error::corrupt_segment(
                    segment_key,
                    role,
                    seg.max_value,
                    seg.step_size,
                ));
            }
        }

        let own_max = own.as_ref().map(|seg| seg.max_value);
        let peer_max = peer.as_ref().map(|seg| seg.max_value);
        let global_max = match (own_max, peer_max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let next = interval::next_interval(global_max, width, role);

        let rows = match &own {
            Some(seg) if seg.step_size != width => self.segments.advance_max_value_and_step(
                &segment_key,
                role,
                seg.max_value,
                next.end,
                width,
            )?,
            Some(seg) => {
                self.segments
                    .advance_max_value(&segment_key, role, seg.max_value, next.end)?
            }
            None => {
                if self
                    .segments
                    .create_segment(&segment_key, role, next.end, width)?
                {
                    1
                } else {
                    0
                }
            }
        };
        if rows == 0 {
            debug!(segment = %segment_key, role = %role, "lost segment advance race");
            return Err(Error::segment_race(segment_key, role));
        }

        // Read-back: the reservation must be visible, possibly already
        // superseded by a further advance of our own role.
        match self.segments.get_segment(&segment_key, role)? {
            Some(seg) if seg.max_value >= next.end => Ok(next),
            _ => Err(Error::internal(format!(
                "segment {} ({}) lost its reservation after write",
                segment_key, role
            ))),
        }
    }

    /// Synchronous refill on exhaustion.
    ///
    /// Serialised by the per-key refill mutex; waits for an in-flight
    /// prefetch holding the same mutex, then re-checks. Prefers a staged
    /// interval over a fresh store round-trip.
    fn refill_blocking(&self, key: &BufferKey, step: Option<u32>) -> Result<()> {
        let lock = self.buffers.refill_lock(key);
        let _guard = lock.lock();

        // The buffer may have been dropped by abandon or a step change;
        // the caller's next lookup re-materialises it.
        let Some(buffer) = self.buffers.get(key) else {
            return Ok(());
        };
        if !buffer.is_exhausted() {
            return Ok(());
        }
        if let Some(staged) = buffer.take_staged() {
            buffer.install(staged);
            return Ok(());
        }

        match self.allocate_next(key, step) {
            Ok(next) => {
                buffer.install(next);
                Ok(())
            }
            Err(e) => {
                buffer.clear_refresh();
                Err(e)
            }
        }
    }

    /// Body of one prefetch task.
    fn prefetch(&self, key: &BufferKey, step: Option<u32>) {
        let deadline = Duration::from_millis(self.config.prefetch_deadline_ms);
        let started = Instant::now();
        let result = self.stage_refill(key, step);
        let elapsed = started.elapsed();

        let Some(buffer) = self.buffers.get(key) else {
            return;
        };
        match result {
            Ok(()) if elapsed <= deadline => {}
            Ok(()) => {
                // The reservation landed, but late; release the gate so the
                // flag cannot wedge if the staged interval lingers.
                let timeout = Error::refill_timeout(
                    elapsed.as_millis() as u64,
                    self.config.prefetch_deadline_ms,
                );
                warn!(buffer = %key, error = %timeout, "prefetch exceeded deadline");
                buffer.clear_refresh();
            }
            Err(e) => {
                warn!(buffer = %key, error = %e, "prefetch failed");
                buffer.clear_refresh();
            }
        }
    }

    /// Reserve and stage the next interval; installs directly when the
    /// buffer ran dry while the task sat in the queue.
    fn stage_refill(&self, key: &BufferKey, step: Option<u32>) -> Result<()> {
        let lock = self.buffers.refill_lock(key);
        let _guard = lock.lock();

        let Some(buffer) = self.buffers.get(key) else {
            return Ok(());
        };
        if buffer.has_staged() {
            return Ok(());
        }

        let next = self.allocate_next(key, step)?;
        if buffer.is_exhausted() {
            buffer.install(next);
        } else {
            buffer.stage(next);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_store::MemoryStore;

    fn setup(role: Role) -> (Arc<MemoryStore>, Arc<BufferMap>, Issuer) {
        let store = Arc::new(MemoryStore::new());
        let buffers = Arc::new(BufferMap::new());
        let mut config = EngineConfig::for_role(role);
        // Keep prefetching quiet unless a test drives it explicitly.
        config.refresh_threshold = 0.95;
        let issuer = Issuer::new(
            config,
            Arc::clone(&store) as Arc<dyn SegmentStore>,
            Arc::clone(&store) as Arc<dyn NodeStore>,
            Arc::clone(&buffers),
        );
        (store, buffers, issuer)
    }

    fn request(business: &str, count: u32) -> GenerateRequest {
        GenerateRequest {
            time_key: Some(String::new()),
            count,
            ..GenerateRequest::new(business)
        }
    }

    #[test]
    fn test_fresh_odd_batch_starts_at_one() {
        let (store, _, issuer) = setup(Role::Odd);
        let response = issuer.generate(&request("order", 10)).unwrap();

        assert_eq!(response.ids, (1..=10).collect::<Vec<i64>>());
        assert_eq!(response.shard_type, Role::Odd.index());

        let seg = store
            .get_segment(&SegmentKey::new("order", ""), Role::Odd)
            .unwrap()
            .unwrap();
        assert_eq!(seg.max_value, 1000);
    }

    #[test]
    fn test_fresh_even_batch_starts_above_first_interval() {
        let (store, _, issuer) = setup(Role::Even);
        let mut req = request("user", 1);
        req.force_shard_type = Some(Role::Even.index());
        let response = issuer.generate(&req).unwrap();

        assert_eq!(response.ids, vec![1001]);
        let seg = store
            .get_segment(&SegmentKey::new("user", ""), Role::Even)
            .unwrap()
            .unwrap();
        assert_eq!(seg.max_value, 2000);
    }

    #[test]
    fn test_exhaustion_jumps_over_peer_interval() {
        let (store, _, issuer) = setup(Role::Odd);
        let mut req = request("order", 1);
        req.force_shard_type = Some(Role::Odd.index());

        let first = issuer
            .generate(&GenerateRequest {
                count: 1000,
                ..req.clone()
            })
            .unwrap();
        assert_eq!(*first.ids.last().unwrap(), 1000);

        let next = issuer.generate(&req).unwrap();
        assert_eq!(next.ids, vec![2001], "peer interval [1001, 2000] skipped");

        let seg = store
            .get_segment(&SegmentKey::new("order", ""), Role::Odd)
            .unwrap()
            .unwrap();
        assert_eq!(seg.max_value, 3000);
    }

    #[test]
    fn test_batch_spanning_refill_is_piecewise_contiguous() {
        let (_, _, issuer) = setup(Role::Odd);
        let mut req = request("order", 1500);
        req.force_shard_type = Some(Role::Odd.index());

        let response = issuer.generate(&req).unwrap();
        assert_eq!(response.ids.len(), 1500);
        assert_eq!(response.ids[..1000], (1..=1000).collect::<Vec<i64>>()[..]);
        assert_eq!(response.ids[1000..], (2001..=2500).collect::<Vec<i64>>()[..]);
    }

    #[test]
    fn test_validation_failures_touch_no_state() {
        let (store, buffers, issuer) = setup(Role::Odd);

        assert!(issuer.generate(&request("", 1)).unwrap_err().is_validation());
        assert!(issuer.generate(&request("order", 0)).unwrap_err().is_validation());

        let mut req = request("order", 1);
        req.custom_step_size = Some(0);
        assert!(issuer.generate(&req).unwrap_err().is_validation());

        let mut req = request("order", 1);
        req.force_shard_type = Some(7);
        assert!(issuer.generate(&req).unwrap_err().is_validation());

        assert_eq!(store.segment_count(), 0);
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_missing_time_key_substitutes_today() {
        let (_, _, issuer) = setup(Role::Odd);
        let response = issuer.generate(&GenerateRequest::new("order")).unwrap();
        let expected = chrono::Local::now().format("%Y%m%d").to_string();
        assert_eq!(response.time_key, expected);
    }

    #[test]
    fn test_custom_step_size_widens_interval() {
        let (store, _, issuer) = setup(Role::Odd);
        let mut req = request("order", 1);
        req.custom_step_size = Some(5000);
        req.force_shard_type = Some(Role::Odd.index());

        let response = issuer.generate(&req).unwrap();
        assert_eq!(response.ids, vec![1]);
        let seg = store
            .get_segment(&SegmentKey::new("order", ""), Role::Odd)
            .unwrap()
            .unwrap();
        assert_eq!(seg.max_value, 5000);
        assert_eq!(seg.step_size, 5000);
    }

    #[test]
    fn test_routing_hint_from_first_id() {
        let (_, _, issuer) = setup(Role::Odd);
        let mut req = request("order", 3);
        req.include_routing = true;
        req.shard_db_count = Some(4);
        req.shard_table_count = Some(2);
        req.force_shard_type = Some(Role::Odd.index());

        let response = issuer.generate(&req).unwrap();
        let routing = response.routing.unwrap();
        assert_eq!(routing.routing_key, response.ids[0]);
        assert_eq!(routing.db_index, response.ids[0] % 4);

        // Routing requested without a shard count is a validation error.
        let mut bad = request("order", 1);
        bad.include_routing = true;
        assert!(issuer.generate(&bad).unwrap_err().is_validation());
    }

    #[test]
    fn test_existing_record_is_never_resumed() {
        let (store, _, issuer) = setup(Role::Odd);
        let key = SegmentKey::new("order", "");
        // A previous process life reserved [1, 1000] and may have issued
        // part of it.
        store.create_segment(&key, Role::Odd, 1000, 1000).unwrap();

        let mut req = request("order", 1);
        req.force_shard_type = Some(Role::Odd.index());
        let response = issuer.generate(&req).unwrap();
        assert_eq!(response.ids, vec![2001], "stale interval must be skipped");
    }

    #[test]
    fn test_corrupt_segment_refuses_issuance() {
        let (store, _, issuer) = setup(Role::Odd);
        let key = SegmentKey::new("order", "");
        // Parity of max_value 2000 belongs to Even, not Odd.
        store.create_segment(&key, Role::Odd, 2000, 1000).unwrap();

        let mut req = request("order", 1);
        req.force_shard_type = Some(Role::Odd.index());
        let err = issuer.generate(&req).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_proxy_kind_when_peer_offline() {
        let (store, buffers, issuer) = setup(Role::Even);
        // Only this node is online; forcing the peer class creates a proxy.
        store.upsert_online("even", Role::Even, now_ms()).unwrap();
        let mut req = request("order", 1);
        req.force_shard_type = Some(Role::Odd.index());

        issuer.generate(&req).unwrap();
        assert_eq!(buffers.count_kind(BufferKind::Proxy), 1);
        assert_eq!(buffers.count_kind(BufferKind::Own), 0);
    }

    #[test]
    fn test_cross_role_pick_is_own_when_peer_online() {
        let (store, buffers, issuer) = setup(Role::Even);
        store.upsert_online("even", Role::Even, now_ms()).unwrap();
        store.upsert_online("odd", Role::Odd, now_ms()).unwrap();
        let mut req = request("order", 1);
        req.force_shard_type = Some(Role::Odd.index());

        issuer.generate(&req).unwrap();
        assert_eq!(buffers.count_kind(BufferKind::Proxy), 0);
        assert_eq!(buffers.count_kind(BufferKind::Own), 1);
    }

    #[test]
    fn test_prefetch_stages_then_installs_at_exhaustion() {
        let (store, buffers, issuer) = {
            let store = Arc::new(MemoryStore::new());
            let buffers = Arc::new(BufferMap::new());
            let mut config = EngineConfig::for_role(Role::Odd);
            config.refresh_threshold = 0.1;
            let issuer = Issuer::new(
                config,
                Arc::clone(&store) as Arc<dyn SegmentStore>,
                Arc::clone(&store) as Arc<dyn NodeStore>,
                Arc::clone(&buffers),
            );
            (store, buffers, issuer)
        };

        let mut req = request("order", 200);
        req.force_shard_type = Some(Role::Odd.index());
        issuer.generate(&req).unwrap();
        issuer.drain_prefetches();

        // The prefetch reserved [2001, 3000] in the store without touching
        // the live interval.
        let seg = store
            .get_segment(&SegmentKey::new("order", ""), Role::Odd)
            .unwrap()
            .unwrap();
        assert_eq!(seg.max_value, 3000);

        let key = BufferKey::new("order", "", Role::Odd, BufferKind::Own);
        let buffer = buffers.get(&key).unwrap();
        assert!(buffer.has_staged());

        // Finishing the interval crosses into the staged one seamlessly.
        req.count = 800;
        let tail = issuer.generate(&req).unwrap();
        assert_eq!(*tail.ids.last().unwrap(), 1000);
        req.count = 1;
        let jumped = issuer.generate(&req).unwrap();
        assert_eq!(jumped.ids, vec![2001]);

        issuer.shutdown();
    }

    #[test]
    fn test_concurrent_generate_is_duplicate_free() {
        let (_, _, issuer) = setup(Role::Odd);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let issuer = issuer.clone();
            handles.push(std::thread::spawn(move || {
                let mut got = Vec::new();
                let mut req = request("order", 37);
                req.force_shard_type = Some(Role::Odd.index());
                for _ in 0..10 {
                    got.extend(issuer.generate(&req).unwrap().ids);
                }
                got
            }));
        }

        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total, "duplicate IDs issued under concurrency");
    }
}
