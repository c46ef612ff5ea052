//! Failover control: role selection, take-over, abandon
//!
//! Role selection runs per request. With both roles Online the engine is in
//! balanced mode and picks the less-loaded role; with only one role Online
//! it is in proxy mode and the surviving node issues for both interval
//! classes.
//!
//! The periodic scan detects peer loss (take-over: claim the peer's
//! segments as proxy buffers) and peer return (abandon: drop the proxies
//! outright and invalidate this node's own buffers). Abandon is the
//! correctness move on peer return: the peer kept advancing max_value
//! while alone, so locally-cached bounds may be stale; dropping them forces
//! the next refill to re-anchor on the fresh global maximum.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use stride_buffer::{BufferMap, SegmentBuffer};
use stride_core::{BufferKey, BufferKind, Result, Role, SegmentKey};
use stride_store::{NodeStore, SegmentStore};
use tracing::{info, warn};

/// Outcome of role selection for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleChoice {
    /// The interval class to issue from.
    pub role: Role,
    /// Whether the peer role had an Online node at selection time.
    pub peer_online: bool,
}

/// Per-request role selection.
#[derive(Clone)]
pub struct RoleSelector {
    role: Role,
    segments: Arc<dyn SegmentStore>,
    nodes: Arc<dyn NodeStore>,
}

impl RoleSelector {
    /// Create a selector for a node of the given role.
    pub fn new(role: Role, segments: Arc<dyn SegmentStore>, nodes: Arc<dyn NodeStore>) -> Self {
        Self {
            role,
            segments,
            nodes,
        }
    }

    /// Choose the role to issue from for one request.
    ///
    /// A forced role short-circuits everything. Otherwise both modes apply
    /// the least-loaded rule over the pair's segment records; when neither
    /// record exists, balanced mode falls back to the cluster-wide
    /// `sum_max_value` signal (own role on a tie) and proxy mode spreads by
    /// key hash.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails.
    pub fn select(&self, key: &SegmentKey, forced: Option<Role>) -> Result<RoleChoice> {
        let peer_online = self.nodes.any_online(self.role.opposite())?;
        if let Some(role) = forced {
            return Ok(RoleChoice { role, peer_online });
        }

        let even = self.segments.get_segment(key, Role::Even)?;
        let odd = self.segments.get_segment(key, Role::Odd)?;

        let role = match (even, odd) {
            (Some(e), Some(o)) => {
                let (re, ro) = (e.load_ratio(), o.load_ratio());
                if re < ro {
                    Role::Even
                } else if ro < re {
                    Role::Odd
                } else {
                    self.role
                }
            }
            (None, Some(_)) => Role::Even,
            (Some(_), None) => Role::Odd,
            (None, None) => {
                if peer_online {
                    let se = self.segments.sum_max_value(Role::Even)?;
                    let so = self.segments.sum_max_value(Role::Odd)?;
                    if se < so {
                        Role::Even
                    } else if so < se {
                        Role::Odd
                    } else {
                        self.role
                    }
                } else {
                    spread_role(key)
                }
            }
        };
        Ok(RoleChoice { role, peer_online })
    }
}

impl std::fmt::Debug for RoleSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleSelector").field("role", &self.role).finish()
    }
}

/// Deterministic role spread for keys with no data anywhere.
pub fn spread_role(key: &SegmentKey) -> Role {
    let mut hasher = rustc_hash::FxHasher::default();
    key.business_type.hash(&mut hasher);
    key.time_key.hash(&mut hasher);
    if hasher.finish() % 2 == 0 {
        Role::Even
    } else {
        Role::Odd
    }
}

/// Periodic peer-status scan with take-over and abandon transitions.
pub struct FailoverController {
    role: Role,
    segments: Arc<dyn SegmentStore>,
    nodes: Arc<dyn NodeStore>,
    buffers: Arc<BufferMap>,
    scan_interval: Duration,
    stale_after: Duration,
    in_failover: AtomicBool,
    shutdown: Arc<AtomicBool>,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl FailoverController {
    /// Create a controller. Does not spawn the scan thread yet.
    pub fn new(
        role: Role,
        segments: Arc<dyn SegmentStore>,
        nodes: Arc<dyn NodeStore>,
        buffers: Arc<BufferMap>,
        scan_interval: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            role,
            segments,
            nodes,
            buffers,
            scan_interval,
            stale_after,
            in_failover: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: parking_lot::Mutex::new(None),
        }
    }

    /// Whether this node currently serves both interval classes.
    pub fn in_failover_mode(&self) -> bool {
        self.in_failover.load(Ordering::Acquire)
    }

    /// One scan tick: sweep stale heartbeats, then transition.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails; the scan thread logs
    /// and continues.
    pub fn scan_once(&self) -> Result<()> {
        let cutoff = stride_core::now_ms() - self.stale_after.as_millis() as i64;
        self.nodes.mark_stale_offline(cutoff)?;

        let peer_online = self.nodes.any_online(self.role.opposite())?;
        if !peer_online {
            if !self.in_failover.swap(true, Ordering::AcqRel) {
                self.take_over()?;
            }
        } else if self.in_failover.swap(false, Ordering::AcqRel)
            || self.buffers.count_kind(BufferKind::Proxy) > 0
        {
            self.abandon();
        }
        Ok(())
    }

    /// Claim every peer-role segment as an exhausted proxy buffer; the
    /// first take through each one allocates a fresh interval.
    fn take_over(&self) -> Result<()> {
        let peer = self.role.opposite();
        let mut claimed = 0usize;
        for seg in self.segments.list_by_role(peer)? {
            let key = BufferKey::new(seg.business_type, seg.time_key, peer, BufferKind::Proxy);
            if !self.buffers.contains(&key) {
                self.buffers.insert(key, Arc::new(SegmentBuffer::exhausted(peer)));
                claimed += 1;
            }
        }
        warn!(
            peer = %peer,
            proxy_buffers = claimed,
            "peer offline, taking over its interval class"
        );
        Ok(())
    }

    /// Drop all proxy buffers (unissued proxied IDs are permanently
    /// wasted) and invalidate own buffers so the next request re-reads
    /// the store and allocates strictly above everything the peer
    /// advanced while alone.
    fn abandon(&self) {
        let proxies = self.buffers.remove_kind(BufferKind::Proxy);
        let own = self.buffers.remove_kind(BufferKind::Own);
        info!(
            proxy_buffers = proxies,
            own_buffers = own,
            "peer returned, abandoning proxies and refreshing own buffers"
        );
    }

    /// Spawn the periodic scan thread. Idempotent.
    pub fn start(self: Arc<Self>) {
        let mut slot = self.handle.lock();
        if slot.is_some() {
            return;
        }

        let controller = Arc::clone(&self);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.scan_interval;

        let handle = std::thread::Builder::new()
            .name("stride-failover".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    let slice = Duration::from_millis(100).min(interval);
                    let mut elapsed = Duration::ZERO;
                    while elapsed < interval {
                        if shutdown.load(Ordering::Relaxed) {
                            return;
                        }
                        std::thread::sleep(slice);
                        elapsed += slice;
                    }

                    if let Err(e) = controller.scan_once() {
                        warn!(error = %e, "failover scan failed");
                    }
                }
            })
            .expect("failed to spawn failover thread");
        *slot = Some(handle);
    }

    /// Signal the scan thread to exit and join it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for FailoverController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverController")
            .field("role", &self.role)
            .field("in_failover", &self.in_failover_mode())
            .finish()
    }
}
