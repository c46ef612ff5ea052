//! Node registry and heartbeat
//!
//! Each node registers itself Online on startup and stamps its heartbeat
//! periodically from a background thread. Heartbeat loss, observed by the
//! peer through the staleness sweep, is what drives failover; there is no
//! leader election, the protocol is symmetric.
//!
//! The heartbeat loop never terminates on error: store failures are logged
//! and retried on the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use stride_core::{now_ms, Result, Role};
use stride_store::NodeStore;
use tracing::{info, warn};

/// Self-registration, heartbeat, and peer liveness view for one node.
pub struct NodeRegistry {
    node_id: String,
    role: Role,
    nodes: Arc<dyn NodeStore>,
    heartbeat_interval: Duration,
    shutdown: Arc<AtomicBool>,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl NodeRegistry {
    /// Create a registry for this node. Does not register or spawn yet.
    pub fn new(
        node_id: String,
        role: Role,
        nodes: Arc<dyn NodeStore>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            node_id,
            role,
            nodes,
            heartbeat_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: parking_lot::Mutex::new(None),
        }
    }

    /// The node identity string.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Upsert this node Online and stamp its heartbeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn register(&self) -> Result<()> {
        self.nodes.upsert_online(&self.node_id, self.role, now_ms())?;
        info!(node_id = %self.node_id, role = %self.role, "node registered");
        Ok(())
    }

    /// Whether at least one peer-role node is Online.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn peer_online(&self) -> Result<bool> {
        self.nodes.any_online(self.role.opposite())
    }

    /// Mark nodes whose heartbeat is older than `stale_after` as Offline.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn sweep_stale(&self, stale_after: Duration) -> Result<u64> {
        let cutoff = now_ms() - stale_after.as_millis() as i64;
        self.nodes.mark_stale_offline(cutoff)
    }

    /// Stamp this node's heartbeat once, re-registering if the row was
    /// swept Offline (e.g. after a long GC pause or network partition).
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn beat(&self) -> Result<()> {
        let now = now_ms();
        if self.nodes.touch(&self.node_id, now)? == 0 {
            warn!(node_id = %self.node_id, "heartbeat found no online row, re-registering");
            self.nodes.upsert_online(&self.node_id, self.role, now)?;
        }
        Ok(())
    }

    /// Spawn the heartbeat thread. Idempotent: a second call is a no-op.
    pub fn start_heartbeat(&self) {
        let mut slot = self.handle.lock();
        if slot.is_some() {
            return;
        }

        let nodes = Arc::clone(&self.nodes);
        let node_id = self.node_id.clone();
        let role = self.role;
        let interval = self.heartbeat_interval;
        let shutdown = Arc::clone(&self.shutdown);

        let handle = std::thread::Builder::new()
            .name("stride-heartbeat".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    // Sleep in slices so shutdown is observed promptly.
                    let slice = Duration::from_millis(100).min(interval);
                    let mut elapsed = Duration::ZERO;
                    while elapsed < interval {
                        if shutdown.load(Ordering::Relaxed) {
                            return;
                        }
                        std::thread::sleep(slice);
                        elapsed += slice;
                    }

                    let now = now_ms();
                    match nodes.touch(&node_id, now) {
                        Ok(0) => {
                            if let Err(e) = nodes.upsert_online(&node_id, role, now) {
                                warn!(node_id = %node_id, error = %e, "heartbeat re-register failed");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!(node_id = %node_id, error = %e, "heartbeat failed"),
                    }
                }
            })
            .expect("failed to spawn heartbeat thread");
        *slot = Some(handle);
    }

    /// Signal the heartbeat thread to exit and join it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_id", &self.node_id)
            .field("role", &self.role)
            .finish()
    }
}
