//! Engine facade: wiring, lifecycle, and the public operation surface
//!
//! An [`Engine`] owns the issuer, the node registry, and the failover
//! controller over a shared buffer map and store handles. `start()`
//! registers the node and spawns the heartbeat and failover threads;
//! `shutdown()` stops them and drains the prefetch pool. The transport
//! layer (HTTP/RPC) sits on top of this type and is out of scope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stride_buffer::BufferMap;
use stride_core::Result;
use stride_store::{NodeStore, SegmentStore};
use tracing::info;

use crate::admin::{
    self, ConflictReport, ServerStatus, StepDistribution,
};
use crate::config::EngineConfig;
use crate::failover::FailoverController;
use crate::issuer::{GenerateRequest, GenerateResponse, Issuer};
use crate::registry::NodeRegistry;
use crate::stepchange::{self, StepChangeReport, StepChangeRequest};

/// One node's issuance engine.
pub struct Engine {
    config: EngineConfig,
    segments: Arc<dyn SegmentStore>,
    nodes: Arc<dyn NodeStore>,
    buffers: Arc<BufferMap>,
    issuer: Issuer,
    registry: NodeRegistry,
    failover: Arc<FailoverController>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Engine {
    /// Wire an engine over the given stores.
    ///
    /// # Errors
    ///
    /// Returns a Config error when the configuration is invalid.
    pub fn new(
        config: EngineConfig,
        segments: Arc<dyn SegmentStore>,
        nodes: Arc<dyn NodeStore>,
    ) -> Result<Self> {
        config.validate()?;

        let buffers = Arc::new(BufferMap::new());
        let issuer = Issuer::new(
            config.clone(),
            Arc::clone(&segments),
            Arc::clone(&nodes),
            Arc::clone(&buffers),
        );
        let registry = NodeRegistry::new(
            config.node_id(),
            config.role,
            Arc::clone(&nodes),
            Duration::from_millis(config.heartbeat_interval_ms),
        );
        let failover = Arc::new(FailoverController::new(
            config.role,
            Arc::clone(&segments),
            Arc::clone(&nodes),
            Arc::clone(&buffers),
            Duration::from_millis(config.failover_scan_interval_ms),
            Duration::from_millis(config.stale_after_ms),
        ));

        Ok(Self {
            config,
            segments,
            nodes,
            buffers,
            issuer,
            registry,
            failover,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Register this node and spawn the background loops. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error when the initial registration write fails; the
    /// engine is left unstarted and `start()` may be retried.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = self.registry.register() {
            self.started.store(false, Ordering::Release);
            return Err(e);
        }
        self.registry.start_heartbeat();
        Arc::clone(&self.failover).start();
        info!(node_id = %self.registry.node_id(), role = %self.config.role, "engine started");
        Ok(())
    }

    /// Stop the background loops and drain the prefetch pool. Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.registry.stop();
        self.failover.stop();
        self.issuer.shutdown();
        info!(node_id = %self.registry.node_id(), "engine stopped");
    }

    /// Issue a batch of IDs.
    ///
    /// # Errors
    ///
    /// See [`Issuer::generate`].
    pub fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        self.issuer.generate(request)
    }

    /// Status snapshot of this node.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails.
    pub fn status(&self) -> Result<ServerStatus> {
        let nodes = self.nodes.list_nodes()?;
        admin::server_status(
            self.registry.node_id(),
            self.config.role,
            self.failover.in_failover_mode(),
            &self.buffers,
            &self.segments,
            &nodes,
        )
    }

    /// Change the step size of one business type (or preview the change).
    ///
    /// # Errors
    ///
    /// See [`stepchange::change_step`].
    pub fn change_step(&self, request: &StepChangeRequest) -> Result<StepChangeReport> {
        stepchange::change_step(&self.segments, &self.buffers, request)
    }

    /// Change the step size across every business type.
    ///
    /// # Errors
    ///
    /// See [`stepchange::change_step_global`].
    pub fn change_step_global(&self, new_step_size: u32, preview: bool) -> Result<StepChangeReport> {
        stepchange::change_step_global(&self.segments, &self.buffers, new_step_size, preview)
    }

    /// Current step-size distribution.
    ///
    /// # Errors
    ///
    /// Returns an error if a store read fails.
    pub fn step_distribution(&self) -> Result<StepDistribution> {
        admin::step_distribution(&self.segments)
    }

    /// Reset refresh gates stuck past the configured timeout.
    pub fn recover_timeout_refresh(&self) -> Vec<String> {
        admin::recover_timeout_refresh(&self.buffers, self.config.refresh_timeout_ms)
    }

    /// Re-align records violating the parity invariant.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub fn resolve_conflicts(&self) -> Result<ConflictReport> {
        admin::resolve_conflicts(&self.segments)
    }

    /// Delete segment records whose time key sorts below the cutoff.
    ///
    /// # Errors
    ///
    /// Returns an error if the store operation fails.
    pub fn delete_expired(&self, cutoff: &str) -> Result<u64> {
        admin::delete_expired(&self.segments, cutoff)
    }

    /// Run one failover scan tick immediately (tests and operator tooling;
    /// the background loop does this on its own).
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails.
    pub fn run_failover_scan(&self) -> Result<()> {
        self.failover.scan_once()
    }

    /// Block until all in-flight prefetches finish (test aid).
    pub fn drain_prefetches(&self) {
        self.issuer.drain_prefetches();
    }

    /// This node's identity string.
    pub fn node_id(&self) -> &str {
        self.registry.node_id()
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("node_id", &self.registry.node_id())
            .field("role", &self.config.role)
            .field("buffers", &self.buffers.len())
            .finish()
    }
}
