//! Engine configuration via `stride.toml`
//!
//! The role is the only field without a default; everything else carries
//! the cluster-tested values. To change settings, edit the file and
//! restart; configuration is process-scoped and immutable after startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use stride_core::{Error, Result, Role};

/// Config file name conventionally placed next to the binary.
pub const CONFIG_FILE_NAME: &str = "stride.toml";

/// Engine configuration.
///
/// # Example
///
/// ```toml
/// # Interval-parity class of this node: "Even" or "Odd" (required)
/// role = "Odd"
/// host = "seq-1"
/// advertise_addr = "10.0.0.11:7600"
/// default_step_size = 1000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval-parity class of this node. Required.
    pub role: Role,
    /// Host name used in the node identity.
    #[serde(default = "default_host")]
    pub host: String,
    /// Advertised address used in the node identity.
    #[serde(default = "default_advertise_addr")]
    pub advertise_addr: String,
    /// Interval width used when the caller supplies none.
    #[serde(default = "default_step_size")]
    pub default_step_size: u32,
    /// Consumed fraction past which a prefetch is scheduled.
    #[serde(default = "default_refresh_threshold")]
    pub refresh_threshold: f64,
    /// Heartbeat period.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Failover scan period.
    #[serde(default = "default_failover_scan_interval_ms")]
    pub failover_scan_interval_ms: u64,
    /// Heartbeat age past which a node is swept Offline.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
    /// Age past which a held refresh gate is considered stuck.
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,
    /// Deadline for one prefetch round-trip.
    #[serde(default = "default_prefetch_deadline_ms")]
    pub prefetch_deadline_ms: u64,
    /// Worker threads in the prefetch pool.
    #[serde(default = "default_prefetch_workers")]
    pub prefetch_workers: usize,
    /// Queued prefetches past which submissions are rejected.
    #[serde(default = "default_prefetch_queue_depth")]
    pub prefetch_queue_depth: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_advertise_addr() -> String {
    "127.0.0.1:7600".to_string()
}

fn default_step_size() -> u32 {
    1000
}

fn default_refresh_threshold() -> f64 {
    0.1
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_failover_scan_interval_ms() -> u64 {
    30_000
}

fn default_stale_after_ms() -> u64 {
    90_000
}

fn default_refresh_timeout_ms() -> u64 {
    10_000
}

fn default_prefetch_deadline_ms() -> u64 {
    5_000
}

fn default_prefetch_workers() -> usize {
    2
}

fn default_prefetch_queue_depth() -> usize {
    1024
}

impl EngineConfig {
    /// Configuration with defaults for everything but the role.
    pub fn for_role(role: Role) -> Self {
        Self {
            role,
            host: default_host(),
            advertise_addr: default_advertise_addr(),
            default_step_size: default_step_size(),
            refresh_threshold: default_refresh_threshold(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            failover_scan_interval_ms: default_failover_scan_interval_ms(),
            stale_after_ms: default_stale_after_ms(),
            refresh_timeout_ms: default_refresh_timeout_ms(),
            prefetch_deadline_ms: default_prefetch_deadline_ms(),
            prefetch_workers: default_prefetch_workers(),
            prefetch_queue_depth: default_prefetch_queue_depth(),
        }
    }

    /// The node identity string: host + address + role.
    pub fn node_id(&self) -> String {
        format!("{}/{}/{}", self.host, self.advertise_addr, self.role)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!("failed to parse '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns a Config error naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.default_step_size == 0 {
            return Err(Error::config("default_step_size must be positive"));
        }
        if !(self.refresh_threshold > 0.0 && self.refresh_threshold <= 1.0) {
            return Err(Error::config("refresh_threshold must be in (0, 1]"));
        }
        if self.heartbeat_interval_ms == 0 || self.failover_scan_interval_ms == 0 {
            return Err(Error::config("timer intervals must be positive"));
        }
        if self.stale_after_ms < self.heartbeat_interval_ms {
            return Err(Error::config(
                "stale_after_ms must be at least heartbeat_interval_ms",
            ));
        }
        if self.refresh_timeout_ms == 0 || self.prefetch_deadline_ms == 0 {
            return Err(Error::config("refresh timeouts must be positive"));
        }
        if self.prefetch_workers == 0 || self.prefetch_queue_depth == 0 {
            return Err(Error::config("prefetch pool must have workers and queue depth"));
        }
        Ok(())
    }
}
