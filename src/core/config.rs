//! Configuration parsing and validation.
//!
//! Configuration is loaded from TOML. Every field has a default so an empty
//! document yields a working single-node, in-memory setup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local node identity and logging.
    #[serde(default)]
    pub node: NodeConfig,

    /// In-memory container sizing.
    #[serde(default)]
    pub container: ContainerConfig,

    /// L1 invalidation.
    #[serde(default)]
    pub l1: L1Config,

    /// Expiration defaults and reaper scheduling.
    #[serde(default)]
    pub expiration: ExpirationConfig,

    /// Bucket store and backing medium.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Local node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address of this node in the cluster.
    #[serde(default = "default_node_address")]
    pub address: String,

    /// Log level used when no `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: default_node_address(),
            log_level: default_log_level(),
        }
    }
}

/// Container configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Number of independently locked segments (power of two).
    #[serde(default = "default_segments")]
    pub segments: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            segments: default_segments(),
        }
    }
}

/// L1 invalidation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L1Config {
    /// Whether requestors are tracked and invalidated.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requestor count above which invalidations are multicast.
    ///
    /// `0` always multicasts, `-1` never does.
    #[serde(default)]
    pub invalidation_threshold: i32,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            enabled: true,
            invalidation_threshold: 0,
        }
    }
}

/// Expiration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpirationConfig {
    /// Whether the periodic reaper runs.
    #[serde(default = "default_true")]
    pub reaper_enabled: bool,

    /// Delay between reaper cycles in milliseconds; `<= 0` disables the reaper.
    #[serde(default = "default_wake_up_interval_ms")]
    pub wake_up_interval_ms: i64,

    /// Default lifespan for writes without metadata (`-1` = unlimited).
    #[serde(default = "default_unlimited")]
    pub lifespan_ms: i64,

    /// Default max idle for writes without metadata (`-1` = unlimited).
    #[serde(default = "default_unlimited")]
    pub max_idle_ms: i64,
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            reaper_enabled: true,
            wake_up_interval_ms: default_wake_up_interval_ms(),
            lifespan_ms: default_unlimited(),
            max_idle_ms: default_unlimited(),
        }
    }
}

impl ExpirationConfig {
    /// Whether the reaper should be scheduled at all.
    pub fn reaper_scheduled(&self) -> bool {
        self.reaper_enabled && self.wake_up_interval_ms > 0
    }
}

/// Backing medium kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediumKind {
    /// Rows held in process memory.
    Memory,
    /// One file per bucket row under `location`.
    Directory,
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Whether a store is attached at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Backing medium kind.
    #[serde(default = "default_medium")]
    pub medium: MediumKind,

    /// Directory for the directory medium.
    #[serde(default = "default_location")]
    pub location: String,

    /// Low hash bits cleared to form a bucket id.
    #[serde(default = "default_bucket_low_bits")]
    pub bucket_low_bits: u32,

    /// Number of bucket lock stripes.
    #[serde(default = "default_lock_concurrency_level")]
    pub lock_concurrency_level: usize,

    /// Buckets per purge task.
    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: usize,

    /// Worker threads for purge and scan.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Skip unreadable buckets during scans instead of failing.
    #[serde(default)]
    pub tolerate_corrupt_buckets: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            medium: default_medium(),
            location: default_location(),
            bucket_low_bits: default_bucket_low_bits(),
            lock_concurrency_level: default_lock_concurrency_level(),
            purge_batch_size: default_purge_batch_size(),
            parallelism: default_parallelism(),
            tolerate_corrupt_buckets: false,
        }
    }
}

fn default_node_address() -> String {
    "node-0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_segments() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_wake_up_interval_ms() -> i64 {
    60_000
}

fn default_unlimited() -> i64 {
    -1
}

fn default_medium() -> MediumKind {
    MediumKind::Memory
}

fn default_location() -> String {
    "./data/buckets".to_string()
}

fn default_bucket_low_bits() -> u32 {
    10
}

fn default_lock_concurrency_level() -> usize {
    2048
}

fn default_purge_batch_size() -> usize {
    100
}

fn default_parallelism() -> usize {
    4
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply programmatic overrides.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref address) = overrides.node_address {
            self.node.address = address.clone();
        }
        if let Some(ref level) = overrides.log_level {
            self.node.log_level = level.clone();
        }
        if let Some(ref location) = overrides.persistence_location {
            self.persistence.location = location.clone();
        }
        if let Some(interval) = overrides.wake_up_interval_ms {
            self.expiration.wake_up_interval_ms = interval;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.validate_node()?;
        self.validate_container()?;
        self.validate_l1()?;
        self.validate_expiration()?;
        self.validate_persistence()?;
        Ok(())
    }

    fn validate_node(&self) -> Result<()> {
        if self.node.address.trim().is_empty() {
            anyhow::bail!("node.address must not be empty");
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.node.log_level.as_str()) {
            anyhow::bail!(
                "node.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.node.log_level
            );
        }
        Ok(())
    }

    fn validate_container(&self) -> Result<()> {
        if !self.container.segments.is_power_of_two() {
            anyhow::bail!(
                "container.segments must be a power of two, got: {}",
                self.container.segments
            );
        }
        Ok(())
    }

    fn validate_l1(&self) -> Result<()> {
        if self.l1.invalidation_threshold < -1 {
            anyhow::bail!(
                "l1.invalidation_threshold must be >= -1, got: {}",
                self.l1.invalidation_threshold
            );
        }
        Ok(())
    }

    fn validate_expiration(&self) -> Result<()> {
        let exp = &self.expiration;
        if exp.lifespan_ms < -1 || exp.max_idle_ms < -1 {
            anyhow::bail!("expiration.lifespan_ms and expiration.max_idle_ms must be >= -1");
        }
        Ok(())
    }

    fn validate_persistence(&self) -> Result<()> {
        let p = &self.persistence;
        if p.bucket_low_bits >= 32 {
            anyhow::bail!(
                "persistence.bucket_low_bits must be < 32, got: {}",
                p.bucket_low_bits
            );
        }
        if p.lock_concurrency_level == 0 {
            anyhow::bail!("persistence.lock_concurrency_level must be > 0");
        }
        if p.purge_batch_size == 0 {
            anyhow::bail!("persistence.purge_batch_size must be > 0");
        }
        if p.parallelism == 0 {
            anyhow::bail!("persistence.parallelism must be > 0");
        }
        if p.enabled && p.medium == MediumKind::Directory && p.location.trim().is_empty() {
            anyhow::bail!("persistence.location required for the directory medium");
        }
        Ok(())
    }
}

/// Override options applied on top of a loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override node address.
    pub node_address: Option<String>,
    /// Override log level.
    pub log_level: Option<String>,
    /// Override directory medium location.
    pub persistence_location: Option<String>,
    /// Override reaper interval.
    pub wake_up_interval_ms: Option<i64>,
}
