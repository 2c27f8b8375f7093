//! Main runtime orchestration.
//!
//! The runtime builds every component from [`Config`] and coordinates their
//! lifecycle:
//! - Start order: persistence → container → expiration → L1 → write path → reaper
//! - Shutdown order: reaper → write path → L1 → expiration → container → persistence

use crate::cache::WritePath;
use crate::commands::{CommandsFactory, InvalidationCommandFactory};
use crate::container::{DataContainer, GridKey, GridValue, Metadata, SegmentedDataContainer};
use crate::core::config::{Config, MediumKind};
use crate::core::time::{SystemTimeService, TimeService};
use crate::distribution::{Address, AllKeysLocal, KeyOwnership, L1Manager, RpcManager};
use crate::expiration::{CacheNotifier, ExpirationManager, ExpirationReaper, LoggingNotifier};
use crate::persistence::{
    BackingMedium, BucketStore, BucketStoreConfig, DirectoryMedium, EntryStore, MemoryMedium,
    PersistenceManager, StoreManager,
};
use anyhow::{bail, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component is switched off by configuration.
    Disabled,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    pub persistence: ComponentHealth,
    pub container: ComponentHealth,
    pub expiration: ComponentHealth,
    pub l1: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            persistence: ComponentHealth::Starting,
            container: ComponentHealth::Starting,
            expiration: ComponentHealth::Starting,
            l1: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        let up = |h: ComponentHealth| matches!(h, ComponentHealth::Healthy | ComponentHealth::Disabled);
        up(self.persistence) && up(self.container) && up(self.expiration) && up(self.l1)
    }

    /// Check if the runtime is alive (not failed).
    pub fn is_alive(&self) -> bool {
        ![self.persistence, self.container, self.expiration, self.l1].contains(&ComponentHealth::Failed)
    }
}

/// Grid runtime holding all component handles.
pub struct Runtime<K, V> {
    config: Arc<Config>,
    time: Arc<dyn TimeService>,
    notifier: Arc<dyn CacheNotifier<K, V>>,
    rpc: Option<Arc<dyn RpcManager>>,
    ownership: Arc<dyn KeyOwnership<K>>,
    commands: Arc<CommandsFactory>,

    medium: Option<Arc<dyn BackingMedium>>,
    persistence: Option<Arc<dyn PersistenceManager<K, V>>>,
    container: Option<Arc<dyn DataContainer<K, V>>>,
    expiration: Option<Arc<ExpirationManager<K, V>>>,
    reaper: Option<ExpirationReaper<K, V>>,
    l1: Option<Arc<L1Manager<K, V>>>,
    write_path: Option<Arc<WritePath<K, V>>>,

    health: RuntimeHealth,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<K: GridKey, V: GridValue> Runtime<K, V> {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let commands = Arc::new(CommandsFactory::new(Address::new(config.node.address.clone())));

        Ok(Self {
            config: Arc::new(config),
            time: Arc::new(SystemTimeService),
            notifier: Arc::new(LoggingNotifier),
            rpc: None,
            ownership: Arc::new(AllKeysLocal),
            commands,
            medium: None,
            persistence: None,
            container: None,
            expiration: None,
            reaper: None,
            l1: None,
            write_path: None,
            health: RuntimeHealth::default(),
            running: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Use `time` instead of the system clock.
    pub fn with_time_service(mut self, time: Arc<dyn TimeService>) -> Self {
        self.time = time;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CacheNotifier<K, V>>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Remote invocation used for L1 invalidation. Without one L1 stays off.
    pub fn with_rpc(mut self, rpc: Arc<dyn RpcManager>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    pub fn with_ownership(mut self, ownership: Arc<dyn KeyOwnership<K>>) -> Self {
        self.ownership = ownership;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn commands(&self) -> &Arc<CommandsFactory> {
        &self.commands
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn write_path(&self) -> Option<&Arc<WritePath<K, V>>> {
        self.write_path.as_ref()
    }

    pub fn expiration(&self) -> Option<&Arc<ExpirationManager<K, V>>> {
        self.expiration.as_ref()
    }

    pub fn reaper(&self) -> Option<&ExpirationReaper<K, V>> {
        self.reaper.as_ref()
    }

    pub fn persistence(&self) -> Option<&Arc<dyn PersistenceManager<K, V>>> {
        self.persistence.as_ref()
    }

    pub fn l1(&self) -> Option<&Arc<L1Manager<K, V>>> {
        self.l1.as_ref()
    }

    /// Initialize and start all runtime components.
    ///
    /// Must be called from within a tokio runtime when the reaper is scheduled.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            bail!("runtime already started");
        }
        tracing::info!(node = %self.config.node.address, "starting grid runtime");

        self.init_persistence().await?;
        self.init_container().await?;
        self.init_expiration().await?;
        self.init_l1().await?;
        self.init_write_path().await?;
        self.start_reaper().await?;

        self.running.store(true, Ordering::Release);
        tracing::info!("grid runtime started");
        Ok(())
    }

    async fn init_persistence(&mut self) -> Result<()> {
        tracing::debug!("initializing persistence");
        let config = &self.config.persistence;

        if !config.enabled {
            self.persistence = Some(Arc::new(StoreManager::<K, V>::disabled()));
            self.health.persistence = ComponentHealth::Disabled;
            tracing::info!("persistence disabled");
            return Ok(());
        }

        let medium: Arc<dyn BackingMedium> = match config.medium {
            MediumKind::Memory => Arc::new(MemoryMedium::new()),
            MediumKind::Directory => Arc::new(
                DirectoryMedium::open(&config.location).with_context(|| {
                    format!("failed to open bucket directory {}", config.location)
                })?,
            ),
        };
        let store: Arc<dyn EntryStore<K, V>> = Arc::new(BucketStore::<K, V>::new(
            medium.clone(),
            self.time.clone(),
            BucketStoreConfig::from(config),
        ));

        self.medium = Some(medium);
        self.persistence = Some(Arc::new(StoreManager::new(vec![store])));
        self.health.persistence = ComponentHealth::Healthy;
        tracing::info!(
            medium = ?config.medium,
            bucket_low_bits = config.bucket_low_bits,
            "persistence initialized"
        );
        Ok(())
    }

    async fn init_container(&mut self) -> Result<()> {
        let segments = self.config.container.segments;
        self.container = Some(Arc::new(SegmentedDataContainer::<K, V>::new(segments)));
        self.health.container = ComponentHealth::Healthy;
        tracing::info!(segments, "data container initialized");
        Ok(())
    }

    async fn init_expiration(&mut self) -> Result<()> {
        let (container, persistence) = match (&self.container, &self.persistence) {
            (Some(container), Some(persistence)) => (container.clone(), persistence.clone()),
            _ => bail!("expiration requires the container and persistence"),
        };
        let manager = Arc::new(ExpirationManager::new(
            container,
            persistence,
            self.notifier.clone(),
            self.time.clone(),
            self.config.container.segments,
        ));
        self.reaper = Some(ExpirationReaper::new(manager.clone(), &self.config.expiration));
        self.expiration = Some(manager);
        self.health.expiration = ComponentHealth::Healthy;
        tracing::info!("expiration manager initialized");
        Ok(())
    }

    async fn init_l1(&mut self) -> Result<()> {
        let config = &self.config.l1;
        match (&self.rpc, config.enabled) {
            (Some(rpc), true) => {
                let commands: Arc<dyn InvalidationCommandFactory<K, V>> = self.commands.clone();
                self.l1 = Some(Arc::new(L1Manager::new(
                    rpc.clone(),
                    commands,
                    config.invalidation_threshold,
                    self.config.container.segments,
                )));
                self.health.l1 = ComponentHealth::Healthy;
                tracing::info!(threshold = config.invalidation_threshold, "L1 invalidation initialized");
            }
            _ => {
                self.health.l1 = ComponentHealth::Disabled;
                tracing::info!("L1 invalidation disabled");
            }
        }
        Ok(())
    }

    async fn init_write_path(&mut self) -> Result<()> {
        let (container, persistence, expiration) =
            match (&self.container, &self.persistence, &self.expiration) {
                (Some(c), Some(p), Some(e)) => (c.clone(), p.clone(), e.clone()),
                _ => bail!("write path requires container, persistence and expiration"),
            };
        let expiration_config = &self.config.expiration;
        let mut write_path = WritePath::new(
            container,
            persistence,
            expiration,
            self.notifier.clone(),
            self.time.clone(),
        )
        .with_ownership(self.ownership.clone())
        .with_default_metadata(Metadata::new(
            expiration_config.lifespan_ms,
            expiration_config.max_idle_ms,
        ));
        if let Some(l1) = &self.l1 {
            write_path = write_path.with_l1(l1.clone());
        }
        self.write_path = Some(Arc::new(write_path));
        tracing::debug!("write path initialized");
        Ok(())
    }

    async fn start_reaper(&mut self) -> Result<()> {
        if let Some(reaper) = &self.reaper {
            let scheduled = reaper.start().context("failed to start expiration reaper")?;
            tracing::debug!(scheduled, "expiration reaper configured");
        }
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for shutdown signal.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Run the runtime until shutdown is requested.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;
        self.wait_for_shutdown().await;
        self.stop().await
    }

    /// Stop all runtime components in reverse start order.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping grid runtime");
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        self.health.expiration = ComponentHealth::Stopping;
        if let Some(reaper) = self.reaper.take() {
            reaper.stop().await;
        }

        self.write_path = None;

        if self.l1.take().is_some() {
            self.health.l1 = ComponentHealth::Stopped;
        }

        self.expiration = None;
        self.health.expiration = ComponentHealth::Stopped;

        if let Some(container) = self.container.take() {
            tracing::debug!(entries = container.len(), "releasing data container");
        }
        self.health.container = ComponentHealth::Stopped;

        self.persistence = None;
        self.medium = None;
        self.health.persistence = ComponentHealth::Stopped;

        tracing::info!("grid runtime stopped");
        Ok(())
    }
}
