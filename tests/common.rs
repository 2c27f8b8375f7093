//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use crossbeam_channel::{bounded, Receiver, Sender};
use futures::future::ready;
use gridcore::commands::{
    Command, CommandEnvelope, CommandFlags, CommandKind, CommandOutput, CommandsFactory,
    FunctionRegistry, ReadWriteFn, ReadWriteValueFn, Returned, WriteOnlyFn,
};
use gridcore::container::{DataContainer, Metadata, SegmentedDataContainer};
use gridcore::core::error::{FunctionError, GridResult, MediumError, RpcError};
use gridcore::core::telemetry::init_tracing;
use gridcore::core::time::{ControlledTimeService, TimeService};
use gridcore::distribution::{Address, KeyOwnership, L1Manager, RpcFuture, RpcManager};
use gridcore::expiration::{CacheNotifier, ExpirationManager};
use gridcore::persistence::{
    BackingMedium, BucketStore, BucketStoreConfig, EntryStore, MemoryMedium, PersistenceManager,
    Row, RowStream, StoreManager,
};
use gridcore::WritePath;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

pub type Key = String;
pub type Value = i64;
/// Result type of every registered test function: the value seen before the write.
pub type Output = Option<i64>;

/// Clock start used by every fixture.
pub const START_MS: i64 = 1_000_000;

/// Lifespan given by the `put_expiring` function.
pub const SHORT_LIFESPAN_MS: i64 = 100;

pub fn key(name: &str) -> Key {
    name.to_string()
}

// ============================================================================
// Notifications
// ============================================================================

/// Event recorded by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Expired {
        key: Key,
        value: Option<Value>,
    },
    Invalidated {
        key: Key,
        value: Option<Value>,
        pre: bool,
    },
}

/// Notifier that keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
    invalidated_metadata: Mutex<Vec<Option<Metadata>>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Keys reported expired, sorted.
    pub fn expired_keys(&self) -> Vec<Key> {
        let mut keys: Vec<_> = self
            .events
            .lock()
            .iter()
            .filter_map(|event| match event {
                Event::Expired { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect();
        keys.sort();
        keys
    }

    /// Metadata passed with each invalidation event, in order.
    pub fn invalidated_metadata(&self) -> Vec<Option<Metadata>> {
        self.invalidated_metadata.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.invalidated_metadata.lock().clear();
    }
}

impl CacheNotifier<Key, Value> for RecordingNotifier {
    fn entry_expired(&self, key: &Key, value: Option<&Value>, _metadata: Option<&Metadata>) {
        self.events.lock().push(Event::Expired {
            key: key.clone(),
            value: value.copied(),
        });
    }

    fn entry_invalidated(
        &self,
        key: &Key,
        value: Option<&Value>,
        metadata: Option<&Metadata>,
        pre: bool,
    ) {
        self.invalidated_metadata.lock().push(metadata.copied());
        self.events.lock().push(Event::Invalidated {
            key: key.clone(),
            value: value.copied(),
            pre,
        });
    }
}

// ============================================================================
// Remote invocation
// ============================================================================

/// One call seen by [`MockRpc`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcCall {
    Unicast(Vec<Address>, CommandKind),
    Broadcast(CommandKind),
}

/// Transport double that records calls and answers immediately.
pub struct MockRpc {
    local: Address,
    multicast: bool,
    fail: AtomicBool,
    calls: Mutex<Vec<RpcCall>>,
    envelopes: Mutex<Vec<CommandEnvelope>>,
}

impl MockRpc {
    pub fn new(multicast: bool) -> Arc<Self> {
        Arc::new(Self {
            local: Address::new("local"),
            multicast,
            fail: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            envelopes: Mutex::new(Vec::new()),
        })
    }

    /// Make every subsequent call fail.
    pub fn fail_calls(&self) {
        self.fail.store(true, Ordering::Release);
    }

    pub fn calls(&self) -> Vec<RpcCall> {
        self.calls.lock().clone()
    }

    pub fn envelopes(&self) -> Vec<CommandEnvelope> {
        self.envelopes.lock().clone()
    }

    fn reply(&self, responders: Vec<Address>) -> RpcFuture {
        if self.fail.load(Ordering::Acquire) {
            Box::pin(ready(Err(RpcError::Transport {
                message: "link down".to_string(),
            })))
        } else {
            Box::pin(ready(Ok(responders)))
        }
    }
}

impl RpcManager for MockRpc {
    fn local_address(&self) -> &Address {
        &self.local
    }

    fn invoke_remotely(&self, targets: Vec<Address>, command: CommandEnvelope) -> RpcFuture {
        self.calls
            .lock()
            .push(RpcCall::Unicast(targets.clone(), command.kind));
        self.envelopes.lock().push(command);
        self.reply(targets)
    }

    fn broadcast(&self, command: CommandEnvelope) -> RpcFuture {
        self.calls.lock().push(RpcCall::Broadcast(command.kind));
        self.envelopes.lock().push(command);
        self.reply(Vec::new())
    }

    fn is_multicast_capable(&self) -> bool {
        self.multicast
    }
}

// ============================================================================
// Backing medium
// ============================================================================

/// In-memory medium whose failures can be switched on per operation kind.
#[derive(Debug, Default)]
pub struct FlakyMedium {
    inner: MemoryMedium,
    fail_writes: AtomicBool,
    lose_updates: AtomicBool,
    interrupt_reads: AtomicBool,
    held_read: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

/// A single-row read parked inside the medium.
///
/// The read resumes when this handle is released or dropped.
pub struct HeldRead {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl HeldRead {
    /// Block until the read is parked. Panics after five seconds.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(5))
            .expect("no read reached the medium");
    }

    pub fn release(self) {
        drop(self);
    }
}

impl FlakyMedium {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Inserts and updates fail as if the medium were down.
    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::Release);
    }

    /// Updates report zero affected rows.
    pub fn lose_updates(&self, on: bool) {
        self.lose_updates.store(on, Ordering::Release);
    }

    /// Reads report an interrupted call.
    pub fn interrupt_reads(&self, on: bool) {
        self.interrupt_reads.store(on, Ordering::Release);
    }

    pub fn row_count(&self) -> usize {
        self.inner.row_count()
    }

    /// Park the next single-row read until the returned handle is released.
    pub fn hold_next_read(&self) -> HeldRead {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(0);
        *self.held_read.lock() = Some((entered_tx, release_rx));
        HeldRead {
            entered: entered_rx,
            release: release_tx,
        }
    }

    fn check_write(&self) -> Result<(), MediumError> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(MediumError::Unavailable {
                message: "medium offline".to_string(),
            });
        }
        Ok(())
    }

    fn check_read(&self) -> Result<(), MediumError> {
        if self.interrupt_reads.load(Ordering::Acquire) {
            return Err(MediumError::Interrupted);
        }
        Ok(())
    }
}

impl BackingMedium for FlakyMedium {
    fn select_row(&self, bucket_id: &str) -> Result<Option<Row>, MediumError> {
        self.check_read()?;
        let held = self.held_read.lock().take();
        if let Some((entered, release)) = held {
            let _ = entered.send(());
            // Returns once the handle is dropped.
            let _ = release.recv();
        }
        self.inner.select_row(bucket_id)
    }

    fn insert_row(&self, row: &Row) -> Result<usize, MediumError> {
        self.check_write()?;
        self.inner.insert_row(row)
    }

    fn update_row(&self, row: &Row) -> Result<usize, MediumError> {
        self.check_write()?;
        if self.lose_updates.load(Ordering::Acquire) {
            return Ok(0);
        }
        self.inner.update_row(row)
    }

    fn delete_rows(&self, bucket_ids: &[String]) -> Result<usize, MediumError> {
        self.inner.delete_rows(bucket_ids)
    }

    fn select_expired_rows(&self, now: i64) -> Result<RowStream<'_>, MediumError> {
        self.check_read()?;
        self.inner.select_expired_rows(now)
    }

    fn select_all_rows(&self) -> Result<RowStream<'_>, MediumError> {
        self.check_read()?;
        self.inner.select_all_rows()
    }

    fn delete_all(&self) -> Result<usize, MediumError> {
        self.inner.delete_all()
    }
}

// ============================================================================
// Mutation functions
// ============================================================================

/// Functions registered by [`registry`].
pub struct Functions {
    /// Writes the supplied value, returns the value seen before.
    pub put: ReadWriteValueFn<Key, Value, Output>,
    /// Like `put`, with a lifespan of [`SHORT_LIFESPAN_MS`].
    pub put_expiring: ReadWriteValueFn<Key, Value, Output>,
    /// Adds one to the value (absent counts as zero), returns the new value.
    pub increment: ReadWriteFn<Key, Value, Output>,
    /// Removes the entry, returns the value seen before.
    pub remove: ReadWriteFn<Key, Value, Output>,
    /// Doubles the value if present and returns its own view.
    pub double_view: ReadWriteFn<Key, Value, Output>,
    /// Always fails.
    pub fail: ReadWriteFn<Key, Value, Output>,
    /// Writes 100 without reading.
    pub overwrite: WriteOnlyFn<Key, Value>,
}

pub fn registry() -> (FunctionRegistry<Key, Value, Output>, Functions) {
    let mut registry: FunctionRegistry<Key, Value, Output> = FunctionRegistry::new();
    let put = registry.register_read_write_value("put", |value, view| {
        let previous = view.find().copied();
        view.set(*value, None);
        Ok(Returned::Value(previous))
    });
    let put_expiring = registry.register_read_write_value("put_expiring", |value, view| {
        let previous = view.find().copied();
        view.set(*value, Some(Metadata::with_lifespan(SHORT_LIFESPAN_MS)));
        Ok(Returned::Value(previous))
    });
    let increment = registry.register_read_write("increment", |view| {
        let next = view.find().copied().unwrap_or(0) + 1;
        view.set(next, None);
        Ok(Returned::Value(Some(next)))
    });
    let remove = registry.register_read_write("remove", |view| {
        let previous = view.find().copied();
        view.remove();
        Ok(Returned::Value(previous))
    });
    let double_view = registry.register_read_write("double_view", |view| {
        if let Some(current) = view.find().copied() {
            view.set(current * 2, None);
        }
        Ok(Returned::View)
    });
    let fail = registry.register_read_write("fail", |_view| Err(FunctionError::msg("boom")));
    let overwrite = registry.register_write_only("overwrite", |view| {
        view.set(100, None);
        Ok(())
    });
    let functions = Functions {
        put,
        put_expiring,
        increment,
        remove,
        double_view,
        fail,
        overwrite,
    };
    (registry, functions)
}

// ============================================================================
// Grid fixture
// ============================================================================

/// A single node wired the way the runtime wires it, on a controlled clock.
pub struct Grid {
    pub time: Arc<ControlledTimeService>,
    pub medium: Arc<FlakyMedium>,
    pub store: Arc<BucketStore<Key, Value>>,
    pub persistence: Arc<StoreManager<Key, Value>>,
    pub container: Arc<SegmentedDataContainer<Key, Value>>,
    pub notifier: Arc<RecordingNotifier>,
    pub expiration: Arc<ExpirationManager<Key, Value>>,
    pub write_path: WritePath<Key, Value>,
    pub registry: FunctionRegistry<Key, Value, Output>,
    pub functions: Functions,
    pub commands: Arc<CommandsFactory>,
}

/// Optional parts of a [`Grid`].
#[derive(Default)]
pub struct GridOptions {
    pub rpc: Option<(Arc<MockRpc>, i32)>,
    pub ownership: Option<Arc<dyn KeyOwnership<Key>>>,
    pub store_config: Option<BucketStoreConfig>,
    pub default_metadata: Option<Metadata>,
}

impl Grid {
    pub fn new() -> Self {
        Self::with_options(GridOptions::default())
    }

    /// A grid that invalidates L1 copies through `rpc`.
    pub fn with_l1(rpc: Arc<MockRpc>, threshold: i32) -> Self {
        Self::with_options(GridOptions {
            rpc: Some((rpc, threshold)),
            ..GridOptions::default()
        })
    }

    pub fn with_options(options: GridOptions) -> Self {
        init_tracing("warn");

        let time = Arc::new(ControlledTimeService::new(START_MS));
        let medium = FlakyMedium::new();
        let store = Arc::new(BucketStore::<Key, Value>::new(
            medium.clone(),
            time.clone(),
            options.store_config.unwrap_or_default(),
        ));
        let stores: Vec<Arc<dyn EntryStore<Key, Value>>> = vec![store.clone()];
        let persistence = Arc::new(StoreManager::new(stores));
        let container = Arc::new(SegmentedDataContainer::<Key, Value>::new(16));
        let notifier = RecordingNotifier::new();

        let container_dyn: Arc<dyn DataContainer<Key, Value>> = container.clone();
        let persistence_dyn: Arc<dyn PersistenceManager<Key, Value>> = persistence.clone();
        let notifier_dyn: Arc<dyn CacheNotifier<Key, Value>> = notifier.clone();
        let expiration = Arc::new(ExpirationManager::new(
            container_dyn.clone(),
            persistence_dyn.clone(),
            notifier_dyn.clone(),
            time.clone(),
            16,
        ));

        let commands = Arc::new(CommandsFactory::new(Address::new("local")));
        let mut write_path = WritePath::new(
            container_dyn,
            persistence_dyn,
            expiration.clone(),
            notifier_dyn,
            time.clone(),
        );
        if let Some((rpc, threshold)) = options.rpc {
            let l1 = Arc::new(L1Manager::<Key, Value>::new(rpc, commands.clone(), threshold, 16));
            write_path = write_path.with_l1(l1);
        }
        if let Some(ownership) = options.ownership {
            write_path = write_path.with_ownership(ownership);
        }
        if let Some(metadata) = options.default_metadata {
            write_path = write_path.with_default_metadata(metadata);
        }

        let (registry, functions) = registry();
        Self {
            time,
            medium,
            store,
            persistence,
            container,
            notifier,
            expiration,
            write_path,
            registry,
            functions,
            commands,
        }
    }

    pub fn now(&self) -> i64 {
        self.time.wall_clock_ms()
    }

    /// Execute a command and wait for its invalidation to finish.
    pub fn run(&self, mut command: Command<Key, Value, Output>) -> GridResult<CommandOutput<Key, Value, Output>> {
        let future = self.write_path.execute(&mut command, None)?;
        Ok(futures::executor::block_on(future.wait())?)
    }

    pub fn put_command(&self, name: &str, value: Value) -> Command<Key, Value, Output> {
        Command::ReadWriteKeyValue(self.commands.build_read_write_key_value(
            key(name),
            value,
            self.functions.put.clone(),
            CommandFlags::empty(),
        ))
    }

    /// Put `value`, returning the value seen before.
    pub fn put(&self, name: &str, value: Value) -> GridResult<Output> {
        let output = self.run(self.put_command(name, value))?;
        Ok(single_value(output))
    }

    /// Put `value` with a lifespan of [`SHORT_LIFESPAN_MS`].
    pub fn put_expiring(&self, name: &str, value: Value) -> GridResult<Output> {
        let command = Command::ReadWriteKeyValue(self.commands.build_read_write_key_value(
            key(name),
            value,
            self.functions.put_expiring.clone(),
            CommandFlags::empty(),
        ));
        Ok(single_value(self.run(command)?))
    }

    pub fn remove(&self, name: &str) -> GridResult<Output> {
        let command = Command::ReadWriteKey(self.commands.build_read_write_key(
            key(name),
            self.functions.remove.clone(),
            CommandFlags::empty(),
        ));
        Ok(single_value(self.run(command)?))
    }

    /// Live in-memory value.
    pub fn live(&self, name: &str) -> Option<Value> {
        self.container
            .get(&key(name), self.now())
            .map(|entry| entry.value)
    }

    /// Live value in the store.
    pub fn stored(&self, name: &str) -> Option<Value> {
        self.store
            .load(&key(name))
            .expect("store load failed")
            .map(|entry| entry.value)
    }
}

/// Plain value returned by a single-key command.
pub fn single_value(output: CommandOutput<Key, Value, Output>) -> Output {
    output
        .into_single()
        .and_then(|result| result.value().cloned())
        .flatten()
}

// ============================================================================
// Config files
// ============================================================================

/// Write `content` to a temporary TOML file.
pub fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a temp directory for test data.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

// ============================================================================
// Assertions
// ============================================================================

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err and return the error.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_every_function() {
        let (registry, _) = registry();
        assert!(registry.read_write_value("put").is_ok());
        assert!(registry.read_write("increment").is_ok());
        assert!(registry.write_only("overwrite").is_ok());
    }

    #[test]
    fn test_flaky_medium_passes_through_by_default() {
        let medium = FlakyMedium::new();
        let row = Row {
            bucket_id: "1024".to_string(),
            payload: vec![1, 2, 3],
            earliest_expiry: -1,
        };
        assert_eq!(medium.insert_row(&row).unwrap(), 1);
        assert_eq!(medium.select_row("1024").unwrap(), Some(row));
    }
}
