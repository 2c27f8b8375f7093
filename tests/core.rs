//! Core infrastructure tests.

mod common;

use common::{assert_err, assert_ok, config_file, key, registry, temp_test_dir, Key, MockRpc, Value};
use gridcore::commands::{Command, CommandFlags};
use gridcore::core::config::{Config, ConfigOverrides, MediumKind};
use gridcore::core::interrupt::InterruptFlag;
use gridcore::core::runtime::{ComponentHealth, Runtime};
use gridcore::core::striped::{stable_hash, StripedMap, StripedRwLock};
use gridcore::core::time::{ControlledTimeService, TimeService};
use gridcore::persistence::PersistenceManager;

// ============================================================================
// Config tests
// ============================================================================

#[test]
fn parse_minimal_config() {
    let file = config_file(
        r#"
[node]
address = "node-a"
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.node.address, "node-a");
    assert_eq!(config.node.log_level, "info");
    assert_eq!(config.container.segments, 64);
    assert!(config.l1.enabled);
    assert_eq!(config.l1.invalidation_threshold, 0);
    assert_eq!(config.expiration.wake_up_interval_ms, 60_000);
    assert_eq!(config.expiration.lifespan_ms, -1);
    assert!(config.persistence.enabled);
    assert_eq!(config.persistence.medium, MediumKind::Memory);
    assert_eq!(config.persistence.bucket_low_bits, 10);
    assert_eq!(config.persistence.lock_concurrency_level, 2048);
    assert!(!config.persistence.tolerate_corrupt_buckets);
}

#[test]
fn empty_document_is_a_valid_config() {
    let config = assert_ok(Config::from_toml(""));
    assert_eq!(config.node.address, "node-0");
    assert!(config.expiration.reaper_scheduled());
}

#[test]
fn parse_full_config() {
    let config = Config::from_toml(
        r#"
[node]
address = "node-b"
log_level = "debug"

[container]
segments = 16

[l1]
enabled = false
invalidation_threshold = 3

[expiration]
reaper_enabled = true
wake_up_interval_ms = 500
lifespan_ms = 10000
max_idle_ms = 2000

[persistence]
medium = "directory"
location = "/var/lib/grid"
bucket_low_bits = 8
purge_batch_size = 10
parallelism = 2
tolerate_corrupt_buckets = true
"#,
    )
    .unwrap();

    assert_eq!(config.node.log_level, "debug");
    assert_eq!(config.container.segments, 16);
    assert!(!config.l1.enabled);
    assert_eq!(config.l1.invalidation_threshold, 3);
    assert_eq!(config.expiration.max_idle_ms, 2000);
    assert_eq!(config.persistence.medium, MediumKind::Directory);
    assert_eq!(config.persistence.location, "/var/lib/grid");
    assert_eq!(config.persistence.parallelism, 2);
    assert!(config.persistence.tolerate_corrupt_buckets);
}

#[test]
fn validate_invalid_log_level() {
    let err = assert_err(Config::from_toml(
        r#"
[node]
log_level = "verbose"
"#,
    ));
    assert!(err.to_string().contains("log_level"));
}

#[test]
fn validate_segments_power_of_two() {
    let err = assert_err(Config::from_toml("[container]\nsegments = 12\n"));
    assert!(err.to_string().contains("power of two"));
}

#[test]
fn validate_invalidation_threshold() {
    assert_ok(Config::from_toml("[l1]\ninvalidation_threshold = -1\n"));
    let err = assert_err(Config::from_toml("[l1]\ninvalidation_threshold = -2\n"));
    assert!(err.to_string().contains("invalidation_threshold"));
}

#[test]
fn validate_bucket_low_bits() {
    let err = assert_err(Config::from_toml("[persistence]\nbucket_low_bits = 32\n"));
    assert!(err.to_string().contains("bucket_low_bits"));
}

#[test]
fn validate_zero_parallelism() {
    let err = assert_err(Config::from_toml("[persistence]\nparallelism = 0\n"));
    assert!(err.to_string().contains("parallelism"));
}

#[test]
fn validate_directory_needs_location() {
    let err = assert_err(Config::from_toml(
        r#"
[persistence]
medium = "directory"
location = ""
"#,
    ));
    assert!(err.to_string().contains("location"));

    // Not checked when persistence is off.
    assert_ok(Config::from_toml(
        r#"
[persistence]
enabled = false
medium = "directory"
location = ""
"#,
    ));
}

#[test]
fn unknown_medium_fails_to_parse() {
    let file = config_file("[persistence]\nmedium = \"tape\"\n");
    let err = assert_err(Config::from_file(file.path()));
    assert!(err.to_string().contains("failed to parse"));
}

#[test]
fn non_positive_interval_disables_the_reaper() {
    let config = Config::from_toml("[expiration]\nwake_up_interval_ms = 0\n").unwrap();
    assert!(!config.expiration.reaper_scheduled());

    let config = Config::from_toml("[expiration]\nreaper_enabled = false\n").unwrap();
    assert!(!config.expiration.reaper_scheduled());
}

#[test]
fn overrides_replace_loaded_values() {
    let mut config = Config::default();
    config.apply_overrides(&ConfigOverrides {
        node_address: Some("node-z".to_string()),
        log_level: Some("warn".to_string()),
        persistence_location: Some("/tmp/buckets".to_string()),
        wake_up_interval_ms: Some(250),
    });

    assert_eq!(config.node.address, "node-z");
    assert_eq!(config.node.log_level, "warn");
    assert_eq!(config.persistence.location, "/tmp/buckets");
    assert_eq!(config.expiration.wake_up_interval_ms, 250);
    assert_ok(config.validate());
}

// ============================================================================
// Primitives
// ============================================================================

#[test]
fn controlled_clock_moves_only_when_told() {
    let time = ControlledTimeService::new(1_000);
    assert_eq!(time.wall_clock_ms(), 1_000);
    time.advance(250);
    assert_eq!(time.wall_clock_ms(), 1_250);
    time.set(10);
    assert_eq!(time.wall_clock_ms(), 10);
}

#[test]
fn interrupt_flag_is_shared_between_clones() {
    let flag = InterruptFlag::new();
    let observer = flag.clone();
    assert!(!observer.is_interrupted());

    flag.interrupt();
    assert!(observer.is_interrupted());
    assert!(observer.clear());
    assert!(!flag.is_interrupted());
    assert!(!flag.clear());
}

#[test]
fn stable_hash_is_deterministic() {
    assert_eq!(stable_hash("bucket-key"), stable_hash("bucket-key"));
    assert_ne!(stable_hash("bucket-key"), stable_hash("other-key"));
}

#[test]
fn striped_lock_rounds_to_a_power_of_two() {
    let locks = StripedRwLock::new(100);
    assert_eq!(locks.len(), 128);
    assert!(locks.stripe_for(u64::MAX) < 128);

    let held = locks.write(7);
    assert!(locks.try_write_stripe(locks.stripe_for(7)).is_none());
    drop(held);
    assert!(locks.try_write_stripe(locks.stripe_for(7)).is_some());
}

#[test]
fn striped_map_keeps_keys_in_one_segment() {
    let map: StripedMap<Key, Value> = StripedMap::new(8);
    assert_eq!(map.segment_count(), 8);

    map.with_segment(&key("a"), |segment| segment.insert(key("a"), 1));
    map.with_segment(&key("b"), |segment| segment.insert(key("b"), 2));
    assert_eq!(map.len(), 2);

    let segment = map.segment_of(&key("a"));
    let value = map.with_segment_at(segment, |segment| segment.get(&key("a")).copied());
    assert_eq!(value, Some(1));

    map.clear();
    assert!(map.is_empty());
}

// ============================================================================
// Runtime
// ============================================================================

#[tokio::test]
async fn runtime_starts_and_stops() {
    let mut runtime: Runtime<Key, Value> = Runtime::new(Config::default()).unwrap();
    assert!(!runtime.is_ready());

    runtime.start().await.unwrap();
    assert!(runtime.is_running());
    assert!(runtime.is_ready());
    assert!(runtime.health().is_alive());
    assert_eq!(runtime.health().persistence, ComponentHealth::Healthy);
    // No transport, no L1.
    assert_eq!(runtime.health().l1, ComponentHealth::Disabled);
    assert!(runtime.l1().is_none());
    assert!(runtime.write_path().is_some());
    assert!(runtime.reaper().unwrap().is_running());

    assert!(runtime.start().await.is_err());

    runtime.stop().await.unwrap();
    assert!(!runtime.is_running());
    assert!(runtime.write_path().is_none());
    assert_eq!(runtime.health().expiration, ComponentHealth::Stopped);
    assert!(*runtime.shutdown_receiver().borrow());
}

#[tokio::test]
async fn runtime_with_transport_enables_l1() {
    let mut config = Config::default();
    config.l1.invalidation_threshold = 2;
    let mut runtime: Runtime<Key, Value> =
        Runtime::new(config).unwrap().with_rpc(MockRpc::new(false));

    runtime.start().await.unwrap();
    assert_eq!(runtime.health().l1, ComponentHealth::Healthy);
    assert!(runtime.write_path().unwrap().l1().is_some());
    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn runtime_without_persistence_or_reaper() {
    let config = Config::from_toml(
        r#"
[expiration]
reaper_enabled = false

[persistence]
enabled = false
"#,
    )
    .unwrap();
    let mut runtime: Runtime<Key, Value> = Runtime::new(config).unwrap();

    runtime.start().await.unwrap();
    assert!(runtime.is_ready());
    assert_eq!(runtime.health().persistence, ComponentHealth::Disabled);
    assert!(!runtime.persistence().unwrap().is_enabled());
    assert!(!runtime.reaper().unwrap().is_running());
    runtime.stop().await.unwrap();
}

#[test]
fn runtime_rejects_invalid_config() {
    let mut config = Config::default();
    config.container.segments = 3;
    assert!(Runtime::<Key, Value>::new(config).is_err());
}

#[tokio::test]
async fn runtime_shutdown_signal_ends_run() {
    let config = Config::from_toml("[expiration]\nreaper_enabled = false\n").unwrap();
    let mut runtime: Runtime<Key, Value> = Runtime::new(config).unwrap();
    runtime.shutdown();
    runtime.run().await.unwrap();
    assert!(!runtime.is_running());
}

#[tokio::test]
async fn directory_medium_keeps_entries_across_restarts() {
    let dir = temp_test_dir();
    let config = Config::from_toml(&format!(
        r#"
[expiration]
reaper_enabled = false

[persistence]
medium = "directory"
location = "{}"
"#,
        dir.path().display()
    ))
    .unwrap();
    let (_, functions) = registry();

    let mut first: Runtime<Key, Value> = Runtime::new(config.clone()).unwrap();
    first.start().await.unwrap();
    let mut command = Command::ReadWriteKeyValue(first.commands().build_read_write_key_value(
        key("durable"),
        42,
        functions.put.clone(),
        CommandFlags::empty(),
    ));
    let future = first
        .write_path()
        .unwrap()
        .execute(&mut command, None)
        .unwrap();
    future.wait().await.unwrap();
    first.stop().await.unwrap();

    let mut second: Runtime<Key, Value> = Runtime::new(config).unwrap();
    second.start().await.unwrap();
    let entry = second.write_path().unwrap().get(&key("durable")).unwrap();
    assert_eq!(entry.unwrap().value, 42);
    second.stop().await.unwrap();
}
