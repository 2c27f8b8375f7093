//! Write path tests: commit, write-through, store loads and leases.

mod common;

use common::{key, single_value, Event, Grid, GridOptions, START_MS};
use crossbeam_channel::bounded;
use gridcore::commands::{Command, CommandFlags, Returned};
use gridcore::container::{DataContainer, InternalEntry, Metadata};
use gridcore::core::error::{CommandError, FunctionError, GridError};
use gridcore::persistence::{EntryStore, StoreLookup};
use std::thread;
use std::time::Duration;

fn stored_entry(name: &str, value: i64, metadata: Metadata) -> InternalEntry<String, i64> {
    InternalEntry::new(key(name), value, metadata.stamped(START_MS))
}

fn increment(grid: &Grid, name: &str) -> Option<i64> {
    let command = Command::ReadWriteKey(grid.commands.build_read_write_key(
        key(name),
        grid.functions.increment.clone(),
        CommandFlags::empty(),
    ));
    single_value(grid.run(command).unwrap())
}

// ============================================================================
// Write-through
// ============================================================================

#[test]
fn committed_writes_reach_the_store() {
    let grid = Grid::new();
    assert_eq!(grid.put("a", 1).unwrap(), None);
    assert_eq!(grid.live("a"), Some(1));
    assert_eq!(grid.stored("a"), Some(1));

    assert_eq!(grid.put("a", 2).unwrap(), Some(1));
    assert_eq!(grid.stored("a"), Some(2));
}

#[test]
fn skip_cache_store_writes_memory_only() {
    let grid = Grid::new();
    let command = Command::ReadWriteKeyValue(grid.commands.build_read_write_key_value(
        key("a"),
        1,
        grid.functions.put.clone(),
        CommandFlags::SKIP_CACHE_STORE,
    ));
    grid.run(command).unwrap();

    assert_eq!(grid.live("a"), Some(1));
    assert_eq!(grid.stored("a"), None);
    assert_eq!(grid.medium.row_count(), 0);
}

#[test]
fn remove_deletes_from_the_store() {
    let grid = Grid::new();
    grid.put("a", 1).unwrap();

    assert_eq!(grid.remove("a").unwrap(), Some(1));
    assert_eq!(grid.live("a"), None);
    assert_eq!(grid.store.load_entry(&key("a")).unwrap(), StoreLookup::Missing);
}

#[test]
fn removing_an_absent_key_changes_nothing() {
    let grid = Grid::new();
    assert_eq!(grid.remove("a").unwrap(), None);
    assert_eq!(grid.medium.row_count(), 0);
    assert!(grid.container.is_empty());
}

#[test]
fn write_through_failure_keeps_the_memory_value() {
    let grid = Grid::new();
    grid.medium.fail_writes(true);

    let err = grid.put("a", 1).unwrap_err();
    match err {
        GridError::Store(store) => assert!(store.is_retriable()),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(grid.live("a"), Some(1));

    grid.medium.fail_writes(false);
    assert_eq!(grid.stored("a"), None);
}

// ============================================================================
// Store loads
// ============================================================================

#[test]
fn read_loads_from_the_store_and_keeps_the_entry_resident() {
    let grid = Grid::new();
    grid.store
        .write(&stored_entry("cold", 7, Metadata::immortal()))
        .unwrap();
    assert!(grid.container.peek(&key("cold")).is_none());

    let entry = grid.write_path.get(&key("cold")).unwrap().unwrap();
    assert_eq!(entry.value, 7);
    assert_eq!(grid.container.peek(&key("cold")).unwrap().value, 7);
}

#[test]
fn read_of_a_missing_key_is_none() {
    let grid = Grid::new();
    assert!(grid.write_path.get(&key("nothing")).unwrap().is_none());
    assert!(grid.notifier.events().is_empty());
}

#[test]
fn read_of_an_expired_store_entry_expires_it() {
    let grid = Grid::new();
    grid.store
        .write(&stored_entry("cold", 7, Metadata::with_lifespan(100)))
        .unwrap();

    grid.time.advance(101);
    assert!(grid.write_path.get(&key("cold")).unwrap().is_none());
    assert_eq!(
        grid.notifier.events(),
        vec![Event::Expired {
            key: key("cold"),
            value: None
        }]
    );
    assert_eq!(
        grid.store.load_entry(&key("cold")).unwrap(),
        StoreLookup::Missing
    );
}

#[test]
fn write_starts_from_the_stored_value() {
    let grid = Grid::new();
    grid.store
        .write(&stored_entry("counter", 41, Metadata::immortal()))
        .unwrap();

    assert_eq!(increment(&grid, "counter"), Some(42));
    assert_eq!(grid.live("counter"), Some(42));
    assert_eq!(grid.stored("counter"), Some(42));
}

#[test]
fn expired_stored_value_reads_as_absent_for_a_write() {
    let grid = Grid::new();
    grid.store
        .write(&stored_entry("counter", 41, Metadata::with_lifespan(100)))
        .unwrap();

    grid.time.advance(101);
    assert_eq!(increment(&grid, "counter"), Some(1));
    assert_eq!(grid.stored("counter"), Some(1));
}

#[test]
fn expired_memory_entry_reads_as_absent_for_a_write() {
    let grid = Grid::new();
    grid.put_expiring("counter", 41).unwrap();

    grid.time.advance(101);
    assert_eq!(increment(&grid, "counter"), Some(1));
    // Left to the reaper; the write replaced it.
    assert!(grid.notifier.events().is_empty());
}

// ============================================================================
// Metadata
// ============================================================================

#[test]
fn default_metadata_applies_to_writes_without_limits() {
    let grid = Grid::with_options(GridOptions {
        default_metadata: Some(Metadata::with_lifespan(50)),
        ..GridOptions::default()
    });
    grid.put("a", 1).unwrap();
    grid.put_expiring("b", 2).unwrap();

    assert_eq!(grid.container.peek(&key("a")).unwrap().metadata.lifespan, 50);
    assert_eq!(grid.container.peek(&key("b")).unwrap().metadata.lifespan, 100);

    grid.time.advance(51);
    assert_eq!(grid.live("a"), None);
    assert_eq!(grid.live("b"), Some(2));
}

#[test]
fn committed_entries_are_stamped_with_the_write_time() {
    let grid = Grid::new();
    grid.time.advance(250);
    grid.put_expiring("a", 1).unwrap();

    let entry = grid.container.peek(&key("a")).unwrap();
    assert_eq!(entry.metadata.created, START_MS + 250);
    assert_eq!(entry.metadata.expiry_time(), Some(START_MS + 350));
    assert_eq!(grid.store.load(&key("a")).unwrap().unwrap().metadata, entry.metadata);
}

// ============================================================================
// Failures and leases
// ============================================================================

#[test]
fn leases_are_released_after_every_write() {
    let grid = Grid::new();
    grid.put("a", 1).unwrap();
    assert_eq!(grid.expiration.lease_count(), 0);

    let command = Command::ReadWriteKey(grid.commands.build_read_write_key(
        key("a"),
        grid.functions.fail.clone(),
        CommandFlags::empty(),
    ));
    assert!(grid.run(command).is_err());
    assert_eq!(grid.expiration.lease_count(), 0);
}

#[test]
fn keys_committed_before_a_failure_are_written_through() {
    let mut grid = Grid::new();
    let fail_on_b = grid.registry.register_read_write("fail_on_b", |view| {
        if view.key().as_str() == "b" {
            return Err(FunctionError::msg("no b"));
        }
        view.set(1, None);
        Ok(Returned::Value(None))
    });

    let command = Command::ReadWriteMany(grid.commands.build_read_write_many(
        vec![key("a"), key("b"), key("c")],
        fail_on_b,
        CommandFlags::empty(),
    ));
    let err = grid.run(command).unwrap_err();

    assert!(matches!(err, GridError::Command(CommandError::Function(_))));
    assert_eq!(grid.live("a"), Some(1));
    assert_eq!(grid.stored("a"), Some(1));
    assert_eq!(grid.live("b"), None);
    assert_eq!(grid.live("c"), None);
    assert_eq!(grid.expiration.lease_count(), 0);
}

#[test]
fn store_load_for_a_write_leaves_the_container_usable() {
    let grid = Grid::new();
    grid.store
        .write(&stored_entry("cold", 7, Metadata::immortal()))
        .unwrap();
    let held = grid.medium.hold_next_read();

    thread::scope(|scope| {
        let writer = scope.spawn(|| increment(&grid, "cold"));
        held.wait_entered();

        // Same key, so same segment as the parked write.
        let (seen_tx, seen_rx) = bounded(1);
        let grid = &grid;
        scope.spawn(move || {
            let _ = seen_tx.send(grid.container.peek(&key("cold")).is_some());
        });
        let seen = seen_rx.recv_timeout(Duration::from_secs(2));
        held.release();

        assert_eq!(seen, Ok(false));
        assert_eq!(writer.join().unwrap(), Some(8));
    });
    assert_eq!(grid.live("cold"), Some(8));
    assert_eq!(grid.stored("cold"), Some(8));
}
