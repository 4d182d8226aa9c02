//! Tests for BandEnv
//!
//! These tests verify:
//! - The host-facing end-to-end flow
//! - Persistence of the table across reopen
//! - Device and configuration failures
//! - The auxiliary host operations (placeholders, logger, timing)
//! - Graceful teardown

use std::fs::File;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bandstore::device::Layout;
use bandstore::env::EnvStats;
use bandstore::{AppendWrite, BandEnv, BandError, Config, Env, RandomRead, SequentialRead};
use tempfile::TempDir;

const BAND_SIZE: u64 = 4096;

// =============================================================================
// Helper Functions
// =============================================================================

fn config_for(temp_dir: &TempDir, slots: usize) -> Config {
    Config::builder()
        .device_path(temp_dir.path().join("device.img"))
        .capacity(Layout::capacity_for(slots, BAND_SIZE))
        .band_size(BAND_SIZE)
        .create_if_missing(true)
        .build()
}

fn setup_env(slots: usize) -> (TempDir, BandEnv) {
    let temp_dir = TempDir::new().unwrap();
    let env = BandEnv::open(config_for(&temp_dir, slots)).unwrap();
    (temp_dir, env)
}

// =============================================================================
// End-to-End Tests
// =============================================================================

#[test]
fn test_four_slot_device_scenario() {
    let (_temp, env) = setup_env(4);
    assert_eq!(env.stats().slot_count, 4);

    let mut a = env.open_or_create_for_write("a").unwrap();
    a.append(b"hello").unwrap();
    let mut b = env.open_or_create_for_write("b").unwrap();
    b.append(b"world").unwrap();

    assert!(env.exists("a"));
    assert!(!env.exists("c"));

    let mut reader = env.open_sequential("a").unwrap();
    assert_eq!(&reader.read(5).unwrap()[..], b"hello");
    assert!(matches!(reader.read(1), Err(BandError::Io { .. })));

    let mut a = env.open_or_create_for_write("a").unwrap();
    a.append(b"hi").unwrap();

    let mut reader = env.open_sequential("a").unwrap();
    assert_eq!(&reader.read(2).unwrap()[..], b"hi");
    assert!(reader.read(1).is_err());
    assert_eq!(env.file_size("a").unwrap(), 2);

    let mut other = env.open_sequential("b").unwrap();
    assert_eq!(&other.read(5).unwrap()[..], b"world");
}

#[test]
fn test_env_trait_object() {
    let (_temp, env) = setup_env(4);
    let env: &dyn Env = &env;

    let mut writer = env.open_or_create_for_write("000001.log").unwrap();
    writer.append(b"record").unwrap();
    writer.sync().unwrap();

    let mut sequential = env.open_sequential("000001.log").unwrap();
    sequential.skip(2).unwrap();
    assert_eq!(&sequential.read(4).unwrap()[..], b"cord");

    let random = env.open_random("000001.log").unwrap();
    assert_eq!(&random.read_at(0, 3).unwrap()[..], b"rec");

    assert!(env.exists("000001.log"));
    assert_eq!(env.get_file_size("000001.log").unwrap(), 6);
}

#[test]
fn test_stats() {
    let (_temp, env) = setup_env(4);
    env.open_or_create_for_write("x").unwrap();
    env.open_or_create_for_write("y").unwrap();

    assert_eq!(
        env.stats(),
        EnvStats {
            slot_count: 4,
            band_size: BAND_SIZE,
            live_files: 2,
            high_water_mark: Some(1),
        }
    );
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_files_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let env = BandEnv::open(config_for(&temp_dir, 4)).unwrap();
        let mut file = env.open_or_create_for_write("MANIFEST-000001").unwrap();
        file.append(b"manifest").unwrap();
        env.open_or_create_for_write("CURRENT")
            .unwrap()
            .append(b"MANIFEST-000001\n")
            .unwrap();
        env.close().unwrap();
    }

    let env = BandEnv::open(config_for(&temp_dir, 4)).unwrap();

    assert_eq!(env.list(), vec!["MANIFEST-000001", "CURRENT"]);
    assert_eq!(env.stats().high_water_mark, Some(1));
    let file = env.open_random("CURRENT").unwrap();
    assert_eq!(&file.read_at(0, 16).unwrap()[..], b"MANIFEST-000001\n");

    // Growth continues after the persisted high-water mark
    assert_eq!(env.open_or_create_for_write("LOCK").unwrap().slot(), 2);
}

#[test]
fn test_format_discards_existing_table() {
    let temp_dir = TempDir::new().unwrap();
    {
        let env = BandEnv::open(config_for(&temp_dir, 4)).unwrap();
        env.open_or_create_for_write("old").unwrap().append(b"x").unwrap();
    }

    let mut config = config_for(&temp_dir, 4);
    config.format = true;
    let env = BandEnv::open(config).unwrap();

    assert!(!env.exists("old"));
    assert_eq!(env.stats().high_water_mark, None);
}

#[test]
fn test_geometry_mismatch_refused() {
    let temp_dir = TempDir::new().unwrap();
    drop(BandEnv::open(config_for(&temp_dir, 4)).unwrap());

    let mut config = config_for(&temp_dir, 4);
    config.band_size = BAND_SIZE / 2;

    assert!(matches!(BandEnv::open(config), Err(BandError::Layout(_))));
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_missing_device_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .device_path(temp_dir.path().join("no-such-device"))
        .capacity(Layout::capacity_for(4, BAND_SIZE))
        .band_size(BAND_SIZE)
        .build();

    let result = BandEnv::open(config);

    assert!(matches!(result, Err(BandError::DeviceUnavailable { .. })));
}

#[test]
fn test_short_device_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("short.img");
    File::create(&path).unwrap().set_len(1024).unwrap();
    let config = Config::builder()
        .device_path(&path)
        .capacity(Layout::capacity_for(4, BAND_SIZE))
        .band_size(BAND_SIZE)
        .build();

    let result = BandEnv::open(config);

    assert!(matches!(result, Err(BandError::DeviceUnavailable { .. })));
}

#[test]
fn test_device_open_is_exclusive() {
    let temp_dir = TempDir::new().unwrap();
    let first = BandEnv::open(config_for(&temp_dir, 4)).unwrap();
    first.open_or_create_for_write("a").unwrap().append(b"AAAA").unwrap();

    let second = BandEnv::open(config_for(&temp_dir, 4));

    assert!(matches!(second, Err(BandError::DeviceUnavailable { .. })));
    let reader = first.open_random("a").unwrap();
    assert_eq!(&reader.read_at(0, 4).unwrap()[..], b"AAAA");
}

#[test]
fn test_device_lock_released_on_drop() {
    let temp_dir = TempDir::new().unwrap();
    let first = BandEnv::open(config_for(&temp_dir, 4)).unwrap();
    first.open_or_create_for_write("a").unwrap().append(b"AAAA").unwrap();
    let handle = first.open_random("a").unwrap();
    drop(first);

    // The open handle still pins the mapping, and with it the lock
    assert!(matches!(
        BandEnv::open(config_for(&temp_dir, 4)),
        Err(BandError::DeviceUnavailable { .. })
    ));
    drop(handle);

    let second = BandEnv::open(config_for(&temp_dir, 4)).unwrap();
    assert_eq!(second.list(), vec!["a"]);
}

#[test]
fn test_invalid_geometry_rejected() {
    let temp_dir = TempDir::new().unwrap();

    let mut config = config_for(&temp_dir, 4);
    config.band_size = 0;
    assert!(matches!(BandEnv::open(config), Err(BandError::Config(_))));

    let mut config = config_for(&temp_dir, 4);
    config.capacity = BAND_SIZE;
    assert!(matches!(BandEnv::open(config), Err(BandError::Config(_))));

    let mut config = config_for(&temp_dir, 4);
    config.band_size = u64::MAX;
    assert!(matches!(BandEnv::open(config), Err(BandError::Config(_))));
}

#[test]
fn test_oversized_band_size_is_config_error() {
    for band_size in [u64::MAX, u64::MAX - 255, 1 << 63] {
        let config = Config::builder()
            .capacity(1 << 20)
            .band_size(band_size)
            .build();

        assert!(matches!(config.validate(), Err(BandError::Config(_))));
    }
}

// =============================================================================
// Host Service Tests
// =============================================================================

#[test]
fn test_placeholder_operations() {
    let (_temp, env) = setup_env(4);
    env.open_or_create_for_write("keep").unwrap();
    let env: &dyn Env = &env;

    assert_eq!(
        env.delete_file("keep"),
        Err(BandError::NotSupported("delete_file"))
    );
    assert_eq!(
        env.rename_file("keep", "moved"),
        Err(BandError::NotSupported("rename_file"))
    );
    assert!(env.exists("keep"));
    assert!(!env.exists("moved"));

    env.create_dir("db").unwrap();
    env.delete_dir("db").unwrap();

    let lock = env.lock_file("LOCK").unwrap();
    assert_eq!(lock.name(), "LOCK");
    env.unlock_file(lock).unwrap();

    assert_eq!(env.get_children("any").unwrap(), vec!["keep".to_string()]);
    assert!(matches!(
        env.get_file_size("missing"),
        Err(BandError::NotFound(_))
    ));
    assert_eq!(env.test_directory().unwrap(), std::env::temp_dir());
}

#[test]
fn test_configured_test_directory() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config_for(&temp_dir, 4);
    config.test_dir = Some(temp_dir.path().join("tests"));
    let env = BandEnv::open(config).unwrap();

    assert_eq!(
        Env::test_directory(&env).unwrap(),
        temp_dir.path().join("tests")
    );
}

#[test]
fn test_logger() {
    let (_temp, env) = setup_env(4);

    let logger = Env::new_logger(&env, "LOG").unwrap();
    logger.log("compaction started");

    assert_eq!(logger.name(), "LOG");
}

#[test]
fn test_timing() {
    let (_temp, env) = setup_env(4);

    let before = env.now_micros();
    env.sleep_micros(2_000);
    let after = env.now_micros();

    assert!(after >= before + 2_000);
}

// =============================================================================
// Scheduling and Teardown Tests
// =============================================================================

#[test]
fn test_scheduled_task_reads_files() {
    let (_temp, env) = setup_env(4);
    let env = Arc::new(env);
    env.open_or_create_for_write("input")
        .unwrap()
        .append(b"payload")
        .unwrap();
    let (tx, rx) = crossbeam::channel::bounded(1);

    let task_env = Arc::clone(&env);
    env.submit(move || {
        let file = task_env.open_random("input").unwrap();
        tx.send(file.read_at(0, 7).unwrap()).unwrap();
    });

    let data = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(&data[..], b"payload");
}

#[test]
fn test_drop_stops_worker_after_queued_tasks() {
    let temp_dir = TempDir::new().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let env = BandEnv::open(config_for(&temp_dir, 4)).unwrap();
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            env.submit(move || {
                thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(env.task_queue().is_running());
    }

    assert_eq!(counter.load(Ordering::SeqCst), 20);
}

#[test]
fn test_handles_outlive_environment() {
    let temp_dir = TempDir::new().unwrap();
    let env = BandEnv::open(config_for(&temp_dir, 4)).unwrap();
    env.open_or_create_for_write("f").unwrap().append(b"still here").unwrap();
    let reader = env.open_random("f").unwrap();

    env.close().unwrap();

    assert_eq!(&reader.read_at(0, 10).unwrap()[..], b"still here");
}
