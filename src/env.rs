//! Environment Module
//!
//! The surface a host database engine calls into.
//!
//! ## Responsibilities
//! - Own the device mapping, metadata table, allocator and task queue
//! - Open files by name and hand back handles bound to live slots
//! - Provide timing, scheduling and the host's auxiliary services
//! - Tear down gracefully: stop the worker, flush, unmap

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::device::{DeviceMapping, Layout};
use crate::error::{BandError, Result};
use crate::file::{
    AppendWrite, RandomAccessFile, RandomRead, SequentialFile, SequentialRead, WritableFile,
};
use crate::table::{BandAllocator, MetadataTable};
use crate::tasks::{self, Task, TaskQueue};

/// Operations the host engine relies on
///
/// Directory, deletion, rename and locking calls exist because the host's
/// contract names them. They return a well-defined result and never touch
/// the table.
pub trait Env: Send + Sync {
    fn open_sequential(&self, name: &str) -> Result<Box<dyn SequentialRead>>;
    fn open_random(&self, name: &str) -> Result<Box<dyn RandomRead>>;
    fn open_or_create_for_write(&self, name: &str) -> Result<Box<dyn AppendWrite>>;
    fn exists(&self, name: &str) -> bool;

    fn submit(&self, task: Task);
    fn spawn_detached(&self, task: Task);
    fn now_micros(&self) -> u64;
    fn sleep_micros(&self, micros: u64);

    fn get_children(&self, dir: &str) -> Result<Vec<String>>;
    fn get_file_size(&self, name: &str) -> Result<u64>;
    fn delete_file(&self, name: &str) -> Result<()>;
    fn rename_file(&self, src: &str, target: &str) -> Result<()>;
    fn create_dir(&self, dir: &str) -> Result<()>;
    fn delete_dir(&self, dir: &str) -> Result<()>;
    fn lock_file(&self, name: &str) -> Result<FileLock>;
    fn unlock_file(&self, lock: FileLock) -> Result<()>;
    fn test_directory(&self) -> Result<PathBuf>;
    fn new_logger(&self, name: &str) -> Result<Logger>;
}

/// Token returned by `lock_file`; bands have no locking of their own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLock {
    name: String,
}

impl FileLock {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Host engine info log, forwarded to `tracing`
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log(&self, message: &str) {
        info!(target: "bandstore::host", file = %self.name, "{}", message);
    }
}

/// Snapshot of table occupancy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvStats {
    pub slot_count: usize,
    pub band_size: u64,
    pub live_files: usize,
    pub high_water_mark: Option<usize>,
}

/// Band-backed storage environment
pub struct BandEnv {
    config: Config,
    device: Arc<DeviceMapping>,
    allocator: BandAllocator,
    tasks: TaskQueue,
}

/// Process-wide instance, initialised on first use
static GLOBAL: OnceLock<Result<BandEnv>> = OnceLock::new();

impl BandEnv {
    /// Map the configured device and load (or format) its metadata table
    ///
    /// On startup:
    /// 1. Validate geometry
    /// 2. Map the device
    /// 3. Load the table, or write a fresh one
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let layout = Layout::for_geometry(config.capacity, config.band_size);

        let device = Arc::new(DeviceMapping::open(
            &config.device_path,
            config.capacity,
            config.create_if_missing,
        )?);

        let table = Arc::new(MetadataTable::open(
            Arc::clone(&device),
            layout,
            config.format,
        )?);

        info!(
            device = %config.device_path.display(),
            slots = layout.slot_count,
            band_size = layout.band_size,
            "environment opened"
        );

        Ok(Self {
            config,
            device,
            allocator: BandAllocator::new(table),
            tasks: TaskQueue::new("bandstore-bg"),
        })
    }

    /// The process-wide environment, configured from `BANDSTORE_*` variables
    ///
    /// Concurrent first callers block until one of them finishes opening the
    /// device; all of them observe the same instance or the same error.
    pub fn global() -> Result<&'static BandEnv> {
        GLOBAL
            .get_or_init(|| Config::from_env().and_then(Self::open))
            .as_ref()
            .map_err(Clone::clone)
    }

    // =========================================================================
    // Files
    // =========================================================================

    pub fn open_sequential(&self, name: &str) -> Result<SequentialFile> {
        let index = self.allocator.resolve_for_read(name)?;
        Ok(SequentialFile::new(self.table(), index, name))
    }

    pub fn open_random(&self, name: &str) -> Result<RandomAccessFile> {
        let index = self.allocator.resolve_for_read(name)?;
        Ok(RandomAccessFile::new(self.table(), index, name))
    }

    /// Create `name`, or truncate it if it already exists
    pub fn open_or_create_for_write(&self, name: &str) -> Result<WritableFile> {
        let index = self.allocator.resolve_for_write(name)?;
        Ok(WritableFile::new(self.table(), index, name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.allocator.exists(name)
    }

    pub fn file_size(&self, name: &str) -> Result<u64> {
        let index = self.allocator.resolve_for_read(name)?;
        Ok(self.allocator.table().read_slot(index)?.size as u64)
    }

    /// Names of every live file, in slot order
    pub fn list(&self) -> Vec<String> {
        self.allocator
            .table()
            .live_files()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Queue `task` on the background worker
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.tasks.submit(task);
    }

    /// Run `task` on its own thread, outside the queue
    pub fn spawn_detached<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        tasks::spawn_detached(task);
    }

    pub fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_micros() as u64)
    }

    pub fn sleep_micros(&self, micros: u64) {
        thread::sleep(Duration::from_micros(micros));
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop the worker and flush the device, reporting a flush failure
    ///
    /// Dropping the environment does the same but can only log errors.
    pub fn close(self) -> Result<()> {
        self.tasks.shutdown();
        self.device.flush()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn stats(&self) -> EnvStats {
        let table = self.allocator.table();
        EnvStats {
            slot_count: table.slot_count(),
            band_size: table.layout().band_size,
            live_files: table.live_files().len(),
            high_water_mark: table.high_water_mark(),
        }
    }

    pub fn allocator(&self) -> &BandAllocator {
        &self.allocator
    }

    pub fn task_queue(&self) -> &TaskQueue {
        &self.tasks
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn table(&self) -> Arc<MetadataTable> {
        Arc::clone(self.allocator.table())
    }
}

impl Drop for BandEnv {
    fn drop(&mut self) {
        // The worker may still be running host callbacks against the table;
        // it must be gone before the mapping can be released.
        self.tasks.shutdown();
        if let Err(e) = self.device.flush() {
            warn!(error = %e, "flush on close failed");
        }
        debug!(device = %self.config.device_path.display(), "environment closed");
    }
}

impl Env for BandEnv {
    fn open_sequential(&self, name: &str) -> Result<Box<dyn SequentialRead>> {
        Ok(Box::new(BandEnv::open_sequential(self, name)?))
    }

    fn open_random(&self, name: &str) -> Result<Box<dyn RandomRead>> {
        Ok(Box::new(BandEnv::open_random(self, name)?))
    }

    fn open_or_create_for_write(&self, name: &str) -> Result<Box<dyn AppendWrite>> {
        Ok(Box::new(BandEnv::open_or_create_for_write(self, name)?))
    }

    fn exists(&self, name: &str) -> bool {
        BandEnv::exists(self, name)
    }

    fn submit(&self, task: Task) {
        self.tasks.submit_boxed(task);
    }

    fn spawn_detached(&self, task: Task) {
        tasks::spawn_detached(task);
    }

    fn now_micros(&self) -> u64 {
        BandEnv::now_micros(self)
    }

    fn sleep_micros(&self, micros: u64) {
        BandEnv::sleep_micros(self, micros);
    }

    /// Flat namespace: every live file, whatever `dir` is
    fn get_children(&self, _dir: &str) -> Result<Vec<String>> {
        Ok(self.list())
    }

    fn get_file_size(&self, name: &str) -> Result<u64> {
        self.file_size(name)
    }

    fn delete_file(&self, _name: &str) -> Result<()> {
        Err(BandError::NotSupported("delete_file"))
    }

    fn rename_file(&self, _src: &str, _target: &str) -> Result<()> {
        Err(BandError::NotSupported("rename_file"))
    }

    fn create_dir(&self, _dir: &str) -> Result<()> {
        Ok(())
    }

    fn delete_dir(&self, _dir: &str) -> Result<()> {
        Ok(())
    }

    fn lock_file(&self, name: &str) -> Result<FileLock> {
        Ok(FileLock {
            name: name.to_string(),
        })
    }

    fn unlock_file(&self, _lock: FileLock) -> Result<()> {
        Ok(())
    }

    fn test_directory(&self) -> Result<PathBuf> {
        Ok(self
            .config
            .test_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir))
    }

    fn new_logger(&self, name: &str) -> Result<Logger> {
        Ok(Logger {
            name: name.to_string(),
        })
    }
}
