//! Configuration for bandstore
//!
//! Centralized configuration with sensible defaults. Device geometry is fixed
//! at configuration time; nothing is discovered from the device at runtime.

use std::path::PathBuf;

use crate::device::Layout;
use crate::error::{BandError, Result};

/// Main configuration for a bandstore environment
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Device Configuration
    // -------------------------------------------------------------------------
    /// Raw block device (or backing file) holding the header and all bands
    pub device_path: PathBuf,

    /// Number of bytes of the device to map
    pub capacity: u64,

    /// Capacity of a single band (the maximum size of one file)
    pub band_size: u64,

    /// Create and size a regular backing file when the device is missing or short
    pub create_if_missing: bool,

    /// Write a fresh metadata table even if a valid one is present
    pub format: bool,

    // -------------------------------------------------------------------------
    // Host Services
    // -------------------------------------------------------------------------
    /// Directory reported to the host engine for its test files
    pub test_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("/dev/sdb"),
            capacity: 1024 * 1024 * 1024, // 1 GB
            band_size: 4 * 1024 * 1024,   // 4 MB
            create_if_missing: false,
            format: false,
            test_dir: None,
        }
    }
}

impl Config {
    /// Environment variable overriding `device_path`
    pub const ENV_DEVICE: &'static str = "BANDSTORE_DEVICE";
    /// Environment variable overriding `capacity` (bytes)
    pub const ENV_CAPACITY: &'static str = "BANDSTORE_CAPACITY";
    /// Environment variable overriding `band_size` (bytes)
    pub const ENV_BAND_SIZE: &'static str = "BANDSTORE_BAND_SIZE";
    /// Environment variable enabling `create_if_missing` ("1" or "true")
    pub const ENV_CREATE: &'static str = "BANDSTORE_CREATE";
    /// Environment variable overriding `test_dir`
    pub const ENV_TEST_DIR: &'static str = "BANDSTORE_TEST_DIR";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Defaults overlaid with any `BANDSTORE_*` environment variables
    ///
    /// Used by the process-wide environment, which has no caller to hand it
    /// a config.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(Self::ENV_DEVICE) {
            config.device_path = PathBuf::from(path);
        }
        if let Ok(raw) = std::env::var(Self::ENV_CAPACITY) {
            config.capacity = parse_bytes(Self::ENV_CAPACITY, &raw)?;
        }
        if let Ok(raw) = std::env::var(Self::ENV_BAND_SIZE) {
            config.band_size = parse_bytes(Self::ENV_BAND_SIZE, &raw)?;
        }
        if let Ok(raw) = std::env::var(Self::ENV_CREATE) {
            config.create_if_missing = matches!(raw.trim(), "1" | "true" | "yes");
        }
        if let Ok(dir) = std::env::var(Self::ENV_TEST_DIR) {
            config.test_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Check that the geometry can hold the header and at least one band
    pub fn validate(&self) -> Result<()> {
        if self.band_size == 0 {
            return Err(BandError::Config("band size must be non-zero".to_string()));
        }
        if usize::try_from(self.capacity).is_err() {
            return Err(BandError::Config(format!(
                "capacity {} does not fit in the address space",
                self.capacity
            )));
        }
        if Layout::for_geometry(self.capacity, self.band_size).slot_count == 0 {
            return Err(BandError::Config(format!(
                "capacity {} cannot hold a header and one band of {} bytes",
                self.capacity, self.band_size
            )));
        }
        Ok(())
    }
}

fn parse_bytes(var: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| BandError::Config(format!("{var} must be a byte count, got {raw:?}")))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the device path
    pub fn device_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.device_path = path.into();
        self
    }

    /// Set the mapped capacity (in bytes)
    pub fn capacity(mut self, bytes: u64) -> Self {
        self.config.capacity = bytes;
        self
    }

    /// Set the band size (in bytes)
    pub fn band_size(mut self, bytes: u64) -> Self {
        self.config.band_size = bytes;
        self
    }

    /// Allow creating a regular backing file
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// Force a fresh metadata table on open
    pub fn format(mut self, format: bool) -> Self {
        self.config.format = format;
        self
    }

    /// Set the directory reported for host engine tests
    pub fn test_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.test_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
