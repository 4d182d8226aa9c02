//! # bandstore
//!
//! A storage environment that lets an embedded key-value engine keep its
//! files on a raw block device:
//! - Fixed-capacity content regions ("bands"), one per metadata slot
//! - Name-to-band allocation with reuse of freed slots before growth
//! - File handles that alias the live table, never a private copy
//! - A single-worker FIFO queue for deferred host callbacks
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Host Engine                           │
//! └──────────────┬───────────────────────────────┬──────────────┘
//!                │ open / read / append          │ submit
//! ┌──────────────▼──────────────┐   ┌────────────▼─────────────┐
//! │          BandEnv            │   │        TaskQueue         │
//! │  (BandAllocator, handles)   │   │  (one worker, FIFO)      │
//! └──────────────┬──────────────┘   └──────────────────────────┘
//!                │
//! ┌──────────────▼──────────────┐
//! │       MetadataTable         │
//! │  (RwLock per slot + band)   │
//! └──────────────┬──────────────┘
//!                │
//! ┌──────────────▼──────────────┐
//! │       DeviceMapping         │
//! │   (MAP_SHARED raw device)   │
//! └─────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod device;
pub mod table;
pub mod file;
pub mod tasks;
pub mod env;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BandError, Result};
pub use config::Config;
pub use env::{BandEnv, Env};
pub use file::{AppendWrite, RandomRead, SequentialRead};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of bandstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
