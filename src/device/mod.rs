//! Device Module
//!
//! Raw device access and the on-device format.
//!
//! ## Responsibilities
//! - Open the device and map its fixed capacity into the process
//! - Derive the slot count from capacity and band size
//! - Encode and decode the superblock and slot records
//!
//! ## Device Format
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header                                 │
//! │ ┌──────────┬──────────┬──────────────┐ │
//! │ │Magic (4) │Version(2)│ Geometry,    │ │
//! │ │          │          │ High-water   │ │
//! │ └──────────┴──────────┴──────────────┘ │
//! │ Slot records (exists, index, size,     │
//! │               name, CRC32) × N         │
//! ├────────────────────────────────────────┤
//! │ Band 0                                 │
//! ├────────────────────────────────────────┤
//! │ ... (N bands, one per slot)            │
//! └────────────────────────────────────────┘
//! ```

mod layout;
mod mapping;

pub use layout::{
    Layout, SlotRecord, Superblock, BAND_ALIGN, FORMAT_VERSION, MAGIC, MAX_NAME_LEN,
    SLOT_RECORD_SIZE, SUPERBLOCK_SIZE,
};
pub use mapping::DeviceMapping;
