//! Band Allocator
//!
//! Resolves file names to slots.
//!
//! ## Write Resolution (single pass over `0..=high_water_mark`)
//! ```text
//!   exact name match ──────────► truncate in place
//!        │ none
//!   lowest free slot ──────────► zero band, assign name
//!        │ none
//!   high_water_mark + 1 < N ───► grow, assign name
//!        │ otherwise
//!   CapacityExceeded
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::device::MAX_NAME_LEN;
use crate::error::{BandError, Result};

use super::MetadataTable;

/// Maps file names to slots of a [`MetadataTable`]
///
/// ## Concurrency:
/// - `resolve_for_write`: serialised by `lock`, which covers the scan and the
///   identity assignment that follows it
/// - `resolve_for_read` / `exists`: lock-free scans (per-slot read locks only)
pub struct BandAllocator {
    table: Arc<MetadataTable>,

    /// Guards allocation decisions and the superblock
    lock: Mutex<()>,
}

/// Which branch of write resolution produced a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The name already existed; its content was truncated
    Truncated(usize),
    /// A previously freed slot was reused
    Reused(usize),
    /// The high-water mark was raised
    Grown(usize),
}

impl Resolution {
    pub fn index(self) -> usize {
        match self {
            Self::Truncated(index) | Self::Reused(index) | Self::Grown(index) => index,
        }
    }
}

impl BandAllocator {
    pub fn new(table: Arc<MetadataTable>) -> Self {
        Self {
            table,
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn table(&self) -> &Arc<MetadataTable> {
        &self.table
    }

    /// First live slot whose name equals `name` exactly
    pub fn resolve_for_read(&self, name: &str) -> Result<usize> {
        self.table
            .find(name)
            .ok_or_else(|| BandError::NotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.table.find(name).is_some()
    }

    /// Slot to write `name` into, truncated to zero length
    pub fn resolve_for_write(&self, name: &str) -> Result<usize> {
        self.resolve(name).map(Resolution::index)
    }

    /// Same as [`BandAllocator::resolve_for_write`], reporting which branch was taken
    pub fn resolve(&self, name: &str) -> Result<Resolution> {
        validate_name(name)?;

        let _guard = self.lock.lock();
        let allocated = self.table.allocated();

        let mut exact = None;
        let mut lowest_free = None;
        for index in 0..allocated {
            let slot = self.table.read_slot(index)?;
            if !slot.exists {
                lowest_free.get_or_insert(index);
            } else if slot.name == name {
                exact = Some(index);
                break;
            }
        }

        let resolution = match (exact, lowest_free) {
            (Some(index), _) => {
                self.table.write_slot(index)?.truncate()?;
                Resolution::Truncated(index)
            }
            (None, Some(index)) => {
                self.table.write_slot(index)?.assign(name)?;
                Resolution::Reused(index)
            }
            (None, None) if allocated < self.table.slot_count() => {
                self.table.write_slot(allocated)?.assign(name)?;
                self.table.store_allocated(allocated + 1)?;
                Resolution::Grown(allocated)
            }
            (None, None) => {
                return Err(BandError::CapacityExceeded(format!(
                    "all {} slots are in use, cannot create '{}'",
                    self.table.slot_count(),
                    name
                )));
            }
        };

        debug!(file = name, ?resolution, "resolved for write");
        Ok(resolution)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BandError::InvalidName("empty name".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(BandError::InvalidName(format!(
            "'{}' is {} bytes, the limit is {}",
            name,
            name.len(),
            MAX_NAME_LEN
        )));
    }
    Ok(())
}
