//! Metadata table and band store
//!
//! One `RwLock<SlotState>` per slot. The lock owns both the slot's record in
//! the header and the slot's band, so all band access goes through the
//! guards handed out here.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use crate::device::{
    DeviceMapping, Layout, SlotRecord, Superblock, MAX_NAME_LEN, SLOT_RECORD_SIZE, SUPERBLOCK_SIZE,
};
use crate::error::{BandError, Result};

/// In-memory view of one slot
///
/// `size` is authoritative for how many band bytes belong to the file; the
/// record on the device is rewritten on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotState {
    pub exists: bool,
    pub name: String,
    pub size: usize,
}

/// The metadata table plus the bands it indexes
pub struct MetadataTable {
    device: Arc<DeviceMapping>,
    layout: Layout,
    slots: Vec<RwLock<SlotState>>,

    /// Slots ever allocated (high-water mark + 1). Only written under the
    /// allocator lock.
    allocated: AtomicUsize,
}

impl MetadataTable {
    /// Load the table from the device, or write a fresh one
    ///
    /// A fresh table is written when the device carries no intact superblock
    /// or when `format` is set. An intact superblock with a different
    /// geometry is refused rather than overwritten.
    pub(crate) fn open(device: Arc<DeviceMapping>, layout: Layout, format: bool) -> Result<Self> {
        let mut table = Self {
            device,
            layout,
            slots: (0..layout.slot_count)
                .map(|_| RwLock::new(SlotState::default()))
                .collect(),
            allocated: AtomicUsize::new(0),
        };

        let mut raw = vec![0u8; SUPERBLOCK_SIZE];
        // SAFETY: the table is under construction, no guard exists yet.
        unsafe { table.device.read_at(0, &mut raw)? };

        match Superblock::decode(&raw) {
            Some(block) if !format && !block.matches(&layout) => {
                return Err(BandError::Layout(format!(
                    "device was formatted with {} slots of {} bytes, configured for {} slots of {} bytes",
                    block.slot_count, block.band_size, layout.slot_count, layout.band_size
                )));
            }
            Some(block) if !format => table.load(block)?,
            _ => table.format()?,
        }

        Ok(table)
    }

    fn format(&mut self) -> Result<()> {
        for index in 0..self.layout.slot_count {
            let record = SlotRecord::free(index).encode()?;
            // SAFETY: exclusive access during construction.
            unsafe {
                self.device
                    .write_at(self.layout.record_offset(index), &record)?
            };
        }
        self.store_allocated(0)?;
        info!(
            slots = self.layout.slot_count,
            band_size = self.layout.band_size,
            "formatted metadata table"
        );
        Ok(())
    }

    fn load(&mut self, block: Superblock) -> Result<()> {
        let allocated = (block.allocated as usize).min(self.layout.slot_count);
        let band_len = self.layout.band_len();
        let mut live = 0usize;

        for index in 0..allocated {
            let mut raw = vec![0u8; SLOT_RECORD_SIZE];
            // SAFETY: exclusive access during construction.
            unsafe {
                self.device
                    .read_at(self.layout.record_offset(index), &mut raw)?
            };

            let state = match SlotRecord::decode(&raw) {
                Some(record)
                    if record.index == index as u64
                        && record.size as usize <= band_len
                        && record.name.len() <= MAX_NAME_LEN =>
                {
                    SlotState {
                        exists: record.exists,
                        name: record.name,
                        size: record.size as usize,
                    }
                }
                _ => {
                    warn!(slot = index, "corrupt slot record, treating slot as free");
                    SlotState::default()
                }
            };

            live += usize::from(state.exists);
            *self.slots[index].get_mut() = state;
        }

        self.allocated.store(allocated, Ordering::Release);
        info!(allocated, live, "loaded metadata table");
        Ok(())
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// N, the number of slots (and bands) on the device
    pub fn slot_count(&self) -> usize {
        self.layout.slot_count
    }

    /// Capacity of each band in bytes
    pub fn band_len(&self) -> usize {
        self.layout.band_len()
    }

    /// Greatest slot index ever allocated, `None` before the first allocation
    pub fn high_water_mark(&self) -> Option<usize> {
        self.allocated().checked_sub(1)
    }

    pub(crate) fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    /// Raise the high-water mark. Caller holds the allocator lock.
    pub(crate) fn store_allocated(&self, allocated: usize) -> Result<()> {
        let block = Superblock::new(&self.layout, allocated).encode()?;
        // SAFETY: the superblock is owned by the allocator lock.
        unsafe { self.device.write_at(0, &block)? };
        self.allocated.store(allocated, Ordering::Release);
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Exact-name scan over `0..=high_water_mark`
    pub fn find(&self, name: &str) -> Option<usize> {
        (0..self.allocated()).find(|&index| {
            let slot = self.slots[index].read();
            slot.exists && slot.name == name
        })
    }

    /// Names and sizes of every live file, in slot order
    pub fn live_files(&self) -> Vec<(String, usize)> {
        (0..self.allocated())
            .filter_map(|index| {
                let slot = self.slots[index].read();
                slot.exists.then(|| (slot.name.clone(), slot.size))
            })
            .collect()
    }

    /// Shared access to a slot and its band
    pub(crate) fn read_slot(&self, index: usize) -> Result<SlotReadGuard<'_>> {
        Ok(SlotReadGuard {
            table: self,
            index,
            state: self.lock_slot(index)?.read(),
        })
    }

    /// Exclusive access to a slot and its band
    pub(crate) fn write_slot(&self, index: usize) -> Result<SlotWriteGuard<'_>> {
        Ok(SlotWriteGuard {
            table: self,
            index,
            state: self.lock_slot(index)?.write(),
        })
    }

    fn lock_slot(&self, index: usize) -> Result<&RwLock<SlotState>> {
        self.slots.get(index).ok_or_else(|| {
            BandError::Layout(format!(
                "slot {index} out of range for {} slots",
                self.slots.len()
            ))
        })
    }
}

// =============================================================================
// Slot Guards
// =============================================================================

/// Read access to one slot; band reads are bounded by the slot's size
pub(crate) struct SlotReadGuard<'a> {
    table: &'a MetadataTable,
    index: usize,
    state: RwLockReadGuard<'a, SlotState>,
}

impl SlotReadGuard<'_> {
    /// Copy `[offset, offset + n)` of the file out of its band
    pub(crate) fn read(&self, offset: usize, n: usize) -> Result<Bytes> {
        read_band(self.table, self.index, &self.state, offset, n)
    }
}

impl Deref for SlotReadGuard<'_> {
    type Target = SlotState;

    fn deref(&self) -> &SlotState {
        &self.state
    }
}

/// Write access to one slot; every mutation is persisted before returning
pub(crate) struct SlotWriteGuard<'a> {
    table: &'a MetadataTable,
    index: usize,
    state: RwLockWriteGuard<'a, SlotState>,
}

impl SlotWriteGuard<'_> {
    /// Give the slot a new identity: whole band zeroed, size 0
    pub(crate) fn assign(&mut self, name: &str) -> Result<()> {
        let layout = self.table.layout;
        // SAFETY: the write guard owns this band.
        unsafe {
            self.table
                .device
                .zero(layout.band_offset(self.index), layout.band_len())?
        };
        self.state.exists = true;
        self.state.name = name.to_string();
        self.state.size = 0;
        self.persist()
    }

    /// Drop the file's content but keep its identity
    ///
    /// Bytes past `size` are already zero (established by `assign`), so only
    /// the live prefix needs clearing.
    pub(crate) fn truncate(&mut self) -> Result<()> {
        let offset = self.table.layout.band_offset(self.index);
        // SAFETY: the write guard owns this band.
        unsafe { self.table.device.zero(offset, self.state.size)? };
        self.state.size = 0;
        self.persist()
    }

    /// Write `data` at the current end of the file, returning the new size
    pub(crate) fn append(&mut self, data: &[u8]) -> Result<usize> {
        let band_len = self.table.band_len();
        let new_size = self
            .state
            .size
            .checked_add(data.len())
            .filter(|&end| end <= band_len)
            .ok_or_else(|| {
                BandError::CapacityExceeded(format!(
                    "appending {} bytes to '{}' ({} bytes) exceeds the {} byte band",
                    data.len(),
                    self.state.name,
                    self.state.size,
                    band_len
                ))
            })?;

        let offset = self.table.layout.band_offset(self.index) + self.state.size;
        // SAFETY: the write guard owns this band.
        unsafe { self.table.device.write_at(offset, data)? };
        self.state.size = new_size;
        self.persist()?;
        Ok(new_size)
    }

    fn persist(&self) -> Result<()> {
        let record = SlotRecord {
            exists: self.state.exists,
            index: self.index as u64,
            size: self.state.size as u64,
            name: self.state.name.clone(),
        }
        .encode()?;
        // SAFETY: the write guard owns this slot's record.
        unsafe {
            self.table
                .device
                .write_at(self.table.layout.record_offset(self.index), &record)
        }
    }
}

impl Deref for SlotWriteGuard<'_> {
    type Target = SlotState;

    fn deref(&self) -> &SlotState {
        &self.state
    }
}

fn read_band(
    table: &MetadataTable,
    index: usize,
    state: &SlotState,
    offset: usize,
    n: usize,
) -> Result<Bytes> {
    match offset.checked_add(n) {
        Some(end) if end <= state.size => {}
        _ => {
            return Err(BandError::io(
                state.name.clone(),
                format!(
                    "read of {n} bytes at offset {offset} exceeds file size {}",
                    state.size
                ),
            ))
        }
    }

    let mut buf = vec![0u8; n];
    // SAFETY: the caller's guard (shared or exclusive) owns this band.
    unsafe {
        table
            .device
            .read_at(table.layout.band_offset(index) + offset, &mut buf)?
    };
    Ok(Bytes::from(buf))
}
