//! On-device layout
//!
//! Geometry (where the header ends, where each band starts) and the binary
//! encoding of the superblock and slot records.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::{BandError, Result};

// =============================================================================
// Format Constants
// =============================================================================

/// Magic bytes identifying a bandstore device
pub const MAGIC: &[u8; 4] = b"BAND";

/// Current on-device format version
pub const FORMAT_VERSION: u16 = 1;

/// Bytes reserved for the superblock at offset 0
pub const SUPERBLOCK_SIZE: usize = 64;

/// Bytes reserved for each slot record
pub const SLOT_RECORD_SIZE: usize = 256;

/// Longest file name a slot record can hold (in bytes)
pub const MAX_NAME_LEN: usize = 200;

/// Bands start on this boundary
pub const BAND_ALIGN: u64 = 4096;

/// CRC32 trailer appended after each encoded structure
const CRC_SIZE: usize = 4;

// =============================================================================
// Geometry
// =============================================================================

/// Derived device geometry
///
/// ```text
/// ┌──────────────────────────────────────────────┐ 0
/// │ Superblock (64)                              │
/// ├──────────────────────────────────────────────┤
/// │ Slot records: slot_count × 256               │
/// ├──────────────────────────────────────────────┤
/// │ Padding up to a 4 KiB boundary               │
/// ├──────────────────────────────────────────────┤ bands_offset
/// │ Band 0 (band_size)                           │
/// │ Band 1 (band_size)                           │
/// │ ...                                          │
/// └──────────────────────────────────────────────┘ <= capacity
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub capacity: u64,
    pub band_size: u64,
    pub slot_count: usize,
    pub bands_offset: u64,
}

impl Layout {
    /// Largest slot count whose header and bands fit in `capacity`
    pub fn for_geometry(capacity: u64, band_size: u64) -> Self {
        let mut slot_count = match band_size.checked_add(SLOT_RECORD_SIZE as u64) {
            Some(per_slot) if band_size > 0 => capacity / per_slot,
            _ => 0,
        };

        // The estimate ignores the superblock and alignment padding, so it can
        // only be too large.
        while slot_count > 0 && !Self::fits(capacity, band_size, slot_count) {
            slot_count -= 1;
        }

        let slot_count = usize::try_from(slot_count).unwrap_or(0);
        Self {
            capacity,
            band_size,
            slot_count,
            bands_offset: Self::header_end(slot_count as u64).unwrap_or(u64::MAX),
        }
    }

    /// Smallest capacity holding exactly `slot_count` bands of `band_size`
    ///
    /// Saturates at `u64::MAX` when no such capacity exists.
    pub fn capacity_for(slot_count: usize, band_size: u64) -> u64 {
        let slots = slot_count as u64;
        Self::header_end(slots)
            .and_then(|end| end.checked_add(slots.checked_mul(band_size)?))
            .unwrap_or(u64::MAX)
    }

    /// Byte offset of a slot's record inside the header
    pub fn record_offset(&self, index: usize) -> usize {
        SUPERBLOCK_SIZE + index * SLOT_RECORD_SIZE
    }

    /// Byte offset of a slot's band
    pub fn band_offset(&self, index: usize) -> usize {
        (self.bands_offset + index as u64 * self.band_size) as usize
    }

    /// Capacity of one band in bytes
    pub fn band_len(&self) -> usize {
        self.band_size as usize
    }

    fn header_end(slot_count: u64) -> Option<u64> {
        let raw = (SLOT_RECORD_SIZE as u64)
            .checked_mul(slot_count)?
            .checked_add(SUPERBLOCK_SIZE as u64)?;
        raw.checked_add(BAND_ALIGN - 1).map(|v| v / BAND_ALIGN * BAND_ALIGN)
    }

    fn fits(capacity: u64, band_size: u64, slot_count: u64) -> bool {
        Self::header_end(slot_count)
            .and_then(|end| end.checked_add(band_size.checked_mul(slot_count)?))
            .map_or(false, |total| total <= capacity)
    }
}

// =============================================================================
// Encoded Structures
// =============================================================================

/// Device header: identifies the format and records the high-water mark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub magic: [u8; 4],
    pub version: u16,
    pub band_size: u64,
    pub slot_count: u64,
    /// Number of slots ever allocated (high-water mark + 1)
    pub allocated: u64,
}

impl Superblock {
    pub fn new(layout: &Layout, allocated: usize) -> Self {
        Self {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            band_size: layout.band_size,
            slot_count: layout.slot_count as u64,
            allocated: allocated as u64,
        }
    }

    /// Whether this header describes the same geometry as `layout`
    pub fn matches(&self, layout: &Layout) -> bool {
        self.band_size == layout.band_size && self.slot_count == layout.slot_count as u64
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_checked(self, SUPERBLOCK_SIZE)
    }

    /// Returns `None` for anything that is not an intact superblock
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let block: Self = decode_checked(bytes)?;
        (&block.magic == MAGIC && block.version == FORMAT_VERSION).then_some(block)
    }
}

/// Persistent form of one metadata slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub exists: bool,
    pub index: u64,
    pub size: u64,
    pub name: String,
}

impl SlotRecord {
    pub fn free(index: usize) -> Self {
        Self {
            exists: false,
            index: index as u64,
            size: 0,
            name: String::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_checked(self, SLOT_RECORD_SIZE)
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        decode_checked(bytes)
    }
}

fn codec() -> impl Options {
    bincode::options()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(SLOT_RECORD_SIZE as u64)
        .allow_trailing_bytes()
}

/// Encode `value` followed by its CRC32, zero-padded to `width` bytes
fn encode_checked<T: Serialize>(value: &T, width: usize) -> Result<Vec<u8>> {
    let mut out = codec()
        .serialize(value)
        .map_err(|e| BandError::Layout(format!("failed to encode record: {e}")))?;
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    if out.len() > width {
        return Err(BandError::Layout(format!(
            "encoded record of {} bytes exceeds its {} byte field",
            out.len(),
            width
        )));
    }
    out.resize(width, 0);
    Ok(out)
}

fn decode_checked<T: Serialize + for<'de> Deserialize<'de>>(bytes: &[u8]) -> Option<T> {
    let value: T = codec().deserialize(bytes).ok()?;
    let len = codec().serialized_size(&value).ok()? as usize;
    let trailer = bytes.get(len..len + CRC_SIZE)?;
    let stored = u32::from_le_bytes(trailer.try_into().ok()?);
    (crc32fast::hash(&bytes[..len]) == stored).then_some(value)
}
