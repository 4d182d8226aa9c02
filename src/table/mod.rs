//! Table Module
//!
//! The metadata table, the bands it indexes, and the allocator that maps
//! file names onto them.
//!
//! ## Responsibilities
//! - Hold one slot (exists, name, size, index) per band
//! - Keep at most one live slot per name
//! - Track the high-water mark (never decreases)
//! - Clear band content whenever a slot changes identity
//!
//! ## Locking
//! ```text
//!   BandAllocator::lock ── allocation decisions, superblock
//!   RwLock<SlotState> ──── one per slot: record + band bytes
//! ```
//! The allocator lock is always taken before any slot lock, never after.

mod allocator;
mod metadata;

pub use allocator::{BandAllocator, Resolution};
pub use metadata::{MetadataTable, SlotState};
