//! File Module
//!
//! File-like views over a slot and its band.
//!
//! ## Aliasing
//! Handles hold the shared table and a slot index, never a copy of the
//! slot. Every operation locks the live slot, so an append through one
//! handle is visible to every other handle on the same file immediately.
//!
//! ```text
//!   SequentialFile ─┐
//!   RandomAccessFile├──► Arc<MetadataTable> ──► slot[i] ──► band[i]
//!   WritableFile ───┘
//! ```

mod random;
mod sequential;
mod writable;

use bytes::Bytes;

use crate::error::Result;

pub use random::RandomAccessFile;
pub use sequential::SequentialFile;
pub use writable::WritableFile;

/// Cursor-based reads from the start of a file
pub trait SequentialRead: Send {
    /// Read exactly `n` bytes at the cursor and advance it
    ///
    /// Fails rather than returning a short read when fewer than `n` bytes
    /// remain.
    fn read(&mut self, n: usize) -> Result<Bytes>;

    /// Move the cursor to the absolute position `n`
    fn skip(&mut self, n: u64) -> Result<()>;
}

/// Positional reads
pub trait RandomRead: Send + Sync {
    /// Read exactly `n` bytes starting at `offset`
    fn read_at(&self, offset: u64, n: usize) -> Result<Bytes>;
}

/// Appends at the current end of a file
pub trait AppendWrite: Send {
    fn append(&mut self, data: &[u8]) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn sync(&mut self) -> Result<()>;
}
