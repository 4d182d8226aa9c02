//! Device mapping
//!
//! Maps the configured capacity of the device into the process with
//! `MAP_SHARED`, so stores land directly in the device's page cache.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use fs2::FileExt;
use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, info, warn};

use crate::error::{BandError, Result};

/// Exclusive, process-lifetime mapping of a raw device
///
/// The mapping itself performs no locking. Every byte range is owned by
/// exactly one lock in the metadata table (the superblock by the allocator
/// lock, each slot record and band by that slot's lock), and the `unsafe`
/// accessors below require the caller to hold it.
pub struct DeviceMapping {
    path: PathBuf,
    map: MmapMut,
    base: NonNull<u8>,
    len: usize,
    /// Holds the exclusive lock; dropped after the mapping
    _file: File,
}

// SAFETY: `base` points into `map`, which lives as long as `self` and is never
// remapped. Concurrent access to disjoint ranges is sound; access to the same
// range is serialised by the table's locks (see the accessor contracts).
unsafe impl Send for DeviceMapping {}
unsafe impl Sync for DeviceMapping {}

impl DeviceMapping {
    /// Open `path` and map its first `capacity` bytes
    ///
    /// With `create` set, a missing or short regular file is created and
    /// extended; block devices are never resized. The device stays locked
    /// against other opens until the mapping is dropped.
    pub fn open(path: &Path, capacity: u64, create: bool) -> Result<Self> {
        let len = usize::try_from(capacity)
            .map_err(|_| BandError::device(path, "capacity exceeds the address space"))?;
        if len == 0 {
            return Err(BandError::device(path, "capacity must be non-zero"));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .open(path)
            .map_err(|e| BandError::device(path, e))?;

        // One owner per device: a second environment over the same bands would
        // hand out the same slots under different names.
        file.try_lock_exclusive()
            .map_err(|e| BandError::device(path, format!("device is already in use: {e}")))?;

        let is_regular = file
            .metadata()
            .map_err(|e| BandError::device(path, e))?
            .is_file();

        // Block devices report a zero length in their metadata; seeking to the
        // end gives the real size for both devices and files.
        let mut available = file
            .seek(SeekFrom::End(0))
            .map_err(|e| BandError::device(path, e))?;

        if available < capacity && create && is_regular {
            debug!(path = %path.display(), from = available, to = capacity, "extending backing file");
            file.set_len(capacity)
                .map_err(|e| BandError::device(path, e))?;
            available = capacity;
        }

        if available < capacity {
            return Err(BandError::device(
                path,
                format!("device holds {available} bytes, {capacity} requested"),
            ));
        }

        // SAFETY: the file is opened read/write and nothing else in this
        // process maps it. Another process writing the same device is outside
        // the supported model, the same restriction any raw-device store has.
        let mut map = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(|e| BandError::device(path, e))?;

        let base = NonNull::new(map.as_mut_ptr())
            .ok_or_else(|| BandError::device(path, "mapping returned a null address"))?;

        info!(path = %path.display(), bytes = len, "device mapped");

        Ok(Self {
            path: path.to_path_buf(),
            map,
            base,
            len,
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write all dirty pages back to the device
    pub fn flush(&self) -> Result<()> {
        self.map
            .flush()
            .map_err(|e| BandError::io(self.path.display().to_string(), e.to_string()))
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`
    ///
    /// # Safety
    /// The caller must hold the lock owning `[offset, offset + buf.len())`,
    /// shared or exclusive.
    pub(crate) unsafe fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len())?;
        std::ptr::copy_nonoverlapping(
            self.base.as_ptr().add(offset),
            buf.as_mut_ptr(),
            buf.len(),
        );
        Ok(())
    }

    /// Copy `data` into the mapping at `offset`
    ///
    /// # Safety
    /// The caller must hold the lock owning `[offset, offset + data.len())`
    /// exclusively.
    pub(crate) unsafe fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len())?;
        std::ptr::copy_nonoverlapping(data.as_ptr(), self.base.as_ptr().add(offset), data.len());
        Ok(())
    }

    /// Zero `len` bytes starting at `offset`
    ///
    /// # Safety
    /// Same contract as [`DeviceMapping::write_at`].
    pub(crate) unsafe fn zero(&self, offset: usize, len: usize) -> Result<()> {
        self.check_range(offset, len)?;
        std::ptr::write_bytes(self.base.as_ptr().add(offset), 0, len);
        Ok(())
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(BandError::Layout(format!(
                "range {offset}+{len} outside the {} byte mapping of {}",
                self.len,
                self.path.display()
            ))),
        }
    }
}

impl Drop for DeviceMapping {
    fn drop(&mut self) {
        if let Err(e) = self.map.flush() {
            warn!(path = %self.path.display(), error = %e, "flush on unmap failed");
        }
        info!(path = %self.path.display(), "device unmapped");
    }
}
