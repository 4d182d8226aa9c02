//! Random-access reader

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{BandError, Result};
use crate::table::MetadataTable;

use super::RandomRead;

/// Positional reads with no internal state
pub struct RandomAccessFile {
    table: Arc<MetadataTable>,
    index: usize,
    name: String,
}

impl RandomAccessFile {
    pub(crate) fn new(table: Arc<MetadataTable>, index: usize, name: &str) -> Self {
        Self {
            table,
            index,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> usize {
        self.index
    }

    /// Current logical size of the file
    pub fn size(&self) -> Result<u64> {
        Ok(self.table.read_slot(self.index)?.size as u64)
    }
}

impl RandomRead for RandomAccessFile {
    fn read_at(&self, offset: u64, n: usize) -> Result<Bytes> {
        let offset = usize::try_from(offset).map_err(|_| {
            BandError::io(self.name.clone(), format!("offset {offset} out of range"))
        })?;
        self.table.read_slot(self.index)?.read(offset, n)
    }
}
