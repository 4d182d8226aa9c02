//! Append writer

use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::table::MetadataTable;

use super::AppendWrite;

/// Appends to a file created or truncated by the allocator
///
/// Writes land directly in the shared mapping, so there is nothing to buffer:
/// `close`, `flush` and `sync` always succeed.
pub struct WritableFile {
    table: Arc<MetadataTable>,
    index: usize,
    name: String,
}

impl WritableFile {
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

impl AppendWrite for WritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        let size = self.table.write_slot(self.index)?.append(data)?;
        trace!(file = %self.name, bytes = data.len(), size, "append");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
