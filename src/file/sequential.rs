//! Sequential reader

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{BandError, Result};
use crate::table::MetadataTable;

use super::SequentialRead;

/// Reads a file front to back through a cursor
pub struct SequentialFile {
    table: Arc<MetadataTable>,
    index: usize,
    name: String,
    cursor: usize,
}

impl SequentialFile {
    pub(crate) fn new(table: Arc<MetadataTable>, index: usize, name: &str) -> Self {
        Self {
            table,
            index,
            name: name.to_string(),
            cursor: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot backing this file
    pub fn slot(&self) -> usize {
        self.index
    }

    /// Current cursor position
    pub fn position(&self) -> u64 {
        self.cursor as u64
    }
}

impl SequentialRead for SequentialFile {
    fn read(&mut self, n: usize) -> Result<Bytes> {
        let slot = self.table.read_slot(self.index)?;
        let data = slot.read(self.cursor, n)?;
        self.cursor += n;
        Ok(data)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let slot = self.table.read_slot(self.index)?;
        match usize::try_from(n) {
            Ok(position) if position <= slot.size => {
                self.cursor = position;
                Ok(())
            }
            _ => Err(BandError::io(
                self.name.clone(),
                format!("cannot skip to {n}, file size is {}", slot.size),
            )),
        }
    }
}
