use crate::records::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Planning-order position of a batch within a run. Files are planned in
/// order, so `(file_index, batch_number)` sorts batches the way they were submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    pub file_index: usize,
    pub batch_number: u64,
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file_index, self.batch_number)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRecord {
    pub offset: u64, // global offset within the source file
    pub record: Record,
}

/// Ordered, non-empty slice of records inserted in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub key: BatchKey,
    pub table_name: String,
    pub source_file: String,
    pub records: Vec<PlannedRecord>,
}

impl Batch {
    pub fn batch_number(&self) -> u64 {
        self.key.batch_number
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_offset(&self) -> Option<u64> {
        self.records.first().map(|r| r.offset)
    }
}
