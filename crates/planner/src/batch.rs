//! Slices a record sequence into fixed-size, numbered batches.

use model::records::{
    batch::{Batch, BatchKey, PlannedRecord},
    record::Record,
};
use std::num::NonZeroUsize;

#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
    batch_size: NonZeroUsize,
}

impl BatchPlanner {
    pub fn new(batch_size: NonZeroUsize) -> Self {
        Self { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// `ceil(records / batch_size)`
    pub fn batch_count(&self, records: usize) -> usize {
        records.div_ceil(self.batch_size.get())
    }

    /// Plans the records of one source file.
    ///
    /// Batch numbers start at 1 and follow input order. Each record gets the
    /// global offset `(batch_number - 1) * batch_size + index_within_batch`,
    /// which only depends on its position in the input.
    pub fn plan(
        &self,
        file_index: usize,
        table_name: &str,
        source_file: &str,
        records: Vec<Record>,
    ) -> Vec<Batch> {
        let size = self.batch_size.get();
        let mut batches = Vec::with_capacity(self.batch_count(records.len()));
        let mut current: Vec<PlannedRecord> = Vec::with_capacity(size.min(records.len()));

        for (offset, record) in records.into_iter().enumerate() {
            current.push(PlannedRecord {
                offset: offset as u64,
                record,
            });

            if current.len() == size {
                let chunk = std::mem::replace(&mut current, Vec::with_capacity(size));
                batches.push(self.make_batch(file_index, batches.len(), table_name, source_file, chunk));
            }
        }

        if !current.is_empty() {
            batches.push(self.make_batch(file_index, batches.len(), table_name, source_file, current));
        }

        batches
    }

    fn make_batch(
        &self,
        file_index: usize,
        planned_so_far: usize,
        table_name: &str,
        source_file: &str,
        records: Vec<PlannedRecord>,
    ) -> Batch {
        Batch {
            key: BatchKey {
                file_index,
                batch_number: planned_so_far as u64 + 1,
            },
            table_name: table_name.to_string(),
            source_file: source_file.to_string(),
            records,
        }
    }
}
