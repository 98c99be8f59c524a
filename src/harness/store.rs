//! Finished results, keyed by their 1-based position in the batch.

use std::collections::BTreeMap;

use super::{ExecutionResult, HarnessError};

#[derive(Debug, Default)]
pub struct ResultStore {
    results: BTreeMap<usize, ExecutionResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze `result` into the store. Ids are write-once.
    pub fn commit(&mut self, result: ExecutionResult) -> Result<&ExecutionResult, HarnessError> {
        use std::collections::btree_map::Entry;

        match self.results.entry(result.id) {
            Entry::Occupied(_) => Err(HarnessError::DuplicateResult(result.id)),
            Entry::Vacant(slot) => Ok(&*slot.insert(result)),
        }
    }

    pub fn get(&self, id: usize) -> Option<&ExecutionResult> {
        self.results.get(&id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results.values()
    }

    pub fn into_results(self) -> Vec<ExecutionResult> {
        self.results.into_values().collect()
    }
}
