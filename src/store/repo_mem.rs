//! In-memory store. State lives as long as the engine does.

use crate::common::error::PrequelResult;

use super::domain::{ProjectState, Store, Transaction};

#[derive(Debug, Default)]
pub struct MemStore {
    state: ProjectState,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state, e.g. one loaded elsewhere.
    pub fn with_state(state: ProjectState) -> Self {
        Self { state }
    }
}

impl Store for MemStore {
    fn state(&self) -> &ProjectState {
        &self.state
    }

    fn commit(&mut self, tx: Transaction) -> PrequelResult<()> {
        self.state.apply(tx)?;
        Ok(())
    }
}
