//! Persisted project records and the Store capability.
//!
//! A [`Transaction`] carries every write of one engine operation. Stores
//! apply it whole or not at all, and each successful commit bumps the
//! global record's revision.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::error::{PrequelError, PrequelResult};
use crate::data::domain::{ChunkId, Instance};
use crate::evaluation::domain::{GenerationRecord, GlobalStats, Tally};
use crate::training::domain::LearnerSnapshot;

/// One accepted batch of instances.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub datetime_ms: u64,
    pub instances: Vec<Instance>,
    /// False while the instances wait for an update pass.
    pub processed: bool,
    /// First-pass prequential score, fixed once processed.
    pub initial_correct_count: u64,
    pub initial_accuracy: f64,
    /// What this chunk currently adds to the global scoring counters.
    pub contribution: Tally,
}

impl ChunkRecord {
    pub fn pending(id: ChunkId, datetime_ms: u64, instances: Vec<Instance>) -> Self {
        Self {
            id,
            datetime_ms,
            instances,
            processed: false,
            initial_correct_count: 0,
            initial_accuracy: 0.0,
            contribution: Tally::default(),
        }
    }

    pub fn instance_count(&self) -> u64 {
        self.instances.len() as u64
    }

    pub fn pending_count(&self) -> u64 {
        if self.processed {
            0
        } else {
            self.instance_count()
        }
    }
}

/// Project-wide versioned record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalRecord {
    pub revision: u64,
    /// Next id to issue. Never decreases, eviction included.
    pub next_chunk_id: ChunkId,
    pub next_generation_id: u64,
    pub stats: GlobalStats,
}

impl Default for GlobalRecord {
    fn default() -> Self {
        Self {
            revision: 0,
            next_chunk_id: ChunkId(1),
            next_generation_id: 1,
            stats: GlobalStats::default(),
        }
    }
}

/// Everything a store keeps for one project.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub global: GlobalRecord,
    pub chunks: BTreeMap<ChunkId, ChunkRecord>,
    pub learner: Option<LearnerSnapshot>,
    pub generations: Vec<GenerationRecord>,
}

/// Writes of one operation, applied atomically.
#[derive(Clone, Debug)]
pub struct Transaction {
    /// Revision the writer read; a mismatch means a concurrent writer won.
    pub base_revision: u64,
    pub global: GlobalRecord,
    pub put_chunks: Vec<ChunkRecord>,
    pub delete_chunks: Vec<ChunkId>,
    pub learner: Option<LearnerSnapshot>,
    pub generation: Option<GenerationRecord>,
}

impl Transaction {
    /// Start a transaction on top of the committed global record.
    pub fn begin(global: &GlobalRecord) -> Self {
        Self {
            base_revision: global.revision,
            global: global.clone(),
            put_chunks: Vec::new(),
            delete_chunks: Vec::new(),
            learner: None,
            generation: None,
        }
    }
}

/// Prior values of everything a transaction touched.
#[derive(Debug)]
pub struct Undo {
    global: GlobalRecord,
    chunks: Vec<(ChunkId, Option<ChunkRecord>)>,
    learner: Option<Option<LearnerSnapshot>>,
    generations_len: usize,
}

impl ProjectState {
    /// Apply `tx` in place. Validation happens before any mutation.
    pub fn apply(&mut self, tx: Transaction) -> PrequelResult<Undo> {
        if tx.base_revision != self.global.revision {
            return Err(PrequelError::store(format!(
                "stale transaction: based on revision {}, committed is {}",
                tx.base_revision, self.global.revision
            )));
        }
        for id in &tx.delete_chunks {
            if !self.chunks.contains_key(id) {
                return Err(PrequelError::store(format!("chunk {id} does not exist")));
            }
        }
        for chunk in &tx.put_chunks {
            if chunk.id >= tx.global.next_chunk_id {
                return Err(PrequelError::store(format!(
                    "chunk {} was never issued (next id {})",
                    chunk.id, tx.global.next_chunk_id
                )));
            }
        }
        if tx.global.next_chunk_id < self.global.next_chunk_id {
            return Err(PrequelError::store("next chunk id cannot move backwards"));
        }

        let mut undo = Undo {
            global: self.global.clone(),
            chunks: Vec::new(),
            learner: None,
            generations_len: self.generations.len(),
        };

        for chunk in tx.put_chunks {
            let previous = self.chunks.insert(chunk.id, chunk.clone());
            undo.chunks.push((chunk.id, previous));
        }
        for id in tx.delete_chunks {
            let previous = self.chunks.remove(&id);
            undo.chunks.push((id, previous));
        }
        if let Some(learner) = tx.learner {
            undo.learner = Some(self.learner.replace(learner));
        }
        if let Some(generation) = tx.generation {
            self.generations.push(generation);
        }
        self.global = tx.global;
        self.global.revision = undo.global.revision + 1;
        Ok(undo)
    }

    /// Roll back a transaction applied by [`ProjectState::apply`].
    pub fn revert(&mut self, undo: Undo) {
        for (id, previous) in undo.chunks.into_iter().rev() {
            match previous {
                Some(chunk) => {
                    self.chunks.insert(id, chunk);
                }
                None => {
                    self.chunks.remove(&id);
                }
            }
        }
        if let Some(learner) = undo.learner {
            self.learner = learner;
        }
        self.generations.truncate(undo.generations_len);
        self.global = undo.global;
    }
}

/// Transactional record store for one project.
pub trait Store: Send + Sync {
    /// Committed state. Never reflects a transaction that failed.
    fn state(&self) -> &ProjectState;

    /// Apply every write of `tx` or none of them.
    fn commit(&mut self, tx: Transaction) -> PrequelResult<()>;

    fn global(&self) -> &GlobalRecord {
        &self.state().global
    }

    fn chunk(&self, id: ChunkId) -> Option<&ChunkRecord> {
        self.state().chunks.get(&id)
    }

    /// Retained chunks, oldest first.
    fn chunks(&self) -> Box<dyn Iterator<Item = &ChunkRecord> + '_> {
        Box::new(self.state().chunks.values())
    }

    fn learner(&self) -> Option<&LearnerSnapshot> {
        self.state().learner.as_ref()
    }

    fn generations(&self) -> &[GenerationRecord] {
        &self.state().generations
    }
}
