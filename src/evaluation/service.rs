//! Read-only diagnostics over committed project state.
//!
//! Verification code goes through [`Diagnostics`] instead of reaching into
//! engine internals.

use crate::common::error::{PrequelError, PrequelResult};
use crate::data::domain::ChunkId;
use crate::store::domain::{ChunkRecord, ProjectState};
use crate::training::domain::Learner;

use super::domain::{GenerationRecord, GlobalStats, Tally};

/// Borrowed view of one committed state and the learner committed with it.
#[derive(Clone, Copy)]
pub struct Diagnostics<'a> {
    state: &'a ProjectState,
    learner: &'a dyn Learner,
}

impl<'a> Diagnostics<'a> {
    pub fn new(state: &'a ProjectState, learner: &'a dyn Learner) -> Self {
        Self { state, learner }
    }

    pub fn global(&self) -> &'a GlobalStats {
        &self.state.global.stats
    }

    pub fn chunk(&self, id: ChunkId) -> Option<&'a ChunkRecord> {
        self.state.chunks.get(&id)
    }

    /// Highest id ever issued, retained or not.
    pub fn last_chunk_id(&self) -> Option<ChunkId> {
        match self.state.global.next_chunk_id.raw() {
            0 | 1 => None,
            next => Some(ChunkId(next - 1)),
        }
    }

    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.state.chunks.keys().copied().collect()
    }

    /// First-pass accuracies of processed chunks, in id order.
    pub fn initial_accuracies(&self) -> Vec<f64> {
        self.state
            .chunks
            .values()
            .filter(|c| c.processed)
            .map(|c| c.initial_accuracy)
            .collect()
    }

    pub fn pending_instance_count(&self) -> u64 {
        self.state.chunks.values().map(|c| c.pending_count()).sum()
    }

    pub fn generations(&self) -> &'a [GenerationRecord] {
        &self.state.generations
    }

    /// Cross-check the stored counters against the chunk records.
    pub fn verify(&self) -> PrequelResult<()> {
        let stats = self.global();
        let mut volume = 0u64;
        let mut processed = 0u64;
        let mut scored = Tally::default();
        for chunk in self.state.chunks.values() {
            if chunk.id >= self.state.global.next_chunk_id {
                return fail(format!("chunk {} was never issued", chunk.id));
            }
            volume += chunk.instance_count();
            if chunk.processed {
                processed += chunk.instance_count();
                if chunk.contribution.total != chunk.instance_count() {
                    return fail(format!("chunk {} contribution does not cover its instances", chunk.id));
                }
            } else if chunk.contribution.total != 0 {
                return fail(format!("pending chunk {} carries a contribution", chunk.id));
            }
            scored.merge(&chunk.contribution);
        }

        if stats.instance_count != volume {
            return fail(format!(
                "instance_count {} != retained instances {volume}",
                stats.instance_count
            ));
        }
        if stats.updated_instance_count != processed {
            return fail(format!(
                "updated_instance_count {} != processed instances {processed}",
                stats.updated_instance_count
            ));
        }
        if stats.updated_instance_count > stats.instance_count {
            return fail("more updated instances than retained ones");
        }
        if stats.instance_correct_count != scored.correct {
            return fail(format!(
                "instance_correct_count {} != chunk contributions {}",
                stats.instance_correct_count, scored.correct
            ));
        }
        if stats.confusion.total() != stats.updated_instance_count {
            return fail("confusion matrix total differs from updated_instance_count");
        }
        if stats.confusion.correct() != stats.instance_correct_count {
            return fail("confusion matrix diagonal differs from instance_correct_count");
        }
        if stats.confusion != scored.confusion {
            return fail("confusion matrix differs from chunk contributions");
        }
        Ok(())
    }

    /// Post-hoc sweep: how many retained processed instances the current
    /// model labels correctly. Differs from prequential accuracy.
    pub fn recount_with_current_model(&self) -> u64 {
        self.state
            .chunks
            .values()
            .filter(|c| c.processed)
            .flat_map(|c| c.instances.iter())
            .filter(|i| self.learner.predict(&i.features).as_ref() == Some(&i.label))
            .count() as u64
    }
}

fn fail(msg: impl Into<String>) -> PrequelResult<()> {
    Err(PrequelError::invariant(msg))
}
