//! Update and Rebuild controllers.
//!
//! Both controllers only *plan*: they read committed state, run the
//! learner on a private copy and return a [`Transaction`] together with
//! the learner that becomes live once the transaction commits. Nothing
//! shared is touched until the caller commits.

use crate::common::error::{PrequelError, PrequelResult};
use crate::common::time;
use crate::data::domain::ChunkId;
use crate::evaluation::domain::{GenerationRecord, Tally};
use crate::evaluation::retention::{self, RetentionPolicy};
use crate::store::domain::{ProjectState, Transaction};

use super::domain::{Learner, LearnerKind};

/// Planned result of an update pass.
pub struct UpdatePlan {
    pub tx: Transaction,
    pub learner: Box<dyn Learner>,
    pub updated_chunks: Vec<ChunkId>,
    pub instance_count: u64,
    pub correct_count: u64,
    pub evicted_chunks: Vec<ChunkId>,
}

/// Planned result of a rebuild pass.
pub struct RebuildPlan {
    pub tx: Transaction,
    pub learner: Box<dyn Learner>,
    pub generation: GenerationRecord,
}

/// Score and train every pending instance, then apply the retention window.
///
/// Each instance is scored against `live` exactly as it was committed
/// before this call. Training goes to a fork of `live`.
pub fn plan_update(
    state: &ProjectState,
    live: &dyn Learner,
    policy: &RetentionPolicy,
) -> PrequelResult<UpdatePlan> {
    let pending: Vec<_> = state.chunks.values().filter(|c| !c.processed).collect();
    let pending_count: u64 = pending.iter().map(|c| c.pending_count()).sum();
    if pending_count == 0 {
        return Err(PrequelError::state("nothing to update"));
    }
    tracing::info!(
        chunks = pending.len(),
        instances = pending_count,
        "chunks found for update"
    );

    let mut tx = Transaction::begin(&state.global);
    let mut working = live.fork()?;
    let mut updated_chunks = Vec::with_capacity(pending.len());
    let mut total = Tally::default();

    for chunk in pending {
        let mut tally = Tally::default();
        for instance in &chunk.instances {
            let predicted = live.predict(&instance.features);
            tally.record(&instance.label, predicted.as_ref());
            working.train(instance);
        }

        let mut updated = chunk.clone();
        updated.processed = true;
        updated.initial_correct_count = tally.correct;
        updated.initial_accuracy = tally.accuracy();
        tx.global.stats.add_scored(&tally);
        total.merge(&tally);
        tracing::debug!(
            chunk_id = %updated.id,
            instances = tally.total,
            initial_accuracy = updated.initial_accuracy,
            "chunk updated"
        );
        updated.contribution = tally;
        updated_chunks.push(updated.id);
        tx.put_chunks.push(updated);
    }

    tx.learner = Some(working.snapshot()?);
    let evicted_chunks = retention::enforce(policy, state, &mut tx)?;

    Ok(UpdatePlan {
        tx,
        learner: working,
        updated_chunks,
        instance_count: total.total,
        correct_count: total.correct,
        evicted_chunks,
    })
}

/// Retrain a fresh `kind` learner over every processed retained instance.
///
/// Scoring counters are recomputed from zero, each instance scored by the
/// new learner as it stands at that point of the replay. Volumes and the
/// chunks' first-pass records stay as they are.
///
/// Pending chunks are not replayed; they keep waiting for the next update.
/// A window holding only pending instances is therefore a state error
/// ("nothing to rebuild") even though its retained volume is not zero.
pub fn plan_rebuild(state: &ProjectState, kind: LearnerKind) -> PrequelResult<RebuildPlan> {
    let processed: Vec<_> = state.chunks.values().filter(|c| c.processed).collect();
    let replay_count: u64 = processed.iter().map(|c| c.instance_count()).sum();
    if replay_count == 0 {
        return Err(PrequelError::state("nothing to rebuild"));
    }

    let before = state.global.stats.instance_accuracy();
    tracing::info!(
        chunks = processed.len(),
        instances = replay_count,
        before_instance_accuracy = before,
        "rebuild started"
    );

    let mut tx = Transaction::begin(&state.global);
    tx.global.stats.reset_scoring();
    let mut fresh = kind.build();

    for chunk in processed {
        let mut tally = Tally::default();
        for instance in &chunk.instances {
            let predicted = fresh.predict(&instance.features);
            tally.record(&instance.label, predicted.as_ref());
            fresh.train(instance);
        }
        tx.global.stats.add_scored(&tally);
        let mut rescored = chunk.clone();
        rescored.contribution = tally;
        tx.put_chunks.push(rescored);
    }

    let generation = GenerationRecord {
        id: tx.global.next_generation_id,
        datetime_ms: time::now_ms(),
        instance_count: replay_count,
        before_instance_accuracy: before,
        after_instance_accuracy: tx.global.stats.instance_accuracy(),
    };
    tx.global.next_generation_id += 1;
    tx.generation = Some(generation.clone());
    tx.learner = Some(fresh.snapshot()?);

    Ok(RebuildPlan {
        tx,
        learner: fresh,
        generation,
    })
}
