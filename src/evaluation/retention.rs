//! Retention window over retained chunks.

use std::collections::BTreeMap;

use crate::common::config::Properties;
use crate::common::error::{PrequelError, PrequelResult};
use crate::data::domain::ChunkId;
use crate::evaluation::domain::Tally;
use crate::store::domain::{ChunkRecord, ProjectState, Transaction};

pub const KEY_USE: &str = "limit.chunk.use";
pub const KEY_UPPER: &str = "limit.chunk.instance_upper_bound";
pub const KEY_LOWER: &str = "limit.chunk.instance_lower_bound";

pub const DEFAULT_UPPER: u64 = 2_000_000;
pub const DEFAULT_LOWER: u64 = 1_000_000;

/// Instance-count window enforced after each update.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetentionPolicy {
    pub enabled: bool,
    pub lower_bound: u64,
    pub upper_bound: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

impl RetentionPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            lower_bound: DEFAULT_LOWER,
            upper_bound: DEFAULT_UPPER,
        }
    }

    /// Enabled policy with checked bounds.
    pub fn window(lower_bound: u64, upper_bound: u64) -> PrequelResult<Self> {
        let policy = Self {
            enabled: true,
            lower_bound,
            upper_bound,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> PrequelResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.upper_bound == 0 {
            return Err(PrequelError::config(format!("{KEY_UPPER} must be positive")));
        }
        if self.lower_bound > self.upper_bound {
            return Err(PrequelError::config(format!(
                "{KEY_LOWER} ({}) exceeds {KEY_UPPER} ({})",
                self.lower_bound, self.upper_bound
            )));
        }
        Ok(())
    }

    /// Resolve the policy from `limit.chunk.*` properties.
    pub fn from_properties(props: &Properties) -> PrequelResult<Self> {
        let policy = Self {
            enabled: props.get_bool(KEY_USE, false)?,
            lower_bound: props.get_u64(KEY_LOWER, DEFAULT_LOWER)?,
            upper_bound: props.get_u64(KEY_UPPER, DEFAULT_UPPER)?,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn is_over(&self, instance_count: u64) -> bool {
        self.enabled && instance_count > self.upper_bound
    }
}

/// Evict oldest chunks into `tx` until the window settles at its floor.
///
/// `committed` is the state `tx` was begun on; chunks rewritten by `tx`
/// are read from `tx.put_chunks`. Returns the evicted ids, oldest first.
pub fn enforce(
    policy: &RetentionPolicy,
    committed: &ProjectState,
    tx: &mut Transaction,
) -> PrequelResult<Vec<ChunkId>> {
    let instance_count = tx.global.stats.instance_count;
    if !policy.is_over(instance_count) {
        return Ok(Vec::new());
    }
    tracing::info!(
        instance_count,
        upper_bound = policy.upper_bound,
        lower_bound = policy.lower_bound,
        "chunk limit triggered"
    );

    let rewritten: BTreeMap<ChunkId, &ChunkRecord> =
        tx.put_chunks.iter().map(|c| (c.id, c)).collect();
    let mut victims: Vec<(ChunkId, u64, Tally)> = Vec::new();
    let mut remaining = instance_count;
    for committed_chunk in committed.chunks.values() {
        if remaining <= policy.lower_bound {
            break;
        }
        let chunk = rewritten
            .get(&committed_chunk.id)
            .copied()
            .unwrap_or(committed_chunk);
        if !chunk.processed {
            return Err(PrequelError::invariant(format!(
                "chunk {} still has pending instances and cannot be evicted",
                chunk.id
            )));
        }
        remaining = remaining.saturating_sub(chunk.instance_count());
        victims.push((chunk.id, chunk.instance_count(), chunk.contribution.clone()));
    }

    let mut evicted = Vec::with_capacity(victims.len());
    for (id, count, contribution) in victims {
        tx.global.stats.remove_chunk(count, &contribution)?;
        tx.put_chunks.retain(|c| c.id != id);
        tx.delete_chunks.push(id);
        evicted.push(id);
    }
    tracing::info!(?evicted, instance_count = tx.global.stats.instance_count, "chunks evicted");
    Ok(evicted)
}
