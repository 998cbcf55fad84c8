//! Domain types for the pluggable learner.
//!
//! The engine only ever talks to a [`Learner`]; concrete algorithms live
//! next to this module and are picked by [`LearnerKind`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::error::{PrequelError, PrequelResult};
use crate::data::domain::{FeatureMap, Instance, Label};

use super::majority::MajorityClass;
use super::naive_bayes::NaiveBayes;

/// Supported learner algorithms.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    NaiveBayes,
    Majority,
}

impl Default for LearnerKind {
    fn default() -> Self {
        LearnerKind::NaiveBayes
    }
}

impl LearnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearnerKind::NaiveBayes => "naive_bayes",
            LearnerKind::Majority => "majority",
        }
    }

    /// Fresh, untrained learner of this kind.
    pub fn build(&self) -> Box<dyn Learner> {
        match self {
            LearnerKind::NaiveBayes => Box::new(NaiveBayes::new()),
            LearnerKind::Majority => Box::new(MajorityClass::new()),
        }
    }
}

impl FromStr for LearnerKind {
    type Err = PrequelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "naive_bayes" => Ok(LearnerKind::NaiveBayes),
            "majority" => Ok(LearnerKind::Majority),
            other => Err(PrequelError::config(format!("unknown learner kind: {other}"))),
        }
    }
}

impl fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized learner state, tagged with the algorithm that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearnerSnapshot {
    pub kind: LearnerKind,
    pub state: serde_json::Value,
}

/// Online classifier capability.
pub trait Learner: Send + Sync {
    fn kind(&self) -> LearnerKind;

    /// Online update with one labeled instance.
    fn train(&mut self, instance: &Instance);

    /// `None` while the learner has seen nothing it can predict from.
    fn predict(&self, features: &FeatureMap) -> Option<Label>;

    /// Number of instances trained since the last reset.
    fn trained_count(&self) -> u64;

    fn snapshot(&self) -> PrequelResult<LearnerSnapshot>;

    fn restore(&mut self, snapshot: &LearnerSnapshot) -> PrequelResult<()>;

    /// Untrained learner of the same kind.
    fn fresh(&self) -> Box<dyn Learner> {
        self.kind().build()
    }

    /// Independent copy with identical state.
    fn fork(&self) -> PrequelResult<Box<dyn Learner>> {
        let mut copy = self.fresh();
        copy.restore(&self.snapshot()?)?;
        Ok(copy)
    }
}

/// Shared guard for `restore` implementations.
pub(crate) fn expect_kind(snapshot: &LearnerSnapshot, kind: LearnerKind) -> PrequelResult<()> {
    if snapshot.kind != kind {
        return Err(PrequelError::store(format!(
            "learner snapshot is `{}`, expected `{}`",
            snapshot.kind, kind
        )));
    }
    Ok(())
}
