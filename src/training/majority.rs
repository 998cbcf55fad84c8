//! Majority-class baseline learner.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::error::PrequelResult;
use crate::data::domain::{FeatureMap, Instance, Label};

use super::domain::{expect_kind, Learner, LearnerKind, LearnerSnapshot};

/// Predicts the most frequent label seen so far; ties go to the smallest label.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MajorityClass {
    counts: BTreeMap<Label, u64>,
}

impl MajorityClass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Learner for MajorityClass {
    fn kind(&self) -> LearnerKind {
        LearnerKind::Majority
    }

    fn train(&mut self, instance: &Instance) {
        *self.counts.entry(instance.label.clone()).or_default() += 1;
    }

    fn predict(&self, _features: &FeatureMap) -> Option<Label> {
        let mut best: Option<(&Label, u64)> = None;
        for (label, &count) in &self.counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((label, count));
            }
        }
        best.map(|(label, _)| label.clone())
    }

    fn trained_count(&self) -> u64 {
        self.counts.values().sum()
    }

    fn snapshot(&self) -> PrequelResult<LearnerSnapshot> {
        Ok(LearnerSnapshot {
            kind: self.kind(),
            state: serde_json::to_value(self)?,
        })
    }

    fn restore(&mut self, snapshot: &LearnerSnapshot) -> PrequelResult<()> {
        expect_kind(snapshot, self.kind())?;
        *self = serde_json::from_value(snapshot.state.clone())?;
        Ok(())
    }
}
