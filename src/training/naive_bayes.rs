//! Incremental naive Bayes over mixed numeric and categorical features.
//!
//! Text features use Laplace-smoothed frequency tables, numeric features a
//! per-class Gaussian maintained with Welford's update.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::common::error::PrequelResult;
use crate::data::domain::{FeatureMap, Instance, Label, Value};

use super::domain::{expect_kind, Learner, LearnerKind, LearnerSnapshot};

const MIN_VARIANCE: f64 = 1e-6;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Gaussian {
    n: u64,
    mean: f64,
    m2: f64,
}

impl Gaussian {
    fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let var = if self.n > 1 {
            (self.m2 / (self.n - 1) as f64).max(MIN_VARIANCE)
        } else {
            1.0
        };
        let diff = x - self.mean;
        -0.5 * (2.0 * std::f64::consts::PI * var).ln() - diff * diff / (2.0 * var)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NaiveBayes {
    class_counts: BTreeMap<Label, u64>,
    // feature -> class -> value -> count
    categorical: BTreeMap<String, BTreeMap<Label, BTreeMap<String, u64>>>,
    // feature -> class -> running moments
    numeric: BTreeMap<String, BTreeMap<Label, Gaussian>>,
}

impl NaiveBayes {
    pub fn new() -> Self {
        Self::default()
    }

    fn total(&self) -> u64 {
        self.class_counts.values().sum()
    }

    fn log_score(&self, label: &Label, class_count: u64, features: &FeatureMap) -> f64 {
        let total = self.total() as f64;
        let mut score = (class_count as f64 / total).ln();
        for (name, value) in features {
            match value {
                Value::Text(v) => {
                    let Some(per_class) = self.categorical.get(name) else {
                        continue;
                    };
                    let distinct: BTreeSet<&String> =
                        per_class.values().flat_map(|m| m.keys()).collect();
                    let seen = per_class
                        .get(label)
                        .and_then(|m| m.get(v))
                        .copied()
                        .unwrap_or(0);
                    score += ((seen + 1) as f64 / (class_count + distinct.len() as u64 + 1) as f64)
                        .ln();
                }
                other => {
                    let Some(x) = other.as_f64() else { continue };
                    if let Some(g) = self.numeric.get(name).and_then(|m| m.get(label)) {
                        score += g.log_pdf(x);
                    }
                }
            }
        }
        score
    }
}

impl Learner for NaiveBayes {
    fn kind(&self) -> LearnerKind {
        LearnerKind::NaiveBayes
    }

    fn train(&mut self, instance: &Instance) {
        let label = &instance.label;
        *self.class_counts.entry(label.clone()).or_default() += 1;
        for (name, value) in &instance.features {
            match value {
                Value::Text(v) => {
                    *self
                        .categorical
                        .entry(name.clone())
                        .or_default()
                        .entry(label.clone())
                        .or_default()
                        .entry(v.clone())
                        .or_default() += 1;
                }
                other => {
                    if let Some(x) = other.as_f64() {
                        self.numeric
                            .entry(name.clone())
                            .or_default()
                            .entry(label.clone())
                            .or_default()
                            .push(x);
                    }
                }
            }
        }
    }

    fn predict(&self, features: &FeatureMap) -> Option<Label> {
        let mut best: Option<(&Label, f64)> = None;
        for (label, &count) in &self.class_counts {
            let score = self.log_score(label, count, features);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((label, score));
            }
        }
        best.map(|(label, _)| label.clone())
    }

    fn trained_count(&self) -> u64 {
        self.total()
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
