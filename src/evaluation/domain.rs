//! Domain primitives for prequential statistics.
//!
//! [`GlobalStats`] is the project-wide counter record, [`Tally`] is what a
//! chunk contributes to it, and [`GenerationRecord`] remembers what each
//! rebuild did to accuracy.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::common::error::{PrequelError, PrequelResult};
use crate::data::domain::Label;

/// Counts of `actual -> predicted -> count`.
///
/// Scorings made before any model existed are kept per actual label in a
/// separate map, off the grid, so no label value can land on the diagonal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    cells: BTreeMap<Label, BTreeMap<Label, u64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    unpredicted: BTreeMap<Label, u64>,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, actual: &Label, predicted: Option<&Label>) {
        let cell = match predicted {
            Some(predicted) => self
                .cells
                .entry(actual.clone())
                .or_default()
                .entry(predicted.clone())
                .or_default(),
            None => self.unpredicted.entry(actual.clone()).or_default(),
        };
        *cell += 1;
    }

    pub fn merge(&mut self, other: &ConfusionMatrix) {
        for (actual, row) in &other.cells {
            let target = self.cells.entry(actual.clone()).or_default();
            for (predicted, count) in row {
                *target.entry(predicted.clone()).or_default() += count;
            }
        }
        for (actual, count) in &other.unpredicted {
            *self.unpredicted.entry(actual.clone()).or_default() += count;
        }
    }

    /// Remove `other`'s counts. Fails without touching `self` if any cell would go negative.
    pub fn subtract(&mut self, other: &ConfusionMatrix) -> PrequelResult<()> {
        for (actual, row) in &other.cells {
            for (predicted, count) in row {
                if self.count(actual, predicted) < *count {
                    return Err(PrequelError::invariant(format!(
                        "confusion matrix underflow at ({actual}, {predicted})"
                    )));
                }
            }
        }
        for (actual, count) in &other.unpredicted {
            if self.unpredicted_count(actual) < *count {
                return Err(PrequelError::invariant(format!(
                    "confusion matrix underflow at ({actual}, unpredicted)"
                )));
            }
        }

        for (actual, row) in &other.cells {
            if let Some(target) = self.cells.get_mut(actual) {
                for (predicted, count) in row {
                    if let Some(cell) = target.get_mut(predicted) {
                        *cell -= count;
                        if *cell == 0 {
                            target.remove(predicted);
                        }
                    }
                }
                if target.is_empty() {
                    self.cells.remove(actual);
                }
            }
        }
        for (actual, count) in &other.unpredicted {
            if let Some(cell) = self.unpredicted.get_mut(actual) {
                *cell -= count;
                if *cell == 0 {
                    self.unpredicted.remove(actual);
                }
            }
        }
        Ok(())
    }

    pub fn count(&self, actual: &Label, predicted: &Label) -> u64 {
        self.cells
            .get(actual)
            .and_then(|row| row.get(predicted))
            .copied()
            .unwrap_or(0)
    }

    /// Scorings of `actual` made while no model existed.
    pub fn unpredicted_count(&self, actual: &Label) -> u64 {
        self.unpredicted.get(actual).copied().unwrap_or(0)
    }

    /// Every scoring, unpredicted ones included.
    pub fn total(&self) -> u64 {
        let predicted: u64 = self.cells.values().flat_map(|row| row.values()).sum();
        predicted + self.unpredicted.values().sum::<u64>()
    }

    /// Sum of the diagonal.
    pub fn correct(&self) -> u64 {
        self.cells
            .iter()
            .map(|(actual, row)| row.get(actual).copied().unwrap_or(0))
            .sum()
    }

    /// Every label seen as actual or predicted, sorted.
    pub fn labels(&self) -> Vec<Label> {
        let mut set = BTreeSet::new();
        for (actual, row) in &self.cells {
            set.insert(actual.clone());
            set.extend(row.keys().cloned());
        }
        set.extend(self.unpredicted.keys().cloned());
        set.into_iter().collect()
    }

    /// Dense rows in `labels()` order, actual on rows and predicted on
    /// columns, plus the unpredicted count of each row.
    pub fn dense(&self) -> (Vec<Label>, Vec<Vec<u64>>, Vec<u64>) {
        let labels = self.labels();
        let rows = labels
            .iter()
            .map(|actual| labels.iter().map(|p| self.count(actual, p)).collect())
            .collect();
        let unpredicted = labels.iter().map(|l| self.unpredicted_count(l)).collect();
        (labels, rows, unpredicted)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.unpredicted.is_empty()
    }
}

/// Prequential outcome of a run of scored instances.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub correct: u64,
    pub total: u64,
    pub confusion: ConfusionMatrix,
}

impl Tally {
    /// Record one scoring. Returns whether it was correct.
    pub fn record(&mut self, actual: &Label, predicted: Option<&Label>) -> bool {
        let hit = predicted == Some(actual);
        if hit {
            self.correct += 1;
        }
        self.total += 1;
        self.confusion.add(actual, predicted);
        hit
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    pub fn merge(&mut self, other: &Tally) {
        self.correct += other.correct;
        self.total += other.total;
        self.confusion.merge(&other.confusion);
    }
}

/// Global cumulative counters over the retained window.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub instance_count: u64,
    pub updated_instance_count: u64,
    pub instance_correct_count: u64,
    pub confusion: ConfusionMatrix,
}

impl GlobalStats {
    /// Always the exact quotient of the stored counters.
    pub fn instance_accuracy(&self) -> f64 {
        ratio(self.instance_correct_count, self.updated_instance_count)
    }

    /// Fold a freshly scored tally into the counters.
    pub fn add_scored(&mut self, tally: &Tally) {
        self.updated_instance_count += tally.total;
        self.instance_correct_count += tally.correct;
        self.confusion.merge(&tally.confusion);
    }

    /// Take a chunk's volume and contribution out of the counters.
    pub fn remove_chunk(&mut self, instance_count: u64, contribution: &Tally) -> PrequelResult<()> {
        if self.instance_count < instance_count
            || self.updated_instance_count < contribution.total
            || self.instance_correct_count < contribution.correct
        {
            return Err(PrequelError::invariant("global counters would go negative"));
        }
        self.confusion.subtract(&contribution.confusion)?;
        self.instance_count -= instance_count;
        self.updated_instance_count -= contribution.total;
        self.instance_correct_count -= contribution.correct;
        Ok(())
    }

    /// Forget every scoring, keeping the retained volume.
    pub fn reset_scoring(&mut self) {
        self.updated_instance_count = 0;
        self.instance_correct_count = 0;
        self.confusion = ConfusionMatrix::new();
    }
}

/// Outcome of one rebuild.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: u64,
    pub datetime_ms: u64,
    pub instance_count: u64,
    pub before_instance_accuracy: f64,
    pub after_instance_accuracy: f64,
}

pub(crate) fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
