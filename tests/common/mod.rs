#![allow(dead_code)]

use std::collections::BTreeMap;

use prequel::data::domain::{FeatureMap, FieldType, Instance, Schema, Value};

/// `x: REAL`, `y: TEXT_ID`.
pub fn numeric_schema() -> Schema {
    let mut fields = BTreeMap::new();
    fields.insert("x".to_string(), FieldType::Real);
    fields.insert("y".to_string(), FieldType::TextId);
    Schema {
        revision: 0,
        fields,
        x: vec!["x".into()],
        y: Some("y".into()),
    }
}

pub fn point(x: f64) -> FeatureMap {
    let mut f = FeatureMap::new();
    f.insert("x".into(), Value::Real(x));
    f
}

pub fn labelled(labels: &[&str]) -> Vec<Instance> {
    labels.iter().map(|l| Instance::new(point(0.0), *l)).collect()
}

/// Deterministic uniform generator.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// `n` points labelled by threshold 0.5; `flipped` swaps the labels.
pub fn threshold_chunk(rng: &mut Lcg, n: usize, flipped: bool) -> Vec<Instance> {
    (0..n)
        .map(|_| {
            let x = rng.next_f64();
            let low = (x < 0.5) != flipped;
            Instance::new(point(x), if low { "lo" } else { "hi" })
        })
        .collect()
}
