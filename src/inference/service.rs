//! Predictor over the committed learner.

use crate::common::error::{PrequelError, PrequelResult};
use crate::data::domain::{FeatureMap, Schema, Value};
use crate::training::domain::Learner;

use super::domain::Prediction;

/// Predict one feature map. Never trains, never fails out of band.
pub fn predict(schema: &Schema, learner: &dyn Learner, features: &FeatureMap) -> Prediction {
    match try_predict(schema, learner, features) {
        Ok(prediction) => prediction,
        Err(err) => {
            tracing::debug!(error = %err, "prediction failed");
            Prediction::failed(&err)
        }
    }
}

fn try_predict(schema: &Schema, learner: &dyn Learner, features: &FeatureMap) -> PrequelResult<Prediction> {
    schema.check_features(features)?;
    if learner.trained_count() == 0 {
        return Err(PrequelError::predict("no trained model yet"));
    }
    let selected: FeatureMap = schema
        .x
        .iter()
        .filter_map(|name| features.get(name).map(|v| (name.clone(), v.clone())))
        .collect();
    learner
        .predict(&selected)
        .map(Prediction::ok)
        .ok_or_else(|| PrequelError::predict("model produced no label"))
}

/// Predict every input in order; one bad input does not stop the rest.
pub fn predict_batch(schema: &Schema, learner: &dyn Learner, inputs: &[FeatureMap]) -> Vec<Prediction> {
    inputs
        .iter()
        .map(|features| predict(schema, learner, features))
        .collect()
}

/// Predict from a JSON object keyed by field name.
pub fn predict_json(schema: &Schema, learner: &dyn Learner, input: &str) -> Prediction {
    match features_from_json(schema, input) {
        Ok(features) => predict(schema, learner, &features),
        Err(err) => Prediction::failed(&err),
    }
}

/// Convert a JSON object into declared features. Unknown keys are dropped.
pub fn features_from_json(schema: &Schema, input: &str) -> PrequelResult<FeatureMap> {
    let parsed: serde_json::Value = serde_json::from_str(input)
        .map_err(|e| PrequelError::predict(format!("input is not valid json: {e}")))?;
    let object = parsed
        .as_object()
        .ok_or_else(|| PrequelError::predict("input must be a json object"))?;

    let mut features = FeatureMap::new();
    for name in &schema.x {
        let Some(raw) = object.get(name) else { continue };
        let value = match raw {
            serde_json::Value::String(s) => schema.parse_cell(name, s)?,
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            other => {
                return Err(PrequelError::predict(format!(
                    "field `{name}` has unsupported value {other}"
                )))
            }
        };
        features.insert(name.clone(), value);
    }
    Ok(features)
}
