//! Prediction outcome returned in-band.

use serde::{Deserialize, Serialize};

use crate::common::error::PrequelError;
use crate::data::domain::Label;

/// Outcome of one prediction.
///
/// Failures are carried in `error` rather than raised, so a caller looping
/// over many inputs keeps going past the bad ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Option<Label>,
    pub error: Option<String>,
}

impl Prediction {
    pub fn ok(label: Label) -> Self {
        Self {
            label: Some(label),
            error: None,
        }
    }

    pub fn failed(err: &PrequelError) -> Self {
        Self {
            label: None,
            error: Some(err.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
