//! Read-only prediction against the committed learner.

pub mod domain;
pub mod service;

pub use domain::Prediction;
