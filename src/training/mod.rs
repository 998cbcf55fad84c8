//! Learners and the controllers that train them.
//!
//! `domain` holds the [`Learner`] capability, `majority` and `naive_bayes`
//! are the bundled algorithms, `service` drives update and rebuild passes.

pub mod domain;
pub mod majority;
pub mod naive_bayes;
pub mod service;

pub use domain::{Learner, LearnerKind, LearnerSnapshot};
