//! Data domain: attribute schema, instances and tabular ingestion glue.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{ChunkId, FeatureMap, FieldType, Instance, Label, Schema, Value};
pub use service::RawRow;
