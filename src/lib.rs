// lib.rs - centrale orchestrator
pub mod common;
pub mod data;
pub mod store;
pub mod training;
pub mod inference;
pub mod evaluation;
pub mod report;
pub mod engine;
pub mod api;

pub use api::ffi::{
    prequel_api_version, prequel_close, prequel_errmsg, prequel_free_str, prequel_insert_chunk_csv,
    prequel_open, prequel_predict_json, prequel_rebuild, prequel_report_json, prequel_update,
};
pub use api::Project;
pub use common::error::{ErrorCode, PrequelError, PrequelResult};
pub use engine::{Engine, UpdateSummary};
