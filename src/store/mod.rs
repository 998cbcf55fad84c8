//! Persistence of chunks, global counters, learner state and rebuild history.

pub mod domain;
pub mod repo_fs;
pub mod repo_mem;

pub use domain::{ChunkRecord, GlobalRecord, ProjectState, Store, Transaction};
pub use repo_fs::FsStore;
pub use repo_mem::MemStore;
