//! Public entry points: the [`Project`] facade and its C ABI.

pub mod ffi;
pub mod project;

pub use project::Project;
