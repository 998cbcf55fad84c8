//! Structured logging helpers on top of `tracing`.
//!
//! The crate never installs a subscriber; the embedding process decides
//! where events go.

use std::time::Instant;

use super::error::{ErrorCode, PrequelResult};
use super::time;

/// Emit one event describing the outcome of a facade call.
///
/// Fields follow the `module`/`event`/`code`/`dur_ms` schema so log
/// lines from every entry point can be aggregated the same way.
pub fn log_outcome<T>(module: &str, event: &str, started: Instant, result: &PrequelResult<T>) {
    let dur_ms = time::elapsed_ms(started);
    match result {
        Ok(_) => tracing::info!(
            module,
            event,
            code = ErrorCode::Ok as u32,
            dur_ms,
            "completed"
        ),
        Err(err) => tracing::warn!(
            module,
            event,
            code = err.code() as u32,
            dur_ms,
            error = %err,
            "failed"
        ),
    }
}
