//! Error handling primitives shared across the core.
//!
//! Every fallible operation returns [`PrequelResult`]. The [`ErrorCode`]
//! table is what crosses the FFI boundary, so its values never change.

use thiserror::Error;

/// Stable error codes that cross the FFI boundary.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Instance or field did not match the attribute schema.
    Schema = 1,
    /// Operation invoked with no applicable data.
    State = 2,
    /// Underlying persistence failure.
    Store = 3,
    /// Single prediction failed.
    Predict = 4,
    /// Invalid or missing configuration.
    Config = 5,
    /// Report options or input were rejected.
    Report = 6,
    /// Catch-all for invariant violations and bugs.
    Internal = 7,
}

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum PrequelError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("state error: {0}")]
    State(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("predict error: {0}")]
    Predict(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("report error: {0}")]
    Report(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Result alias used throughout the crate.
pub type PrequelResult<T> = Result<T, PrequelError>;

impl PrequelError {
    /// Validation helper.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Helper for operations that found nothing to work on.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn predict(msg: impl Into<String>) -> Self {
        Self::Predict(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn report(msg: impl Into<String>) -> Self {
        Self::Report(msg.into())
    }

    /// Invariant violation helper. Aborts the running operation without commit.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Machine parsable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Schema(_) => ErrorCode::Schema,
            Self::State(_) => ErrorCode::State,
            Self::Store(_) | Self::Io(_) | Self::Json(_) => ErrorCode::Store,
            Self::Csv(_) => ErrorCode::Schema,
            Self::Predict(_) => ErrorCode::Predict,
            Self::Config(_) => ErrorCode::Config,
            Self::Report(_) => ErrorCode::Report,
            Self::Invariant(_) => ErrorCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok as u32, 0);
        assert_eq!(ErrorCode::Schema as u32, 1);
        assert_eq!(ErrorCode::State as u32, 2);
        assert_eq!(ErrorCode::Store as u32, 3);
        assert_eq!(ErrorCode::Predict as u32, 4);
        assert_eq!(ErrorCode::Config as u32, 5);
        assert_eq!(ErrorCode::Report as u32, 6);
        assert_eq!(ErrorCode::Internal as u32, 7);
    }

    #[test]
    fn io_errors_map_to_store_code() {
        let err: PrequelError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.code(), ErrorCode::Store);
        assert!(err.to_string().contains("disk"));
    }

    #[test]
    fn display_includes_category() {
        let err = PrequelError::state("nothing to update");
        assert_eq!(err.to_string(), "state error: nothing to update");
        assert_eq!(err.code(), ErrorCode::State);
    }
}
