use std::path::PathBuf;

use serde_json::json;
use thiserror::Error;

/// Validation failures raised by the calculator before any computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported category: {0}")]
    UnsupportedCategory(String),
}

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("I/O error at {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Attach the offending path to an I/O failure.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Allocation(AllocationError::InvalidRequest(_)) => "invalid_request",
            AppError::Allocation(AllocationError::UnsupportedCategory(_)) => "unsupported_category",
            AppError::Io { .. } => "io",
            AppError::Config(_) => "config",
            AppError::Serialization(_) => "serialization",
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Allocation(AllocationError::InvalidRequest(_)) => 2,
            AppError::Allocation(AllocationError::UnsupportedCategory(_)) => 3,
            AppError::Io { .. } => 4,
            AppError::Config(_) => 5,
            AppError::Serialization(_) => 6,
        }
    }

    /// Structured error body written to stderr by the CLI.
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "error": self.kind(), "message": self.to_string() })
    }
}
