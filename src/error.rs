//! Error types for resguard
//!
//! Exit codes:
//! - 0: Success (including no-op, bypass and advisory runs)
//! - 1: Guard failure (blocking reservation conflict, missing agent identity)
//! - 2: User error (bad args, bad or unparsable config, missing repo)
//! - 4: Operation failed (io, git, lock contention)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the resguard CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GUARD_FAILURE: i32 = 1;
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for resguard operations
#[derive(Error, Debug)]
pub enum Error {
    // Guard failures (exit code 1)
    #[error("{0} environment variable is required.")]
    MissingAgent(&'static str),

    // User errors (exit code 2)
    #[error("Not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Operation failures (exit code 4)
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MissingAgent(_) => exit_codes::GUARD_FAILURE,

            Error::NotARepo(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::TomlParse(_) => exit_codes::USER_ERROR,

            Error::Git(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON error output
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::MissingAgent(var) => Some(serde_json::json!({ "variable": var })),
            Error::NotARepo(path) | Error::LockFailed(path) => {
                Some(serde_json::json!({ "path": path.display().to_string() }))
            }
            Error::InvalidConfig(message) | Error::InvalidArgument(message) => {
                Some(serde_json::json!({ "message": message }))
            }
            _ => None,
        }
    }
}

/// Result type alias for resguard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
