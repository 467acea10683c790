//! Error types for the deployment library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for infrastructure operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur while loading settings or synthesizing a stack.
///
/// Missing settings and a missing Dockerfile are not errors: the preflight
/// validator reports them as diagnostics.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Invalid env file {path:?} at line {line}: {message}")]
    EnvFile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Unknown resource reference: {0}")]
    UnknownResource(String),

    #[error("Duplicate logical id: {0}")]
    DuplicateLogicalId(String),

    #[error("Unsupported template format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid cached context {key}: {message}")]
    Context { key: String, message: String },

    #[error("Asset fingerprint failed for {path:?}: {message}")]
    Fingerprint { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
