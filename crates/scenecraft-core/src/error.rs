use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type for the composition engine.
///
/// Every fallible operation in `scenecraft-core` and `scenecraft-media`
/// eventually resolves to one of these variants — callers of
/// `render_from_json_file` / `render_from_json_string` only ever see this
/// type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read project file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid project JSON: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid project configuration: {0}")]
    ConfigValidation(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("effect processing failed: {0}")]
    Filter(String),

    #[error("encode/mux failed: {0}")]
    Encode(String),

    #[error("render was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EngineError>;
