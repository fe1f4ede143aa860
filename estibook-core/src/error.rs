//! Error types for estibook-core

use crate::types::SourceFormat;
use thiserror::Error;

/// Main error type for the estibook-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Whole-input parse failure for an estimate file
    #[error("parse error in {format} estimate: {message}")]
    Parse { format: String, message: String },

    /// JSON serialization error (snapshot / diff summary storage)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No parser is registered for this interchange format
    #[error("unsupported estimate format: {0}")]
    UnsupportedFormat(SourceFormat),

    /// Concurrent version-number assignment collision for a claim
    #[error("version conflict for claim {claim_id}: expected latest version {expected}, found {found}")]
    VersionConflict {
        claim_id: String,
        expected: i32,
        found: i32,
    },

    /// Estimate version not found
    #[error("estimate version not found: {0}")]
    VersionNotFound(i64),
}

/// Result type alias for estibook-core
pub type Result<T> = std::result::Result<T, Error>;
