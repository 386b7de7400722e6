//! Unified error handling for realm backup and restore

use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Target realm is already present and the import runs in strict mode
    #[error("Realm already exists: {0}")]
    AlreadyExists(String),

    #[error("Cannot import reserved realm: {0}")]
    ReservedRealm(String),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// The base realm could not be read during export
    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Keycloak error: {0}")]
    Keycloak(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when the directory service reported a 404 for the resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// True when the directory service reported a 409 for the resource
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}
