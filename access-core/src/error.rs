//! Engine error taxonomy
//!
//! [`CoreError`] is what every engine operation returns. Callers that need a
//! transport-neutral shape convert it into [`shared::AppError`].

use crate::store::StorageError;
use shared::error::{AppError, ErrorCode, ValidationResult};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Actor failed a role or permission check
    #[error("Permission denied for {holder}: {message}")]
    PermissionDenied { holder: String, message: String },

    /// Field-level problems the caller can correct
    #[error("Validation failed: {0}")]
    Validation(ValidationResult),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Query references an unmapped property
    #[error("Unknown query property: {0}")]
    FieldNotFound(String),

    #[error("Query syntax error: {0}")]
    QuerySyntax(String),

    /// Write conflict, retried by the store
    #[error("Transient conflict: {0}")]
    TransientConflict(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(StorageError::Serialization(err))
    }
}

impl CoreError {
    pub fn permission_denied(holder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            holder: holder.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Default retry classifier for write operations
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::TransientConflict(_) => true,
            CoreError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Validation error with a single contextual message
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = ValidationResult::new();
        result.add_contextual_message(key, message);
        Self::Validation(result)
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::PermissionDenied { holder, message } => {
                AppError::permission_denied(message, holder)
            }
            CoreError::Validation(result) => AppError::validation(&result),
            CoreError::NotFound(what) => AppError::not_found(what),
            CoreError::FieldNotFound(property) => AppError::field_not_found(property),
            CoreError::QuerySyntax(msg) => AppError::with_message(ErrorCode::QuerySyntax, msg),
            CoreError::TransientConflict(msg) => {
                AppError::with_message(ErrorCode::TransientConflict, msg)
            }
            CoreError::InvalidArgument(msg) => AppError::invalid_argument(msg),
            CoreError::Storage(e) if e.is_transient() => {
                AppError::with_message(ErrorCode::TransientConflict, e.to_string())
            }
            CoreError::Storage(e) => AppError::database(e.to_string()),
            CoreError::Unexpected(msg) => AppError::internal(msg),
        }
    }
}
