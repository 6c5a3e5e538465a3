//! Caller-facing error type

use super::codes::ErrorCode;
use super::validation::ValidationResult;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// What a surface on top of the engine reports: a code, a message and
/// optional structured details (holder name, field messages, property)
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl AppError {
    /// Error with the code's default message
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.message())
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    // ==================== Constructors ====================

    /// Field messages go to the `messages` detail
    pub fn validation(result: &ValidationResult) -> Self {
        let messages = serde_json::to_value(result.messages()).unwrap_or(Value::Null);
        Self::with_message(ErrorCode::ValidationFailed, result.to_string())
            .with_detail("messages", messages)
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::with_message(ErrorCode::NotFound, format!("{} not found", resource))
            .with_detail("resource", resource)
    }

    /// Denial naming the acting holder
    pub fn permission_denied(msg: impl Into<String>, holder: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::PermissionDenied, msg).with_detail("holder", holder.into())
    }

    pub fn field_not_found(property: impl Into<String>) -> Self {
        let property = property.into();
        Self::with_message(ErrorCode::FieldNotFound, format!("Unknown property: {}", property))
            .with_detail("property", property)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidArgument, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InternalError, msg)
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::DatabaseError, msg)
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_default_message() {
        let err = AppError::new(ErrorCode::TransientConflict);
        assert_eq!(err.message, "Write conflict");
        assert!(err.details.is_empty());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 4001);
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_not_found_detail() {
        let err = AppError::not_found("Role admin");
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Role admin not found");
        assert_eq!(err.detail("resource").unwrap(), "Role admin");
    }

    #[test]
    fn test_permission_denied_carries_holder() {
        let err = AppError::permission_denied("Missing role", "alice");
        assert_eq!(err.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(err.detail("holder").unwrap(), "alice");
    }

    #[test]
    fn test_validation_carries_messages() {
        let mut result = ValidationResult::new();
        result.add_contextual_message("editPermission", "validate.role.invalidModification");
        let err = AppError::validation(&result);
        assert_eq!(err.http_status(), StatusCode::BAD_REQUEST);
        let messages = err.detail("messages").unwrap();
        assert_eq!(messages[0]["key"], "editPermission");
    }

    #[test]
    fn test_field_not_found() {
        let err = AppError::field_not_found("foo");
        assert_eq!(err.code, ErrorCode::FieldNotFound);
        assert_eq!(err.to_string(), "Unknown property: foo");
    }
}
