//! Unified error system
//!
//! This module provides:
//! - [`ErrorCode`]: numeric codes shared by every surface
//! - [`ErrorCategory`]: the area a code belongs to
//! - [`AppError`]: code, message and optional details
//! - [`ValidationResult`]: Field-level `(key, message)` pairs
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Query errors
//! - 4xxx: Store errors
//! - 5xxx: Role errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ValidationResult};
//!
//! let err = AppError::new(ErrorCode::NotFound);
//!
//! let mut result = ValidationResult::new();
//! result.add_contextual_message("editPermission", "validate.role.invalidModification");
//! let err = AppError::validation(&result);
//! assert_eq!(err.code, ErrorCode::ValidationFailed);
//! ```

mod category;
mod codes;
mod http;
mod types;
mod validation;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};
pub use validation::{ContextualMessage, ValidationResult};
