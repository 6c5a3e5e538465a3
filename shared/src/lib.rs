//! Shared types for the access-core workspace
//!
//! Transport-neutral types used by the engine and by whatever surface sits
//! on top of it: unified error codes, contextual validation messages and the
//! role/permission models.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use error::{AppError, AppResult, ErrorCategory, ErrorCode, ValidationResult};
pub use models::{Permission, Role, RoleVo};
pub use http;
pub use serde::{Deserialize, Serialize};
