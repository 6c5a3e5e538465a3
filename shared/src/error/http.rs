//! Status mapping for error codes
//!
//! The engine owns no transport, but callers need to tell a denial from a
//! rejected field. Each category has a default status; the few codes that
//! differ from their category are listed first.

use super::category::ErrorCategory;
use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,
            Self::NotFound | Self::RoleNotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists | Self::RoleXidExists | Self::TransientConflict => {
                StatusCode::CONFLICT
            }
            Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            _ => match self.category() {
                ErrorCategory::Auth => StatusCode::UNAUTHORIZED,
                ErrorCategory::Permission => StatusCode::FORBIDDEN,
                ErrorCategory::System | ErrorCategory::Store => StatusCode::INTERNAL_SERVER_ERROR,
                // 字段校验 / 查询 / 角色规则
                ErrorCategory::General | ErrorCategory::Query | ErrorCategory::Role => {
                    StatusCode::BAD_REQUEST
                }
            },
        }
    }
}
