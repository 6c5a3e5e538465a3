//! Error categories
//!
//! The thousands digit of an [`ErrorCode`] names the area it belongs to.

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Area an error code belongs to
///
/// | Range | Category |
/// |-------|----------|
/// | 0xxx | General |
/// | 1xxx | Auth (holder state) |
/// | 2xxx | Permission |
/// | 3xxx | Query |
/// | 4xxx | Store |
/// | 5xxx | Role |
/// | other | System |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    General,
    Auth,
    Permission,
    Query,
    Store,
    Role,
    System,
}

impl ErrorCategory {
    pub fn from_code(code: u16) -> Self {
        match code / 1000 {
            0 => Self::General,
            1 => Self::Auth,
            2 => Self::Permission,
            3 => Self::Query,
            4 => Self::Store,
            5 => Self::Role,
            _ => Self::System,
        }
    }

    /// Serialized name, e.g. `"query"`
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::Query => "query",
            Self::Store => "store",
            Self::Role => "role",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}
