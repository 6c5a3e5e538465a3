//! Error codes
//!
//! One table below defines every code: the variant, its `u16` value and the
//! default English message. The thousands digit is the category, see
//! [`ErrorCategory`](super::ErrorCategory).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! error_codes {
    ($( $(#[$doc:meta])* $name:ident = $value:literal => $message:literal, )*) => {
        /// Transport-neutral error code, serialized as its `u16` value
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "u16", try_from = "u16")]
        #[repr(u16)]
        pub enum ErrorCode {
            $( $(#[$doc])* $name = $value, )*
        }

        impl ErrorCode {
            /// Every defined code, in table order
            pub const ALL: &'static [ErrorCode] = &[$(ErrorCode::$name),*];

            /// Default developer-facing message
            pub const fn message(&self) -> &'static str {
                match self {
                    $( ErrorCode::$name => $message, )*
                }
            }
        }

        impl TryFrom<u16> for ErrorCode {
            type Error = InvalidErrorCode;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(ErrorCode::$name), )*
                    _ => Err(InvalidErrorCode(value)),
                }
            }
        }
    };
}

error_codes! {
    // 0xxx 通用
    Success = 0 => "Operation completed successfully",
    Unknown = 1 => "An unknown error occurred",
    ValidationFailed = 2 => "Validation failed",
    NotFound = 3 => "Resource not found",
    AlreadyExists = 4 => "Resource already exists",
    InvalidRequest = 5 => "Invalid request",
    /// Null role set, null entry in a role set
    InvalidArgument = 6 => "Invalid argument",
    RequiredField = 7 => "Required field is missing",

    // 1xxx 持有者状态
    NotAuthenticated = 1001 => "No permission holder",
    HolderDisabled = 1002 => "Permission holder is disabled",

    // 2xxx 权限
    PermissionDenied = 2001 => "Permission denied",
    RoleRequired = 2002 => "Required role is missing",
    AdminRequired = 2003 => "Superadmin role required",
    CannotAlterSuperadminRole = 2004 => "The superadmin role cannot be altered",
    CannotAlterUserRole = 2005 => "The user role cannot be altered",

    // 3xxx 查询
    QuerySyntax = 3001 => "Query syntax error",
    /// Query references an unmapped property
    FieldNotFound = 3002 => "Unknown query property",
    UnsupportedOperator = 3003 => "Unsupported query operator",

    // 4xxx 存储
    /// Write conflict, another attempt may succeed
    TransientConflict = 4001 => "Write conflict",
    RowMappingFailed = 4002 => "Row could not be mapped",
    /// Row belongs to a module that is not installed
    ModuleNotLoaded = 4003 => "Module not loaded",

    // 5xxx 角色
    RoleNotFound = 5001 => "Role not found",
    RoleXidExists = 5002 => "Role xid already exists",
    RoleAlreadyAssigned = 5003 => "Role already assigned to permission",
    RoleCycleDetected = 5004 => "Role inheritance cycle detected",

    // 9xxx 系统
    InternalError = 9001 => "Internal error",
    DatabaseError = 9002 => "Database error",
    ConfigError = 9005 => "Configuration error",
}

impl ErrorCode {
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Unknown `u16` given to [`ErrorCode::try_from`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
