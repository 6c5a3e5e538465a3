//! Data models
//!
//! Role and permission types shared by the engine and its callers.
//! All ids are `i64`.

pub mod permission;
pub mod role;

// Re-exports
pub use permission::Permission;
pub use role::{
    Role, RoleVo, SUPERADMIN_ROLE_ID, SUPERADMIN_ROLE_XID, USER_ROLE_ID, USER_ROLE_XID,
    is_reserved_xid,
};
