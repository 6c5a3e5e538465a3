//! Permission holders and evaluation

pub mod holder;
pub mod service;

pub use holder::{
    Actor, PermissionHolder, SYSTEM_SUPERADMIN, SYSTEM_SUPERADMIN_NAME, SystemSuperadmin,
    system_superadmin,
};
pub use service::{PermissionService, implode};
