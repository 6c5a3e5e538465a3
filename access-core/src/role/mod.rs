//! Roles: the inheritance graph and the role service

pub mod graph;
pub mod service;

pub use graph::{RoleGraph, RoleGraphSnapshot};
pub use service::{RolePolicy, RoleService};
