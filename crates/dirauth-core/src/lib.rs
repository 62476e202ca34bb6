//! # dirauth-core
//!
//! Core types for directory-backed authentication and namespace authorization.
//!
//! This crate carries everything that does not speak the directory protocol itself:
//! the error taxonomy, the directory configuration record, service-account credentials,
//! the group-permission table with its permission calculator, and the storage port
//! through which configuration and credentials are read and updated.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and user-safe messages
//! - [`config`] - Directory integration configuration and validation
//! - [`credentials`] - Service-account credentials used for directory searches
//! - [`permission`] - Permission levels, group-permission table and calculator
//! - [`store`] - Configuration/credential store port and in-memory implementation

#![deny(missing_docs)]
#![deny(clippy::all)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod permission;
pub mod store;

pub use config::DirectoryConfig;
pub use credentials::ServiceCredentials;
pub use error::{Error, Result};
pub use permission::{
    compute_permissions, GroupPermission, NamespacePermission, PermissionLevel, PermissionResult,
};
pub use store::{DirectoryStore, MemoryStore};
