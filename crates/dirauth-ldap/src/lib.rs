//! LDAP authentication and authorization for directory-backed logins.
//!
//! [`DirectoryService`] is the entry point: it authenticates users with a service-account
//! search followed by a user bind, resolves group membership from `memberOf` back-links or
//! group entries, and turns groups into namespace permissions. Connections come from a
//! small pool owned by [`DirectoryClient`], which can be reconfigured at runtime.
//!
//! Only bind and search are ever sent to the directory.

#![deny(missing_docs)]

mod auth;
mod client;
mod dn;
mod filter;
mod groups;
#[cfg(test)]
mod log_capture;
mod pool;
mod repository;
mod sanitize;
mod service;
mod session;
mod tls;

pub use auth::AuthenticatedUser;
pub use client::DirectoryClient;
pub use dn::{DistinguishedName, DnError, Rdn};
pub use filter::{member_filter, user_filter, MATCH_ALL};
pub use groups::{resolve_groups, MEMBER_OF};
pub use pool::{ConnectionPool, WARM_CONNECTIONS};
pub use repository::{DirectoryRepository, Lookup};
pub use sanitize::{escape_filter_value, is_valid_dn, validate_identifier, MAX_IDENTIFIER_LEN};
pub use service::DirectoryService;
pub use session::{
    ConnectionTarget, ConnectorFactory, LdapConnector, LdapConnectorFactory, LdapEntry,
    LdapSession, RealLdapConnector, SearchRequest, SearchScope,
};
pub use tls::TlsSettings;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirauth_core::Result<T>;
