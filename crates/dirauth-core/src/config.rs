//! Configuration for the directory integration.
//!
//! The record is owned by the external store and read at the start of every operation.
//! Only [`DirectoryConfig::check`] decides whether a record is usable; deserialization
//! alone accepts anything with the right shape so that a disabled, half-filled record
//! can still be stored.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default number of idle connections retained by the pool.
pub const DEFAULT_POOL_SIZE: usize = 5;
/// Default per-connection network timeout (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default attribute used as the user RDN type.
pub const DEFAULT_USER_ATTRIBUTE: &str = "uid";

/// Directory (LDAP) integration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DirectoryConfig {
    /// Whether directory login is enabled at all
    #[serde(default)]
    pub enabled: bool,

    /// Server URL, `ldap://` or `ldaps://`
    #[serde(default)]
    pub server_url: String,

    /// Base DN under which users are searched
    #[serde(default)]
    pub base_dn: String,

    /// Attribute identifying users (the user RDN type)
    #[serde(default = "default_user_attribute")]
    pub user_attribute: String,

    /// Extra filter ANDed into user and group searches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_filter: Option<String>,

    /// Subtree holding group entries (falls back to `base_dn` when empty)
    #[serde(default)]
    pub group_base_dn: String,

    /// Group a user must belong to before being let in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_group: Option<String>,

    /// Groups whose members get unrestricted access
    #[serde(default)]
    pub admin_groups: Vec<String>,

    /// PEM-encoded CA certificate trusted instead of the platform roots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,

    /// Skip server certificate verification
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Idle connections kept by the pool
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Per-connection network timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_user_attribute() -> String {
    DEFAULT_USER_ATTRIBUTE.to_string()
}

const fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl DirectoryConfig {
    /// Create an enabled configuration for the given server and base DN.
    #[must_use]
    pub fn new(server_url: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            enabled: true,
            server_url: server_url.into(),
            base_dn: base_dn.into(),
            ..Self::default()
        }
    }

    /// Create a disabled, empty configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Set the user attribute (e.g. `uid`, `sAMAccountName`).
    #[must_use]
    pub fn with_user_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.user_attribute = attribute.into();
        self
    }

    /// Set the extra filter ANDed into searches.
    #[must_use]
    pub fn with_user_filter(mut self, filter: impl Into<String>) -> Self {
        self.user_filter = Some(filter.into());
        self
    }

    /// Set the group subtree.
    #[must_use]
    pub fn with_group_base_dn(mut self, dn: impl Into<String>) -> Self {
        self.group_base_dn = dn.into();
        self
    }

    /// Require membership of a group.
    #[must_use]
    pub fn with_required_group(mut self, group: impl Into<String>) -> Self {
        self.required_group = Some(group.into());
        self
    }

    /// Set the admin groups.
    #[must_use]
    pub fn with_admin_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Trust a custom CA (PEM text).
    #[must_use]
    pub fn with_ca_certificate(mut self, pem: impl Into<String>) -> Self {
        self.ca_certificate = Some(pem.into());
        self
    }

    /// Enable or disable certificate verification skipping.
    #[must_use]
    pub const fn with_insecure_skip_verify(mut self, insecure: bool) -> Self {
        self.insecure_skip_verify = insecure;
        self
    }

    /// Set the pool capacity.
    #[must_use]
    pub const fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the network timeout in seconds.
    #[must_use]
    pub const fn with_timeout_secs(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// Network timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Group search base, defaulting to the base DN.
    #[must_use]
    pub fn group_base_dn(&self) -> &str {
        if self.group_base_dn.trim().is_empty() {
            &self.base_dn
        } else {
            &self.group_base_dn
        }
    }

    /// Extra search filter, if one is configured and non-blank.
    #[must_use]
    pub fn user_filter(&self) -> Option<&str> {
        self.user_filter
            .as_deref()
            .map(str::trim)
            .filter(|filter| !filter.is_empty())
    }

    /// Required group, if one is configured and non-blank.
    #[must_use]
    pub fn required_group(&self) -> Option<&str> {
        self.required_group
            .as_deref()
            .map(str::trim)
            .filter(|group| !group.is_empty())
    }

    /// Custom CA PEM, if one is configured and non-blank.
    #[must_use]
    pub fn ca_certificate(&self) -> Option<&str> {
        self.ca_certificate
            .as_deref()
            .filter(|pem| !pem.trim().is_empty())
    }

    /// Validate the configuration.
    ///
    /// Numeric ranges are always checked. Server URL, base DN and user attribute are only
    /// required once the integration is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn check(&self) -> Result<()> {
        self.validate()?;

        if !self.enabled {
            return Ok(());
        }

        let url = Url::parse(self.server_url.trim())?;
        if !matches!(url.scheme(), "ldap" | "ldaps") {
            return Err(Error::Config(format!(
                "server URL must use ldap:// or ldaps://, got `{}`",
                url.scheme()
            )));
        }

        if self.base_dn.trim().is_empty() {
            return Err(Error::Config("base DN is required".to_string()));
        }

        if self.user_attribute.trim().is_empty() {
            return Err(Error::Config("user attribute is required".to_string()));
        }

        Ok(())
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: String::new(),
            base_dn: String::new(),
            user_attribute: default_user_attribute(),
            user_filter: None,
            group_base_dn: String::new(),
            required_group: None,
            admin_groups: Vec::new(),
            ca_certificate: None,
            insecure_skip_verify: false,
            pool_size: default_pool_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
