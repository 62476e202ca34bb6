//! LDAP session abstraction and its `ldap3` implementation.
//!
//! Everything above this module talks to [`LdapSession`] and [`LdapConnector`] only, which
//! keeps pooling, orchestration and group resolution testable without a directory server.

use async_trait::async_trait;
use dirauth_core::{Error, Result};
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::tls::TlsSettings;

/// How far below the base a search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// The base entry itself.
    Base,
    /// Direct children of the base.
    OneLevel,
    /// The base and everything beneath it.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// A search operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base
    pub base_dn: String,
    /// Search breadth
    pub scope: SearchScope,
    /// RFC 4515 filter
    pub filter: String,
    /// Requested attributes
    pub attributes: Vec<String>,
}

impl SearchRequest {
    /// Create a search request.
    #[must_use]
    pub fn new(base_dn: impl Into<String>, scope: SearchScope, filter: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope,
            filter: filter.into(),
            attributes: Vec::new(),
        }
    }

    /// Set the requested attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }
}

/// One entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Entry DN.
    pub dn: String,
    /// Attribute map (values keep the order sent by the server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Create an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add an attribute with its values.
    #[must_use]
    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// All values of `attribute`.
    ///
    /// Attribute names are case-insensitive in LDAP and servers disagree on the casing they
    /// send back (`memberOf`, `memberof`), so an exact match is tried first, then any casing.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(attribute)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }

    /// First value of `attribute`.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }
}

/// One established connection to the directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Simple bind. A rejected bind is [`Error::Bind`]; transport failure is
    /// [`Error::DirectoryUnreachable`].
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Search. A rejected search is [`Error::Search`]; a timeout or transport failure is
    /// [`Error::DirectoryUnreachable`].
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<LdapEntry>>;

    /// Unbind and close the connection.
    async fn unbind(&mut self) -> Result<()>;
}

/// Dials new sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Dial and (for `ldaps://`) negotiate TLS.
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Everything needed to dial a directory server.
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    /// Server URL
    pub url: String,
    /// TLS settings derived from the configuration
    pub tls: TlsSettings,
    /// Connect and per-operation timeout
    pub timeout: Duration,
}

impl ConnectionTarget {
    /// Returns true when the URL scheme asks for TLS from connection start.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.url
            .trim()
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("ldaps://"))
    }
}

/// Builds connectors for a target; swapped out in tests.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectorFactory: Send + Sync {
    /// Create a connector dialing `target`.
    fn connector(&self, target: ConnectionTarget) -> Arc<dyn LdapConnector>;
}

/// [`ConnectorFactory`] producing `ldap3`-backed connectors.
#[derive(Debug, Default, Clone, Copy)]
pub struct LdapConnectorFactory;

impl ConnectorFactory for LdapConnectorFactory {
    fn connector(&self, target: ConnectionTarget) -> Arc<dyn LdapConnector> {
        Arc::new(RealLdapConnector::new(target))
    }
}

/// Dials directory servers with `ldap3`.
#[derive(Debug)]
pub struct RealLdapConnector {
    target: ConnectionTarget,
}

impl RealLdapConnector {
    /// Connector for one target.
    #[must_use]
    pub fn new(target: ConnectionTarget) -> Self {
        Self { target }
    }

    fn settings(&self) -> LdapConnSettings {
        let settings = LdapConnSettings::new().set_conn_timeout(self.target.timeout);
        if self.target.is_secure() {
            self.target.tls.apply(settings)
        } else {
            settings
        }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        debug!(url = %self.target.url, secure = self.target.is_secure(), "dialing directory");
        let (conn, ldap) = LdapConnAsync::with_settings(self.settings(), self.target.url.trim())
            .await
            .map_err(|err| {
                Error::DirectoryUnreachable(format!("{}: {err}", self.target.url))
            })?;

        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!("directory connection driver error: {err}");
            }
        });

        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.target.timeout,
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = timeout(self.operation_timeout, self.inner.simple_bind(dn, password))
            .await
            .map_err(|_| Error::DirectoryUnreachable("bind timed out".to_string()))?
            .map_err(|err| Error::DirectoryUnreachable(err.to_string()))?;

        if result.rc != 0 {
            return Err(Error::Bind(format!("rc={}: {}", result.rc, result.text)));
        }
        Ok(())
    }

    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<LdapEntry>> {
        let result = timeout(
            self.operation_timeout,
            self.inner.search(
                &request.base_dn,
                request.scope.into(),
                &request.filter,
                request.attributes.clone(),
            ),
        )
        .await
        .map_err(|_| Error::DirectoryUnreachable("search timed out".to_string()))?
        .map_err(|err| Error::DirectoryUnreachable(err.to_string()))?;

        let (entries, _) = result
            .success()
            .map_err(|err| Error::Search(err.to_string()))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::DirectoryUnreachable("unbind timed out".to_string()))?
            .map_err(|err| Error::DirectoryUnreachable(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_attribute_lookup_ignores_case() {
        let entry = LdapEntry::new("uid=jdoe,dc=example,dc=com")
            .with_attribute("memberOf", ["cn=ops,dc=example,dc=com"])
            .with_attribute("cn", ["John Doe"]);

        assert_eq!(
            entry.values("memberof").unwrap().to_vec(),
            vec!["cn=ops,dc=example,dc=com".to_string()]
        );
        assert_eq!(entry.first("CN"), Some("John Doe"));
        assert!(entry.values("mail").is_none());
    }

    #[test]
    fn target_security_follows_scheme() {
        let target = |url: &str| ConnectionTarget {
            url: url.to_string(),
            tls: TlsSettings::platform(url),
            timeout: Duration::from_secs(5),
        };
        assert!(target("ldaps://ad.corp:636").is_secure());
        assert!(target(" LDAPS://ad.corp").is_secure());
        assert!(!target("ldap://ad.corp:389").is_secure());
    }

    #[test]
    fn scope_conversion() {
        assert!(matches!(Scope::from(SearchScope::Base), Scope::Base));
        assert!(matches!(Scope::from(SearchScope::OneLevel), Scope::OneLevel));
        assert!(matches!(Scope::from(SearchScope::Subtree), Scope::Subtree));
    }
}
