//! Authentication: service bind, user DN resolution and the user bind.

use chrono::{DateTime, Utc};
use dirauth_core::{DirectoryConfig, Error, Result, ServiceCredentials};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::client::DirectoryClient;
use crate::filter::user_filter;
use crate::repository::{DirectoryRepository, Lookup};
use crate::sanitize::{escape_filter_value, is_valid_dn, validate_identifier};
use crate::session::{SearchRequest, SearchScope};

/// A user the directory accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    /// Identifier as supplied at login
    pub identifier: String,
    /// DN the successful bind used
    pub dn: String,
    /// When the bind succeeded
    pub authenticated_at: DateTime<Utc>,
}

impl AuthenticatedUser {
    pub(crate) fn new(identifier: impl Into<String>, dn: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            dn: dn.into(),
            authenticated_at: Utc::now(),
        }
    }
}

/// A validated login identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UserRef<'a> {
    /// Full DN supplied by the caller, used verbatim
    Dn(&'a str),
    /// Short name, looked up with the configured user attribute
    Name(&'a str),
}

impl<'a> UserRef<'a> {
    /// Validate an identifier without touching the network.
    pub(crate) fn parse(identifier: &'a str) -> Result<Self> {
        validate_identifier(identifier)?;

        if !identifier.contains('=') {
            return Ok(Self::Name(identifier));
        }
        if !is_valid_dn(identifier) {
            return Err(Error::InvalidInput(
                "identifier looks like a DN but is not a full DN".to_string(),
            ));
        }
        Ok(Self::Dn(identifier))
    }
}

/// Bind `repo` as the service account.
///
/// A rejected bind becomes [`Error::ServiceBindFailed`] so it is never mistaken for a bad
/// end-user password.
pub(crate) async fn service_bind(
    repo: &mut DirectoryRepository,
    credentials: &ServiceCredentials,
) -> Result<()> {
    // An empty bind name would be an anonymous bind.
    if credentials.is_empty() {
        error!("no service account configured for directory searches");
        return Err(Error::ServiceBindFailed(
            "service account is not configured".to_string(),
        ));
    }

    match repo.bind(credentials.username(), credentials.password()).await {
        Ok(()) => {
            debug!(dn = %credentials.username(), "service account bound");
            Ok(())
        }
        Err(Error::Bind(reason)) => {
            error!(dn = %credentials.username(), "service account bind rejected: {reason}");
            Err(Error::ServiceBindFailed(reason))
        }
        Err(err) => {
            error!(dn = %credentials.username(), "service account bind failed: {err}");
            Err(err)
        }
    }
}

/// Resolve the DN to bind as. Never fails: lookups that error or match nothing fall back
/// to `<user_attribute>=<identifier>,<base_dn>`.
pub(crate) async fn resolve_user_dn(
    repo: &mut DirectoryRepository,
    config: &DirectoryConfig,
    user: UserRef<'_>,
) -> String {
    let name = match user {
        UserRef::Dn(dn) => return dn.to_string(),
        UserRef::Name(name) => name,
    };

    let escaped = escape_filter_value(name);
    let filter = user_filter(&config.user_attribute, &escaped, config.user_filter());
    let request =
        SearchRequest::new(&config.base_dn, SearchScope::Subtree, filter).with_attributes(["dn"]);

    let lookup = repo.lookup(&request).await;
    debug!(identifier = %name, outcome = lookup.outcome(), "user entry lookup");
    match lookup {
        Lookup::Found(entries) => {
            if let Some(entry) = entries.into_iter().next() {
                return entry.dn;
            }
        }
        Lookup::NotFound => {}
        Lookup::Failed(err) => warn!(identifier = %name, "user search failed: {err}"),
    }

    // Not escaped: deployed directories already hold DNs produced this way.
    let dn = format!("{}={},{}", config.user_attribute, name, config.base_dn);
    warn!(dn = %dn, "user entry not found, binding with synthesized DN");
    dn
}

/// Run the full bind sequence and return the DN the user bound as.
///
/// The user bind happens on a second connection while the service connection is still
/// held; the user-bound connection is closed afterwards, never pooled.
pub(crate) async fn authenticate(
    client: &DirectoryClient,
    config: &DirectoryConfig,
    credentials: &ServiceCredentials,
    user: UserRef<'_>,
    password: &str,
) -> Result<String> {
    let mut service = client.acquire().await?;
    let result = bind_as_user(client, &mut service, config, credentials, user, password).await;
    service.release().await;
    result
}

async fn bind_as_user(
    client: &DirectoryClient,
    service: &mut DirectoryRepository,
    config: &DirectoryConfig,
    credentials: &ServiceCredentials,
    user: UserRef<'_>,
    password: &str,
) -> Result<String> {
    service_bind(service, credentials).await?;
    let dn = resolve_user_dn(service, config, user).await;

    let mut connection = client.acquire().await?;
    let outcome = connection.bind(&dn, password).await;
    connection.discard().await;

    match outcome {
        Ok(()) => {
            info!(target: "dirauth::audit", dn = %dn, "user bind succeeded");
            Ok(dn)
        }
        Err(Error::Bind(reason)) => {
            warn!(target: "dirauth::audit", dn = %dn, "user bind rejected: {reason}");
            Err(Error::InvalidCredentials)
        }
        Err(err) => {
            warn!(dn = %dn, "user bind failed: {err}");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConnectionPool;
    use crate::session::{LdapEntry, MockLdapConnector, MockLdapSession};
    use std::sync::Arc;

    fn repo(session: MockLdapSession) -> DirectoryRepository {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        let pool = Arc::new(ConnectionPool::empty(Arc::new(connector), 1));
        DirectoryRepository::new(Box::new(session), pool)
    }

    fn config() -> DirectoryConfig {
        DirectoryConfig::new("ldap://ldap.example.com", "dc=x,dc=y")
    }

    #[test]
    fn user_ref_classification() {
        assert_eq!(UserRef::parse("jdoe").unwrap(), UserRef::Name("jdoe"));
        assert_eq!(
            UserRef::parse("uid=jdoe,dc=x,dc=y").unwrap(),
            UserRef::Dn("uid=jdoe,dc=x,dc=y")
        );
        assert!(matches!(UserRef::parse("cn=onlyone"), Err(Error::InvalidInput(_))));
        assert!(matches!(UserRef::parse("jd*"), Err(Error::InvalidInput(_))));
        assert!(matches!(UserRef::parse(""), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn empty_search_synthesizes_dn() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .withf(|request| {
                request.base_dn == "dc=x,dc=y"
                    && request.scope == SearchScope::Subtree
                    && request.filter == "(uid=jdoe)"
                    && request.attributes == vec!["dn".to_string()]
            })
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let dn = resolve_user_dn(&mut repo(session), &config(), UserRef::Name("jdoe")).await;
        assert_eq!(dn, "uid=jdoe,dc=x,dc=y");
    }

    #[tokio::test]
    async fn failed_search_synthesizes_dn() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .times(1)
            .returning(|_| Err(Error::Search("rc=32: noSuchObject".to_string())));

        let cfg = config().with_user_attribute("sAMAccountName");
        let dn = resolve_user_dn(&mut repo(session), &cfg, UserRef::Name("jdoe")).await;
        assert_eq!(dn, "sAMAccountName=jdoe,dc=x,dc=y");
    }

    #[tokio::test]
    async fn search_hit_wins_and_extra_filter_is_applied() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .withf(|request| request.filter == "(&(uid=jdoe)(objectClass=person))")
            .times(1)
            .returning(|_| {
                Ok(vec![
                    LdapEntry::new("uid=jdoe,ou=people,dc=x,dc=y"),
                    LdapEntry::new("uid=jdoe,ou=legacy,dc=x,dc=y"),
                ])
            });

        let cfg = config().with_user_filter("(objectClass=person)");
        let dn = resolve_user_dn(&mut repo(session), &cfg, UserRef::Name("jdoe")).await;
        assert_eq!(dn, "uid=jdoe,ou=people,dc=x,dc=y");
    }

    #[tokio::test]
    async fn explicit_dn_skips_the_search() {
        let mut session = MockLdapSession::new();
        session.expect_search().never();

        let dn = resolve_user_dn(
            &mut repo(session),
            &config(),
            UserRef::Dn("cn=John Doe,ou=people,dc=x,dc=y"),
        )
        .await;
        assert_eq!(dn, "cn=John Doe,ou=people,dc=x,dc=y");
    }

    #[tokio::test]
    async fn rejected_service_bind_is_not_a_credential_error() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .times(1)
            .returning(|_, _| Err(Error::Bind("rc=49: invalidCredentials".to_string())));

        let credentials = ServiceCredentials::new("cn=svc,dc=x,dc=y", "wrong");
        let err = service_bind(&mut repo(session), &credentials).await.unwrap_err();
        assert!(matches!(err, Error::ServiceBindFailed(_)));
    }

    #[tokio::test]
    async fn missing_service_account_is_not_an_anonymous_bind() {
        let mut session = MockLdapSession::new();
        session.expect_simple_bind().never();

        let credentials = ServiceCredentials::new("", "");
        let err = service_bind(&mut repo(session), &credentials).await.unwrap_err();
        assert!(matches!(err, Error::ServiceBindFailed(_)));
    }

    #[tokio::test]
    async fn unreachable_service_bind_passes_through() {
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .times(1)
            .returning(|_, _| Err(Error::DirectoryUnreachable("bind timed out".to_string())));

        let credentials = ServiceCredentials::new("cn=svc,dc=x,dc=y", "secret");
        let err = service_bind(&mut repo(session), &credentials).await.unwrap_err();
        assert!(matches!(err, Error::DirectoryUnreachable(_)));
    }
}
