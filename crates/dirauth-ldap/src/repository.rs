//! Bind/search wrapper around one checked-out session.

use dirauth_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::pool::{close_session, ConnectionPool};
use crate::session::{LdapEntry, LdapSession, SearchRequest};

/// Outcome of a best-effort lookup.
///
/// "Failed" and "nothing found" usually lead to the same fallback, but they are kept
/// apart so the reason shows up in logs and can be told apart in code.
#[derive(Debug)]
pub enum Lookup<T> {
    /// The lookup produced a value.
    Found(T),
    /// The lookup ran and matched nothing.
    NotFound,
    /// The lookup itself failed.
    Failed(Error),
}

impl<T> Lookup<T> {
    /// Short description for log fields.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::NotFound => "not found",
            Self::Failed(_) => "failed",
        }
    }
}

/// One checked-out directory connection.
///
/// Must be given back with [`release`](Self::release) or [`discard`](Self::discard);
/// both are idempotent. A connection that hit a transport failure is never pooled again.
pub struct DirectoryRepository {
    session: Option<Box<dyn LdapSession>>,
    pool: Arc<ConnectionPool>,
    broken: bool,
}

impl DirectoryRepository {
    pub(crate) fn new(session: Box<dyn LdapSession>, pool: Arc<ConnectionPool>) -> Self {
        Self {
            session: Some(session),
            pool,
            broken: false,
        }
    }

    fn session(&mut self) -> Result<&mut Box<dyn LdapSession>> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::DirectoryUnreachable("connection already released".to_string()))
    }

    /// Simple bind on the held connection.
    ///
    /// # Errors
    ///
    /// [`Error::Bind`] when the directory rejects the credentials,
    /// [`Error::DirectoryUnreachable`] on transport failure.
    pub async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self.session()?.simple_bind(dn, password).await;
        if let Err(Error::DirectoryUnreachable(reason)) = &result {
            self.mark_broken(reason);
        }
        result
    }

    /// Search on the held connection.
    ///
    /// # Errors
    ///
    /// [`Error::Search`] on any transport or protocol failure.
    pub async fn search(&mut self, request: &SearchRequest) -> Result<Vec<LdapEntry>> {
        debug!(
            base = %request.base_dn,
            scope = ?request.scope,
            filter = %request.filter,
            "directory search"
        );
        let result = match self.session() {
            Ok(session) => session.search(request).await,
            Err(err) => return Err(Error::Search(err.to_string())),
        };
        match result {
            Err(Error::DirectoryUnreachable(reason)) => {
                self.mark_broken(&reason);
                Err(Error::Search(reason))
            }
            other => other,
        }
    }

    /// Search, folding errors and empty results into a [`Lookup`].
    pub async fn lookup(&mut self, request: &SearchRequest) -> Lookup<Vec<LdapEntry>> {
        match self.search(request).await {
            Ok(entries) if entries.is_empty() => Lookup::NotFound,
            Ok(entries) => Lookup::Found(entries),
            Err(err) => Lookup::Failed(err),
        }
    }

    /// Give the connection back to the pool it came from. A broken connection is dropped
    /// instead, so the next acquire dials a fresh one.
    pub async fn release(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if self.broken {
            debug!("dropping broken directory connection");
            drop(session);
        } else {
            self.pool.release(session).await;
        }
    }

    /// Close the connection instead of pooling it (e.g. after binding as an end user).
    pub async fn discard(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if !self.broken {
            close_session(session).await;
        }
    }

    /// Returns true while the repository still holds its connection.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.session.is_some()
    }

    /// Returns true once an operation failed at the transport level.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn mark_broken(&mut self, reason: &str) {
        if self.session.is_some() && !self.broken {
            warn!("directory connection failed, it will not be reused: {reason}");
            self.broken = true;
        }
    }
}

impl Drop for DirectoryRepository {
    fn drop(&mut self) {
        if self.session.is_some() {
            debug!("directory connection dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockLdapConnector, MockLdapSession, SearchScope};

    fn empty_pool() -> Arc<ConnectionPool> {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        Arc::new(ConnectionPool::empty(Arc::new(connector), 2))
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let pool = empty_pool();
        let mut session = MockLdapSession::new();
        session.expect_unbind().never();
        let mut repo = DirectoryRepository::new(Box::new(session), pool.clone());

        repo.release().await;
        repo.release().await;
        assert!(!repo.is_held());
        assert_eq!(pool.idle_count().await, 1);
    }

    #[tokio::test]
    async fn operations_after_release_fail() {
        let mut repo = DirectoryRepository::new(Box::new(MockLdapSession::new()), empty_pool());
        repo.release().await;

        assert!(matches!(
            repo.bind("cn=x,dc=y", "pw").await,
            Err(Error::DirectoryUnreachable(_))
        ));
        let request = SearchRequest::new("dc=y", SearchScope::Base, "(objectClass=*)");
        assert!(matches!(repo.search(&request).await, Err(Error::Search(_))));
    }

    #[tokio::test]
    async fn discard_closes_instead_of_pooling() {
        let pool = empty_pool();
        let mut session = MockLdapSession::new();
        session.expect_unbind().times(1).returning(|| Ok(()));
        let mut repo = DirectoryRepository::new(Box::new(session), pool.clone());

        repo.discard().await;
        repo.release().await;
        assert_eq!(pool.idle_count().await, 0);
    }

    #[tokio::test]
    async fn lookup_distinguishes_empty_from_failure() {
        let mut session = MockLdapSession::new();
        let mut calls = 0;
        session.expect_search().times(3).returning(move |_| {
            calls += 1;
            match calls {
                1 => Ok(Vec::new()),
                2 => Err(Error::Search("rc=32: no such object".to_string())),
                _ => Ok(vec![LdapEntry::new("uid=jdoe,dc=y")]),
            }
        });
        let mut repo = DirectoryRepository::new(Box::new(session), empty_pool());
        let request = SearchRequest::new("dc=y", SearchScope::Subtree, "(uid=jdoe)");

        assert!(matches!(repo.lookup(&request).await, Lookup::NotFound));
        assert!(matches!(repo.lookup(&request).await, Lookup::Failed(_)));
        let lookup = repo.lookup(&request).await;
        assert_eq!(lookup.outcome(), "found");
        let Lookup::Found(entries) = lookup else {
            panic!("expected entries");
        };
        assert_eq!(entries[0].dn, "uid=jdoe,dc=y");
        // a rejected search leaves the connection reusable
        assert!(!repo.is_broken());
    }

    #[tokio::test]
    async fn unreachable_bind_keeps_connection_out_of_the_pool() {
        let pool = empty_pool();
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .times(1)
            .returning(|_, _| Err(Error::DirectoryUnreachable("broken pipe".to_string())));
        session.expect_unbind().never();
        let mut repo = DirectoryRepository::new(Box::new(session), pool.clone());

        let err = repo.bind("cn=svc,dc=y", "pw").await.unwrap_err();
        assert!(matches!(err, Error::DirectoryUnreachable(_)));
        assert!(repo.is_broken());

        repo.release().await;
        assert!(!repo.is_held());
        assert_eq!(pool.idle_count().await, 0);
    }

    #[tokio::test]
    async fn timed_out_search_is_a_search_error_and_not_pooled() {
        let pool = empty_pool();
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .times(1)
            .returning(|_| Err(Error::DirectoryUnreachable("search timed out".to_string())));
        let mut repo = DirectoryRepository::new(Box::new(session), pool.clone());
        let request = SearchRequest::new("dc=y", SearchScope::Base, "(objectClass=*)");

        assert_eq!(
            repo.search(&request).await.unwrap_err(),
            Error::Search("search timed out".to_string())
        );
        repo.release().await;
        assert_eq!(pool.idle_count().await, 0);
    }

    #[tokio::test]
    async fn rejected_bind_stays_poolable() {
        let pool = empty_pool();
        let mut session = MockLdapSession::new();
        session
            .expect_simple_bind()
            .times(1)
            .returning(|_, _| Err(Error::Bind("rc=49: invalidCredentials".to_string())));
        let mut repo = DirectoryRepository::new(Box::new(session), pool.clone());

        assert!(repo.bind("cn=svc,dc=y", "wrong").await.is_err());
        assert!(!repo.is_broken());
        repo.release().await;
        assert_eq!(pool.idle_count().await, 1);
    }
}
