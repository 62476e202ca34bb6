//! Connection pool for directory sessions.
//!
//! The pool bounds how many *idle* sessions are kept, not how many may be open: acquire
//! never waits and dials a fresh session whenever the idle list is empty. Sessions handed
//! out are unbound; whoever checks one out binds it for their own purpose.

use dirauth_core::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::session::{LdapConnector, LdapSession};

/// Number of sessions dialed eagerly when a pool is built.
pub const WARM_CONNECTIONS: usize = 2;

/// Fixed-capacity idle list in front of an [`LdapConnector`].
pub struct ConnectionPool {
    connector: Arc<dyn LdapConnector>,
    idle: Mutex<Vec<Box<dyn LdapSession>>>,
    capacity: usize,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Build a pool and dial up to `min(2, capacity)` sessions.
    ///
    /// Dial failures during warm-up are logged and leave the pool emptier; they never
    /// fail construction.
    pub async fn new(connector: Arc<dyn LdapConnector>, capacity: usize) -> Self {
        let pool = Self::empty(connector, capacity);

        for _ in 0..capacity.min(WARM_CONNECTIONS) {
            match pool.connector.connect().await {
                Ok(session) => pool.idle.lock().await.push(session),
                Err(err) => warn!("failed to pre-establish directory connection: {err}"),
            }
        }

        pool
    }

    /// Build a pool without dialing anything.
    #[must_use]
    pub fn empty(connector: Arc<dyn LdapConnector>, capacity: usize) -> Self {
        Self {
            connector,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Take an idle session, or dial a new one when none is idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryUnreachable`](dirauth_core::Error::DirectoryUnreachable)
    /// when a fresh dial fails.
    pub async fn acquire(&self) -> Result<Box<dyn LdapSession>> {
        let reused = self.idle.lock().await.pop();
        if let Some(session) = reused {
            debug!("reusing idle directory connection");
            return Ok(session);
        }

        debug!("no idle directory connection, dialing");
        self.connector.connect().await
    }

    /// Return a session. It is kept if there is room, otherwise closed.
    pub async fn release(&self, session: Box<dyn LdapSession>) {
        let overflow = {
            let mut idle = self.idle.lock().await;
            if self.closed.load(Ordering::Acquire) || idle.len() >= self.capacity {
                Some(session)
            } else {
                idle.push(session);
                None
            }
        };

        if let Some(session) = overflow {
            debug!("directory pool full or closed, closing connection");
            close_session(session).await;
        }
    }

    /// Close every idle session. Later releases close their session instead of keeping it;
    /// later acquires still dial.
    pub async fn close(&self) {
        let drained = {
            let mut idle = self.idle.lock().await;
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *idle)
        };

        debug!(count = drained.len(), "closing directory pool");
        for session in drained {
            close_session(session).await;
        }
    }

    /// Number of idle sessions.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }

    /// Maximum number of idle sessions kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub(crate) async fn close_session(mut session: Box<dyn LdapSession>) {
    if let Err(err) = session.unbind().await {
        debug!("error while closing directory connection: {err}");
    }
}
