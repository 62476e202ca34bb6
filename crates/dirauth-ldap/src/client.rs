//! Directory client: the current configuration, its TLS settings and the pool built from
//! them, swappable at runtime.

use dirauth_core::{DirectoryConfig, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::pool::ConnectionPool;
use crate::repository::DirectoryRepository;
use crate::session::{ConnectionTarget, ConnectorFactory, LdapConnectorFactory};
use crate::tls::TlsSettings;

struct ClientState {
    config: DirectoryConfig,
    tls: TlsSettings,
    pool: Arc<ConnectionPool>,
}

/// Hands out directory connections for the active configuration.
pub struct DirectoryClient {
    factory: Arc<dyn ConnectorFactory>,
    state: RwLock<ClientState>,
}

impl DirectoryClient {
    /// Creates a client that dials real directory servers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCaCertificate`](dirauth_core::Error::InvalidCaCertificate)
    /// if the configured CA cannot be loaded.
    pub async fn new(config: DirectoryConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(LdapConnectorFactory)).await
    }

    /// Creates a client using a custom [`ConnectorFactory`].
    ///
    /// # Errors
    ///
    /// Same as [`DirectoryClient::new`].
    pub async fn with_factory(
        config: DirectoryConfig,
        factory: Arc<dyn ConnectorFactory>,
    ) -> Result<Self> {
        let tls = TlsSettings::from_config(&config)?;
        let pool = build_pool(factory.as_ref(), &config, &tls).await;

        Ok(Self {
            factory,
            state: RwLock::new(ClientState { config, tls, pool }),
        })
    }

    /// Check out a connection from the current pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DirectoryUnreachable`](dirauth_core::Error::DirectoryUnreachable)
    /// when no idle connection exists and dialing fails.
    pub async fn acquire(&self) -> Result<DirectoryRepository> {
        let pool = self.state.read().await.pool.clone();
        let session = pool.acquire().await?;
        Ok(DirectoryRepository::new(session, pool))
    }

    /// Switch to a new configuration.
    ///
    /// TLS settings are built before anything is torn down, so a bad CA leaves the current
    /// configuration and pool installed and usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCaCertificate`](dirauth_core::Error::InvalidCaCertificate)
    /// if the new CA cannot be loaded.
    pub async fn reconfigure(&self, config: DirectoryConfig) -> Result<()> {
        let tls = TlsSettings::from_config(&config)?;

        let mut state = self.state.write().await;
        state.pool.close().await;
        let pool = build_pool(self.factory.as_ref(), &config, &tls).await;

        info!(
            enabled = config.enabled,
            url = %config.server_url,
            pool_size = config.pool_size,
            "directory client reconfigured"
        );
        *state = ClientState { config, tls, pool };
        Ok(())
    }

    /// Close every idle connection.
    pub async fn shutdown(&self) {
        self.state.write().await.pool.close().await;
        debug!("directory client shut down");
    }

    /// The active configuration.
    pub async fn config(&self) -> DirectoryConfig {
        self.state.read().await.config.clone()
    }

    /// TLS settings of the active configuration.
    pub async fn tls(&self) -> TlsSettings {
        self.state.read().await.tls.clone()
    }

    /// Idle connections held by the current pool.
    pub async fn idle_connections(&self) -> usize {
        let pool = self.state.read().await.pool.clone();
        pool.idle_count().await
    }
}

async fn build_pool(
    factory: &dyn ConnectorFactory,
    config: &DirectoryConfig,
    tls: &TlsSettings,
) -> Arc<ConnectionPool> {
    let connector = factory.connector(ConnectionTarget {
        url: config.server_url.clone(),
        tls: tls.clone(),
        timeout: config.timeout(),
    });

    if config.enabled {
        Arc::new(ConnectionPool::new(connector, config.pool_size).await)
    } else {
        Arc::new(ConnectionPool::empty(connector, config.pool_size))
    }
}
