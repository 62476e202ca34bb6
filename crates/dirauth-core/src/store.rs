//! Configuration and credential store port.
//!
//! The store is owned by the surrounding application (a database, a Kubernetes secret, a
//! file). This crate only needs the six operations of [`DirectoryStore`]; every failure is
//! surfaced as [`Error::Store`](crate::Error::Store) and passed through untouched.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::DirectoryConfig;
use crate::credentials::ServiceCredentials;
use crate::permission::GroupPermission;
use crate::Result;

/// Source of directory configuration, group permissions and service credentials.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Load the directory configuration.
    async fn get_config(&self) -> Result<DirectoryConfig>;

    /// Replace the directory configuration.
    async fn update_config(&self, config: DirectoryConfig) -> Result<()>;

    /// Load the group-permission table.
    async fn get_group_permissions(&self) -> Result<Vec<GroupPermission>>;

    /// Replace the group-permission table.
    async fn update_group_permissions(&self, table: Vec<GroupPermission>) -> Result<()>;

    /// Load the service-account credentials.
    async fn get_service_credentials(&self) -> Result<ServiceCredentials>;

    /// Replace the service-account credentials.
    async fn update_service_credentials(&self, credentials: ServiceCredentials) -> Result<()>;
}

/// In-process [`DirectoryStore`].
#[derive(Debug)]
pub struct MemoryStore {
    config: RwLock<DirectoryConfig>,
    permissions: RwLock<Vec<GroupPermission>>,
    credentials: RwLock<ServiceCredentials>,
}

impl MemoryStore {
    /// Create a store holding the given configuration and credentials.
    #[must_use]
    pub fn new(config: DirectoryConfig, credentials: ServiceCredentials) -> Self {
        Self {
            config: RwLock::new(config),
            permissions: RwLock::new(Vec::new()),
            credentials: RwLock::new(credentials),
        }
    }

    /// Seed the group-permission table.
    #[must_use]
    pub fn with_group_permissions(self, table: Vec<GroupPermission>) -> Self {
        Self {
            permissions: RwLock::new(table),
            ..self
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DirectoryConfig::disabled(), ServiceCredentials::new("", ""))
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn get_config(&self) -> Result<DirectoryConfig> {
        Ok(self.config.read().await.clone())
    }

    async fn update_config(&self, config: DirectoryConfig) -> Result<()> {
        debug!(enabled = config.enabled, url = %config.server_url, "storing directory config");
        *self.config.write().await = config;
        Ok(())
    }

    async fn get_group_permissions(&self) -> Result<Vec<GroupPermission>> {
        Ok(self.permissions.read().await.clone())
    }

    async fn update_group_permissions(&self, table: Vec<GroupPermission>) -> Result<()> {
        debug!(rows = table.len(), "storing group permission table");
        *self.permissions.write().await = table;
        Ok(())
    }

    async fn get_service_credentials(&self) -> Result<ServiceCredentials> {
        Ok(self.credentials.read().await.clone())
    }

    async fn update_service_credentials(&self, credentials: ServiceCredentials) -> Result<()> {
        debug!(username = %credentials.username(), "storing service credentials");
        *self.credentials.write().await = credentials;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::PermissionLevel;

    #[test]
    fn test_memory_store_round_trip() {
        tokio_test::block_on(async {
            let store = MemoryStore::default();
            assert!(!store.get_config().await.unwrap().enabled);

            let config = DirectoryConfig::new("ldap://ldap.example.com", "dc=example,dc=com");
            store.update_config(config.clone()).await.unwrap();
            assert_eq!(store.get_config().await.unwrap(), config);

            store
                .update_service_credentials(ServiceCredentials::new("cn=svc", "pw"))
                .await
                .unwrap();
            let creds = store.get_service_credentials().await.unwrap();
            assert_eq!(creds.username(), "cn=svc");
            assert_eq!(creds.password(), "pw");
        });
    }

    #[test]
    fn test_seeded_permissions() {
        let table = vec![GroupPermission::new("dev").grant("apps", PermissionLevel::Edit)];
        let store = MemoryStore::default().with_group_permissions(table.clone());
        let loaded = tokio_test::block_on(store.get_group_permissions()).unwrap();
        assert_eq!(loaded, table);
    }
}
