//! Entry point for callers: authentication, group and permission lookups, and
//! administration of the directory settings.

use dirauth_core::{
    compute_permissions, DirectoryConfig, DirectoryStore, Error, GroupPermission,
    PermissionResult, Result, ServiceCredentials,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{self, AuthenticatedUser, UserRef};
use crate::client::DirectoryClient;
use crate::filter::MATCH_ALL;
use crate::groups;
use crate::session::{SearchRequest, SearchScope};
use crate::tls::TlsSettings;

/// Directory-backed authentication and authorization.
///
/// Configuration and service credentials are read from the store on every call, so
/// changes made through another instance are picked up without a restart. Only the
/// connection pool is tied to the configuration this instance last applied.
pub struct DirectoryService {
    store: Arc<dyn DirectoryStore>,
    client: DirectoryClient,
}

impl DirectoryService {
    /// Build a service from the stored configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the configuration cannot be read and
    /// [`Error::InvalidCaCertificate`] if its CA cannot be loaded.
    pub async fn new(store: Arc<dyn DirectoryStore>) -> Result<Self> {
        let config = store.get_config().await?;
        let client = DirectoryClient::new(config).await?;
        Ok(Self::with_client(store, client))
    }

    /// Build a service around an existing client.
    #[must_use]
    pub fn with_client(store: Arc<dyn DirectoryStore>, client: DirectoryClient) -> Self {
        Self { store, client }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &DirectoryClient {
        &self.client
    }

    /// Verify a password against the directory.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for a malformed identifier (nothing is sent)
    /// - [`Error::DirectoryDisabled`] when the integration is off
    /// - [`Error::ServiceBindFailed`] when the service account is rejected
    /// - [`Error::DirectoryUnreachable`] when the server cannot be reached
    /// - [`Error::InvalidCredentials`] when the user bind is rejected, including for an
    ///   unknown user or an empty password
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<AuthenticatedUser> {
        let user = UserRef::parse(identifier)?;
        let config = self.enabled_config().await?;

        // An empty password would turn the user bind into an unauthenticated bind, which
        // most servers accept.
        if password.is_empty() {
            warn!(target: "dirauth::audit", identifier = %identifier, "empty password rejected");
            return Err(Error::InvalidCredentials);
        }

        let credentials = self.store.get_service_credentials().await?;
        let dn = auth::authenticate(&self.client, &config, &credentials, user, password).await?;
        Ok(AuthenticatedUser::new(identifier, dn))
    }

    /// Short names of the groups the user belongs to.
    ///
    /// # Errors
    ///
    /// As [`authenticate`](Self::authenticate) up to the service bind, plus
    /// [`Error::Search`] if the group-entry search fails.
    pub async fn resolve_groups(&self, identifier: &str) -> Result<Vec<String>> {
        let (_, groups) = self.groups_with_config(identifier).await?;
        Ok(groups)
    }

    /// Namespace permissions derived from the user's groups.
    ///
    /// # Errors
    ///
    /// As [`resolve_groups`](Self::resolve_groups), plus [`Error::Store`] if the
    /// permission table cannot be read.
    pub async fn resolve_permissions(&self, identifier: &str) -> Result<PermissionResult> {
        let (config, groups) = self.groups_with_config(identifier).await?;
        let table = self.store.get_group_permissions().await?;
        Ok(compute_permissions(&groups, &config.admin_groups, &table))
    }

    /// Check the configured required group. Succeeds without a lookup when none is set.
    ///
    /// # Errors
    ///
    /// As [`resolve_groups`](Self::resolve_groups), plus
    /// [`Error::NotInRequiredGroup`] when the user is not a member.
    pub async fn validate_group_membership(&self, identifier: &str) -> Result<()> {
        let user = UserRef::parse(identifier)?;
        let config = self.enabled_config().await?;
        let Some(required) = config.required_group().map(str::to_string) else {
            return Ok(());
        };

        let groups = self.groups_for(user, &config).await?;
        if groups
            .iter()
            .any(|group| group.eq_ignore_ascii_case(&required))
        {
            return Ok(());
        }

        warn!(
            target: "dirauth::audit",
            identifier = %identifier,
            required_group = %required,
            "user is not a member of the required group"
        );
        Err(Error::NotInRequiredGroup(required))
    }

    /// Validate, store and apply a new configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] or [`Error::InvalidCaCertificate`] for an unusable configuration
    /// (nothing is stored), [`Error::Store`] if it cannot be saved.
    pub async fn update_config(&self, config: DirectoryConfig) -> Result<()> {
        config.check()?;
        TlsSettings::from_config(&config)?;

        self.store.update_config(config.clone()).await?;
        self.client.reconfigure(config).await?;
        info!("directory configuration updated");
        Ok(())
    }

    /// Replace the group-permission table.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidInput`] for rows with an empty group or namespace name,
    /// [`Error::Store`] if the table cannot be saved.
    pub async fn update_group_permissions(&self, table: Vec<GroupPermission>) -> Result<()> {
        for row in &table {
            if row.group_name.trim().is_empty() {
                return Err(Error::InvalidInput("group name cannot be empty".to_string()));
            }
            if row.namespaces.iter().any(|grant| grant.namespace.trim().is_empty()) {
                return Err(Error::InvalidInput(format!(
                    "group `{}` has a permission with an empty namespace",
                    row.group_name
                )));
            }
        }

        self.store.update_group_permissions(table).await?;
        info!("group permissions updated");
        Ok(())
    }

    /// Replace the service-account credentials.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] if they cannot be saved.
    pub async fn update_service_credentials(&self, credentials: ServiceCredentials) -> Result<()> {
        self.store.update_service_credentials(credentials).await
    }

    /// Bind as the service account and read the base entry.
    ///
    /// # Errors
    ///
    /// [`Error::DirectoryDisabled`], [`Error::DirectoryUnreachable`],
    /// [`Error::ServiceBindFailed`] or [`Error::Search`] describing the first step that
    /// failed.
    pub async fn test_connection(&self) -> Result<()> {
        let config = self.enabled_config().await?;
        let credentials = self.store.get_service_credentials().await?;

        let mut repo = self.client.acquire().await?;
        let result = async {
            auth::service_bind(&mut repo, &credentials).await?;
            let request = SearchRequest::new(&config.base_dn, SearchScope::Base, MATCH_ALL)
                .with_attributes(["1.1"]);
            repo.search(&request).await.map(|_| ())
        }
        .await;
        repo.release().await;

        if result.is_ok() {
            info!(url = %config.server_url, "directory connection test succeeded");
        }
        result
    }

    /// Close pooled connections.
    pub async fn shutdown(&self) {
        self.client.shutdown().await;
    }

    async fn enabled_config(&self) -> Result<DirectoryConfig> {
        let config = self.store.get_config().await?;
        if !config.enabled {
            return Err(Error::DirectoryDisabled);
        }
        Ok(config)
    }

    async fn groups_with_config(
        &self,
        identifier: &str,
    ) -> Result<(DirectoryConfig, Vec<String>)> {
        let user = UserRef::parse(identifier)?;
        let config = self.enabled_config().await?;
        let groups = self.groups_for(user, &config).await?;
        Ok((config, groups))
    }

    async fn groups_for(
        &self,
        user: UserRef<'_>,
        config: &DirectoryConfig,
    ) -> Result<Vec<String>> {
        let credentials = self.store.get_service_credentials().await?;

        let mut repo = self.client.acquire().await?;
        let result = async {
            auth::service_bind(&mut repo, &credentials).await?;
            let dn = auth::resolve_user_dn(&mut repo, config, user).await;
            groups::resolve_groups(&mut repo, config, &dn).await
        }
        .await;
        repo.release().await;
        result
    }
}
