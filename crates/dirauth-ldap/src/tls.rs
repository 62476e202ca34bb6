//! TLS settings for directory connections.

use dirauth_core::{DirectoryConfig, Error, Result};
use ldap3::LdapConnSettings;
use native_tls::{Certificate, TlsConnector};
use std::fmt;
use tracing::warn;

/// TLS configuration derived from a [`DirectoryConfig`].
///
/// Holds a prebuilt connector only when the platform defaults are not good enough, i.e.
/// a custom CA is trusted or verification is switched off.
#[derive(Clone)]
pub struct TlsSettings {
    server_name: String,
    connector: Option<TlsConnector>,
    custom_ca: bool,
    skip_verify: bool,
}

impl TlsSettings {
    /// Platform trust roots with full verification.
    #[must_use]
    pub fn platform(server_url: &str) -> Self {
        Self {
            server_name: server_name(server_url),
            connector: None,
            custom_ca: false,
            skip_verify: false,
        }
    }

    /// Build TLS settings for a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCaCertificate`] if the configured CA is not valid PEM, and
    /// [`Error::Config`] if the TLS backend refuses the resulting settings.
    pub fn from_config(config: &DirectoryConfig) -> Result<Self> {
        let mut settings = Self::platform(&config.server_url);
        settings.skip_verify = config.insecure_skip_verify;

        let ca = config
            .ca_certificate()
            .map(|pem| {
                Certificate::from_pem(pem.as_bytes())
                    .map_err(|err| Error::InvalidCaCertificate(err.to_string()))
            })
            .transpose()?;
        settings.custom_ca = ca.is_some();

        if settings.skip_verify {
            warn!(
                server = %settings.server_name,
                "TLS certificate verification disabled for directory connections"
            );
        }

        if ca.is_none() && !settings.skip_verify {
            return Ok(settings);
        }

        let mut builder = TlsConnector::builder();
        if let Some(certificate) = ca {
            builder.disable_built_in_roots(true);
            builder.add_root_certificate(certificate);
        }
        if settings.skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }

        let connector = builder.build().map_err(|err| {
            if settings.custom_ca {
                Error::InvalidCaCertificate(err.to_string())
            } else {
                Error::Config(format!("failed to construct TLS connector: {err}"))
            }
        })?;
        settings.connector = Some(connector);

        Ok(settings)
    }

    /// Host name the server certificate is expected to carry.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Returns true if a custom CA replaces the platform roots.
    #[must_use]
    pub const fn has_custom_ca(&self) -> bool {
        self.custom_ca
    }

    /// Returns true if certificate verification is disabled.
    #[must_use]
    pub const fn is_insecure(&self) -> bool {
        self.skip_verify
    }

    pub(crate) fn apply(&self, settings: LdapConnSettings) -> LdapConnSettings {
        let mut settings = settings;
        if let Some(connector) = &self.connector {
            settings = settings.set_connector(connector.clone());
        }
        if self.skip_verify {
            settings = settings.set_no_tls_verify(true);
        }
        settings
    }
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("server_name", &self.server_name)
            .field("custom_ca", &self.custom_ca)
            .field("skip_verify", &self.skip_verify)
            .finish_non_exhaustive()
    }
}

/// Strips the scheme and a trailing `:port` from a server URL.
fn server_name(server_url: &str) -> String {
    let url = server_url.trim();
    let without_scheme = ["ldaps://", "ldap://"]
        .iter()
        .find_map(|scheme| {
            url.get(..scheme.len())
                .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
                .map(|_| &url[scheme.len()..])
        })
        .unwrap_or(url);
    let host = without_scheme.split('/').next().unwrap_or(without_scheme);

    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            name.to_string()
        }
        _ => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> DirectoryConfig {
        DirectoryConfig::new(url, "dc=example,dc=com")
    }

    #[test]
    fn server_name_strips_scheme_and_port() {
        assert_eq!(server_name("ldaps://ldap.example.com:636"), "ldap.example.com");
        assert_eq!(server_name("ldap://ldap.example.com"), "ldap.example.com");
        assert_eq!(server_name("LDAPS://AD.corp:3269/"), "AD.corp");
        assert_eq!(server_name("ldap.example.com:389"), "ldap.example.com");
    }

    #[test]
    fn default_settings_use_platform_roots() {
        let tls = TlsSettings::from_config(&config("ldaps://ldap.example.com:636")).unwrap();
        assert_eq!(tls.server_name(), "ldap.example.com");
        assert!(!tls.has_custom_ca());
        assert!(!tls.is_insecure());
        assert!(tls.connector.is_none());
    }

    #[test]
    fn invalid_ca_is_rejected() {
        let cfg = config("ldaps://ldap.example.com").with_ca_certificate("not a certificate");
        let err = TlsSettings::from_config(&cfg).unwrap_err();
        assert!(matches!(err, Error::InvalidCaCertificate(_)));
    }

    #[test]
    fn insecure_flag_is_applied_as_supplied() {
        let cfg = config("ldaps://ldap.example.com").with_insecure_skip_verify(true);
        let tls = TlsSettings::from_config(&cfg).unwrap();
        assert!(tls.is_insecure());
        assert!(tls.connector.is_some());
    }

    #[test]
    fn debug_output_is_compact() {
        let tls = TlsSettings::platform("ldaps://ldap.example.com");
        let debug = format!("{tls:?}");
        assert!(debug.contains("ldap.example.com"));
    }
}
