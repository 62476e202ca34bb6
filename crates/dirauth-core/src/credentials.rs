//! Service-account credentials.
//!
//! The service account binds before a user's own identity is known so that the user's DN
//! and groups can be searched. The password is kept in a [`SecretString`] and is only
//! exposed at the moment of the bind.

use secrecy::{ExposeSecret, SecretString};

/// Username/password pair of the directory service account.
#[derive(Debug)]
pub struct ServiceCredentials {
    username: String,
    password: SecretString,
}

impl ServiceCredentials {
    /// Create new service credentials.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Bind DN (or bind name) of the service account.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Service account password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns true if no service account has been configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
    }
}

impl Clone for ServiceCredentials {
    fn clone(&self) -> Self {
        Self::new(self.username.clone(), self.password().to_string())
    }
}
