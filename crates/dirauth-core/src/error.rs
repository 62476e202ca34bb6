//! Error types for directory operations.
//!
//! One error enum covers local validation, the external configuration store, the
//! directory transport and the authentication outcome. Callers that render errors to
//! end users should go through [`Error::public_message`], which never distinguishes an
//! unknown account from a wrong password.

use thiserror::Error;

/// Main error type for directory authentication and authorization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Identifier or DN rejected locally, no network call was made
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Directory integration is switched off
    #[error("Directory integration is disabled")]
    DirectoryDisabled,

    /// Configuration/credential store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Dial, TLS negotiation or transport failure
    #[error("Directory unreachable: {0}")]
    DirectoryUnreachable(String),

    /// Service account could not bind
    #[error("Service account bind failed: {0}")]
    ServiceBindFailed(String),

    /// End-user bind was rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Bind rejected by the directory (before it is attributed to a principal)
    #[error("Bind rejected: {0}")]
    Bind(String),

    /// Search failed at the protocol or transport level
    #[error("Search failed: {0}")]
    Search(String),

    /// Custom CA certificate could not be parsed
    #[error("Invalid CA certificate: {0}")]
    InvalidCaCertificate(String),

    /// User resolved but is not a member of the required group
    #[error("User is not a member of required group `{0}`")]
    NotInRequiredGroup(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Specialized result type for directory operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::DirectoryDisabled => "DIRECTORY_DISABLED",
            Self::Store(_) => "STORE_ERROR",
            Self::DirectoryUnreachable(_) => "DIRECTORY_UNREACHABLE",
            Self::ServiceBindFailed(_) => "SERVICE_BIND_FAILED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Bind(_) => "BIND_ERROR",
            Self::Search(_) => "SEARCH_ERROR",
            Self::InvalidCaCertificate(_) => "INVALID_CA_CERTIFICATE",
            Self::NotInRequiredGroup(_) => "NOT_IN_REQUIRED_GROUP",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Returns true if this error points at something an operator has to fix.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Store(_)
                | Self::DirectoryUnreachable(_)
                | Self::ServiceBindFailed(_)
                | Self::InvalidCaCertificate(_)
                | Self::Config(_)
        )
    }

    /// Returns true if retrying the same call later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DirectoryUnreachable(_))
    }

    /// Message that is safe to show to the person trying to log in.
    ///
    /// Service-side problems collapse into a generic unavailability message so that a
    /// broken service account is never reported as a bad end-user password.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid username",
            Self::InvalidCredentials | Self::Bind(_) => "invalid username or password",
            Self::DirectoryDisabled => "directory login is not enabled",
            Self::NotInRequiredGroup(_) => "user is not allowed to access this system",
            Self::Store(_)
            | Self::DirectoryUnreachable(_)
            | Self::ServiceBindFailed(_)
            | Self::Search(_)
            | Self::InvalidCaCertificate(_)
            | Self::Config(_) => "directory service is temporarily unavailable",
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(format!("invalid server URL: {err}"))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(err.to_string())
    }
}
