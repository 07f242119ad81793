//! Error types for setting up the Foreman HTTP client.
//!
//! Failures of individual API calls are reported as
//! [`foreman_state::ApiCallError`] so the engine can classify them.

use thiserror::Error;

/// Errors raised while configuring or building a [`crate::ForemanClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// A required environment variable is not set.
    #[error("missing configuration: environment variable {var} is not set")]
    ConfigMissing { var: String },

    /// A configuration value could not be used.
    #[error("invalid configuration for {field}: {reason}")]
    ConfigInvalid { field: String, reason: String },

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {message}")]
    ClientBuild {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ClientError {
    /// Create an invalid configuration error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ClientError::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Get a stable error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            ClientError::ConfigMissing { .. } => "CONFIG_MISSING",
            ClientError::ConfigInvalid { .. } => "CONFIG_INVALID",
            ClientError::ClientBuild { .. } => "CLIENT_BUILD",
        }
    }
}

/// Result type for client setup.
pub type ClientResult<T> = Result<T, ClientError>;
