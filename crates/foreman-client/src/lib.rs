//! # Foreman Client
//!
//! HTTP transport for the `foreman-state` reconciliation engine.
//!
//! [`ForemanClient`] implements [`foreman_state::ApiTransport`] with
//! `reqwest`, adding basic authentication, certificate verification control,
//! timeouts and request logging.
//!
//! ## Example
//!
//! ```ignore
//! use foreman_client::prelude::*;
//! use foreman_state::prelude::*;
//! use serde_json::json;
//!
//! let config = ForemanConfig::new("https://foreman.example.com")
//!     .with_basic_auth("admin", "changeme")
//!     .with_verify_certificate(false);
//! let enforcer = StateEnforcer::with_foreman_defaults(ForemanClient::new(config)?);
//!
//! let record = Record::try_from(json!({"domain": {"name": "lab.local"}}))?;
//! let receipt = enforcer.ensure_state("present", record).await?;
//! ```

pub mod client;
pub mod config;
pub mod error;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::ForemanClient;
    pub use crate::config::{AuthConfig, ForemanConfig, LogVerbosity};
    pub use crate::error::{ClientError, ClientResult};
}

pub use client::ForemanClient;
pub use config::{AuthConfig, ConnectionSettings, ForemanConfig, LogVerbosity, TlsConfig};
pub use error::{ClientError, ClientResult};
