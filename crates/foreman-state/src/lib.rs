//! # Foreman State
//!
//! Declarative state reconciliation for the Foreman REST API.
//!
//! Given a minimal record describing the fields a caller cares about, the
//! engine reads the live record, decides whether it matches, and performs the
//! single create, update or delete needed to converge.
//!
//! ## Architecture
//!
//! - [`Record`] - Typed record with optional dependency records
//! - [`EndpointResolver`] - Maps records to API paths and lookup queries
//! - [`normalize`] - Rewrites read-shape fields into write-shape fields
//! - [`RecordComparator`] - Minimal-driven structural comparison
//! - [`StateEnforcer`] - Read, compare and act, producing a [`ModificationReceipt`]
//! - [`ApiTransport`] - The HTTP seam; `foreman-client` provides one over reqwest
//!
//! ## Example
//!
//! ```ignore
//! use foreman_state::prelude::*;
//! use serde_json::json;
//!
//! let enforcer = StateEnforcer::with_foreman_defaults(transport);
//! let record = Record::try_from(json!({"environment": {"name": "production"}}))?;
//!
//! let receipt = enforcer.ensure_state("present", record).await?;
//! println!("changed: {} ({})", receipt.changed(), receipt.reason());
//! ```

pub mod compare;
pub mod config;
pub mod endpoint;
pub mod enforcer;
pub mod error;
pub mod normalize;
pub mod path;
pub mod receipt;
pub mod record;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Error handling
    pub use crate::error::{ApiCallError, StateError, StateResult};

    // Records and receipts
    pub use crate::receipt::{ChangeDecision, ChangeReason, DesiredState, ModificationReceipt};
    pub use crate::record::Record;

    // Configuration
    pub use crate::config::{ApiMappings, IdentificationMode, PropertyMapping};

    // Engine
    pub use crate::compare::{Comparison, RecordComparator};
    pub use crate::endpoint::EndpointResolver;
    pub use crate::enforcer::StateEnforcer;
    pub use crate::transport::{ApiTransport, HttpMethod};
}

// Re-exports
pub use compare::{values_equivalent, Comparison, RecordComparator};
pub use config::{ApiMappings, ComparisonExceptions, IdentificationMode, PropertyMapping};
pub use endpoint::{EndpointResolver, RecordQuery};
pub use enforcer::StateEnforcer;
pub use error::{ApiCallError, StateError, StateResult};
pub use normalize::normalize;
pub use path::{PathSegment, PropertyPath};
pub use receipt::{ChangeDecision, ChangeReason, DesiredState, ModificationReceipt};
pub use record::Record;
pub use transport::{ApiTransport, HttpMethod};
