//! Reconciliation error types
//!
//! Every failure the engine can raise, with the cause chain kept as boxed
//! `#[source]` fields so the deepest error stays inspectable.

use serde_json::Value;
use thiserror::Error;

use crate::transport::HttpMethod;

/// Failure reported by an [`ApiTransport`](crate::transport::ApiTransport).
#[derive(Debug, Clone, Error)]
#[error("{method} {endpoint} failed{}: {message}", status_suffix(.status_code))]
pub struct ApiCallError {
    /// HTTP status, absent when the request never produced a response.
    pub status_code: Option<u16>,
    /// Message extracted from the server's error document, or a generic one.
    pub message: String,
    /// Raw response body when it could not be parsed as an error document.
    pub raw_body: Option<String>,
    pub endpoint: String,
    pub method: HttpMethod,
    /// Request body that was sent, if any.
    pub body: Option<Value>,
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with status {code}"),
        None => String::new(),
    }
}

impl ApiCallError {
    /// Create an error for a response with the given status.
    pub fn new(
        status_code: Option<u16>,
        message: impl Into<String>,
        endpoint: impl Into<String>,
        method: HttpMethod,
    ) -> Self {
        Self {
            status_code,
            message: message.into(),
            raw_body: None,
            endpoint: endpoint.into(),
            method,
            body: None,
        }
    }

    /// Attach the raw response body.
    #[must_use]
    pub fn with_raw_body(mut self, raw_body: impl Into<String>) -> Self {
        self.raw_body = Some(raw_body.into());
        self
    }

    /// Attach the request body.
    #[must_use]
    pub fn with_request_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    /// True when the server answered 404.
    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }
}

/// Error that can occur while resolving, comparing or reconciling records.
#[derive(Debug, Error)]
pub enum StateError {
    // Caller-supplied record problems
    /// The record does not have exactly one type key.
    #[error("malformed record: {message}")]
    MalformedRecord { message: String },

    /// None of the identification properties are present in the body.
    #[error("no identification property present on '{record_type}' record (tried {tried:?})")]
    NoIdentifier {
        record_type: String,
        tried: Vec<String>,
    },

    /// The body has no field usable as a lookup query.
    #[error("no queryable field on '{record_type}' record")]
    NoQueryableField { record_type: String },

    /// A dependency record lacks the id needed to build the URL.
    #[error("dependency '{dependency_type}' of '{record_type}' record has no id")]
    MissingDependencyId {
        record_type: String,
        dependency_type: String,
    },

    /// The desired state was neither present nor absent.
    #[error("invalid desired state '{state}', expected 'present' or 'absent'")]
    InvalidDesiredState { state: String },

    // Mapping table problems
    /// A single-value property mapping selected nothing.
    #[error("mapping for '{record_type}.{property}' resolved no value with path '{path}'")]
    MappingResolution {
        record_type: String,
        property: String,
        path: String,
    },

    /// A property path expression could not be parsed.
    #[error("invalid property path '{path}': {message}")]
    InvalidPropertyPath { path: String, message: String },

    /// Mapping tables failed validation.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Remote state problems
    /// A search returned several candidates that could not be narrowed to one.
    #[error(
        "ambiguous result for '{record_type}' where {query_key}={query_value}: {count} candidates matched"
    )]
    AmbiguousResult {
        record_type: String,
        query_key: String,
        query_value: String,
        count: usize,
    },

    /// A record did not carry the expected type or identifier.
    #[error("identity mismatch: expected {expected}: {message}")]
    IdentityMismatch { expected: String, message: String },

    /// The record returned by a mutation is not the record that was sent.
    #[error("{method} {endpoint} returned a different record than was requested")]
    ModifiedRecordMismatch {
        endpoint: String,
        method: HttpMethod,
        request: Option<Value>,
        response: Value,
        #[source]
        source: Box<StateError>,
    },

    /// Transport failure.
    #[error(transparent)]
    ApiCall(#[from] ApiCallError),

    // Wrappers
    /// A read failed for a reason other than the record being absent.
    #[error("unexpected error while reading '{record_type}' record")]
    UnexpectedRead {
        record_type: String,
        #[source]
        source: Box<StateError>,
    },

    /// A create, update or delete call failed.
    #[error("unexpected error during {operation} of '{record_type}' record")]
    UnexpectedWrite {
        operation: &'static str,
        record_type: String,
        #[source]
        source: Box<StateError>,
    },

    /// A component boundary was crossed while handling `operation`.
    #[error("{operation} failed")]
    Context {
        operation: &'static str,
        #[source]
        source: Box<StateError>,
    },

    /// Outermost wrapper raised by `ensure_state`.
    #[error("failed to ensure '{desired_state}' state for record {record}")]
    Reconciliation {
        desired_state: String,
        record: Value,
        #[source]
        source: Box<StateError>,
    },
}

impl StateError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            StateError::MalformedRecord { .. } => "MALFORMED_RECORD",
            StateError::NoIdentifier { .. } => "NO_IDENTIFIER",
            StateError::NoQueryableField { .. } => "NO_QUERYABLE_FIELD",
            StateError::MissingDependencyId { .. } => "MISSING_DEPENDENCY_ID",
            StateError::InvalidDesiredState { .. } => "INVALID_DESIRED_STATE",
            StateError::MappingResolution { .. } => "MAPPING_RESOLUTION",
            StateError::InvalidPropertyPath { .. } => "INVALID_PROPERTY_PATH",
            StateError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            StateError::AmbiguousResult { .. } => "AMBIGUOUS_RESULT",
            StateError::IdentityMismatch { .. } => "IDENTITY_MISMATCH",
            StateError::ModifiedRecordMismatch { .. } => "MODIFIED_RECORD_MISMATCH",
            StateError::ApiCall(_) => "API_CALL_FAILED",
            StateError::UnexpectedRead { .. } => "UNEXPECTED_READ",
            StateError::UnexpectedWrite { .. } => "UNEXPECTED_WRITE",
            StateError::Context { .. } => "CONTEXT",
            StateError::Reconciliation { .. } => "RECONCILIATION_FAILED",
        }
    }

    /// The wrapped error, for variants that wrap one.
    pub fn inner(&self) -> Option<&StateError> {
        match self {
            StateError::ModifiedRecordMismatch { source, .. }
            | StateError::UnexpectedRead { source, .. }
            | StateError::UnexpectedWrite { source, .. }
            | StateError::Context { source, .. }
            | StateError::Reconciliation { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Walk the wrapper chain down to the error that started it.
    pub fn root_cause(&self) -> &StateError {
        let mut current = self;
        while let Some(inner) = current.inner() {
            current = inner;
        }
        current
    }

    /// The transport failure at the bottom of the chain, if there is one.
    pub fn api_call_error(&self) -> Option<&ApiCallError> {
        match self.root_cause() {
            StateError::ApiCall(err) => Some(err),
            _ => None,
        }
    }

    /// True when the chain bottoms out in a 404 from the server.
    pub fn is_not_found(&self) -> bool {
        self.api_call_error().is_some_and(ApiCallError::is_not_found)
    }

    /// Wrap this error with the name of the operation that was running.
    pub fn context(self, operation: &'static str) -> Self {
        StateError::Context {
            operation,
            source: Box::new(self),
        }
    }

    // Convenience constructors

    /// Create a malformed record error.
    pub fn malformed(message: impl Into<String>) -> Self {
        StateError::MalformedRecord {
            message: message.into(),
        }
    }

    /// Create an identity mismatch error.
    pub fn identity_mismatch(expected: impl Into<String>, message: impl Into<String>) -> Self {
        StateError::IdentityMismatch {
            expected: expected.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        StateError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type StateResult<T> = Result<T, StateError>;
