//! Transport contract between the engine and the Foreman API.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiCallError;

/// Message used when the server gives no usable error document.
pub const DEFAULT_ERROR_MESSAGE: &str = "The API call failed and no error message was returned.";

/// HTTP methods the Foreman API is driven with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "delete")]
    Delete,
}

impl HttpMethod {
    /// Get the method name as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether requests with this method carry a JSON body.
    pub fn sends_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }

    /// Headers the API requires for this method, if any.
    pub fn required_headers(&self) -> Option<HashMap<String, String>> {
        if self.sends_body() {
            let mut headers = HashMap::new();
            headers.insert("Content-Type".to_string(), "application/json".to_string());
            Some(headers)
        } else {
            None
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ParseHttpMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(ParseHttpMethodError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unsupported HTTP method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHttpMethodError(pub String);

impl fmt::Display for ParseHttpMethodError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported HTTP method: {}", self.0)
    }
}

impl std::error::Error for ParseHttpMethodError {}

/// Performs one API call.
///
/// Implementations return the decoded JSON document on a 2xx response and an
/// [`ApiCallError`] otherwise. A 404 must be reported with `status_code`
/// set so the engine can treat it as an absent record.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn make_api_call(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: Option<&Value>,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Value, ApiCallError>;
}

#[async_trait]
impl<T: ApiTransport + ?Sized> ApiTransport for Arc<T> {
    async fn make_api_call(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: Option<&Value>,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Value, ApiCallError> {
        (**self).make_api_call(endpoint, method, body, headers).await
    }
}

/// Pull the human-readable message out of a Foreman error document.
///
/// `error.message` takes precedence over `error.full_messages[0]`.
/// Returns `None` when the body is not JSON or carries neither field.
pub fn extract_error_message(raw_body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(raw_body).ok()?;
    let error = json.get("error")?;

    if let Some(message) = error.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }

    error
        .pointer("/full_messages/0")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Build the error for a non-2xx response.
///
/// The raw body is kept only when no message could be extracted from it.
pub fn error_from_response(
    status_code: u16,
    raw_body: &str,
    endpoint: &str,
    method: HttpMethod,
    request_body: Option<&Value>,
) -> ApiCallError {
    let error = match extract_error_message(raw_body) {
        Some(message) => ApiCallError::new(Some(status_code), message, endpoint, method),
        None => ApiCallError::new(Some(status_code), DEFAULT_ERROR_MESSAGE, endpoint, method)
            .with_raw_body(raw_body),
    };
    error.with_request_body(request_body.cloned())
}
