//! [`ApiTransport`] over HTTP.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use foreman_state::transport::error_from_response;
use foreman_state::{ApiCallError, ApiTransport, HttpMethod};

use crate::config::{AuthConfig, ForemanConfig};
use crate::error::{ClientError, ClientResult};

/// Talks to a Foreman server with `reqwest`.
///
/// A 2xx response is decoded as JSON. Any other status is turned into an
/// [`ApiCallError`] carrying the message from Foreman's error document.
#[derive(Clone)]
pub struct ForemanClient {
    config: ForemanConfig,
    client: Client,
}

impl fmt::Debug for ForemanClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForemanClient")
            .field("config", &self.config.redacted())
            .finish_non_exhaustive()
    }
}

impl ForemanClient {
    /// Validate the configuration and build the HTTP client.
    pub fn new(config: ForemanConfig) -> ClientResult<Self> {
        config.validate()?;
        let client = Self::build_client(&config)?;

        debug!(
            base_url = %config.base_url,
            verify_certificate = config.tls.verify_certificate,
            "Created Foreman client"
        );

        Ok(Self { config, client })
    }

    /// Build a client from `FOREMAN_*` environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ForemanConfig::from_env()?)
    }

    fn build_client(config: &ForemanConfig) -> ClientResult<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.connection.read_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connection.connection_timeout_secs));

        if !config.tls.verify_certificate {
            warn!(base_url = %config.base_url, "TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().map_err(|e| ClientError::ClientBuild {
            message: e.to_string(),
            source: Some(Box::new(e)),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ForemanConfig {
        &self.config
    }

    fn build_request(
        &self,
        method: HttpMethod,
        url: &str,
        body: Option<&Value>,
        headers: Option<&HashMap<String, String>>,
    ) -> RequestBuilder {
        let mut request = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        };

        request = request.header(header::ACCEPT, "application/json");

        if let AuthConfig::Basic { username, password } = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }

        for (name, value) in &self.config.default_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        for (name, value) in headers.into_iter().flatten() {
            request = request.header(name.as_str(), value.as_str());
        }

        match body {
            Some(json_body) if method.sends_body() => request.json(json_body),
            _ => request,
        }
    }
}

#[async_trait]
impl ApiTransport for ForemanClient {
    #[instrument(skip(self, body, headers), fields(method = %method))]
    async fn make_api_call(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: Option<&Value>,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Value, ApiCallError> {
        let verbosity = self.config.log_verbosity;
        let url = self.config.url(endpoint);
        let request = self.build_request(method, &url, body, headers);

        if verbosity.is_enabled() {
            debug!(url = %url, method = %method.as_str(), "Sending Foreman request");
        }
        if verbosity.log_headers() {
            if let Some(headers) = headers {
                debug!(headers = ?headers, "Request headers");
            }
        }
        if verbosity.log_bodies() {
            if let Some(json_body) = body {
                trace!(body = %json_body, "Request body");
            }
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Foreman request failed");
            ApiCallError::new(None, format!("request failed: {e}"), endpoint, method)
                .with_request_body(body.cloned())
        })?;

        let status = response.status();
        let raw_body = response.text().await.map_err(|e| {
            ApiCallError::new(
                Some(status.as_u16()),
                format!("failed to read response body: {e}"),
                endpoint,
                method,
            )
            .with_request_body(body.cloned())
        })?;

        if verbosity.is_enabled() {
            debug!(url = %url, status = %status, "Received Foreman response");
        }
        if verbosity.log_bodies() {
            trace!(body = %raw_body, "Response body");
        }

        if !status.is_success() {
            return Err(error_from_response(
                status.as_u16(),
                &raw_body,
                endpoint,
                method,
                body,
            ));
        }

        if raw_body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&raw_body).map_err(|e| {
            ApiCallError::new(
                Some(status.as_u16()),
                format!("response is not valid JSON: {e}"),
                endpoint,
                method,
            )
            .with_raw_body(raw_body.clone())
            .with_request_body(body.cloned())
        })
    }
}
