//! HTTP transport for the Graph API.
//!
//! [`HttpTransport`] is the only place network I/O happens. The production
//! implementation wraps a pooled [`reqwest::Client`]; tests substitute a
//! scripted implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

/// HTTP method of a Graph request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Read operation; cacheable.
    Get,
    /// Write operation.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// Request body for write operations.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` fields.
    Form(BTreeMap<String, String>),
    /// JSON document.
    Json(Value),
}

/// A fully composed HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL without query string.
    pub url: String,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// Optional body.
    pub body: Option<RequestBody>,
    /// Bearer credential sent in the `Authorization` header. `None` for
    /// requests leaving the Graph API, such as media downloads.
    pub bearer_token: Option<SecretString>,
}

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Kind of transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request timed out.
    Timeout,
    /// The connection could not be established or was reset.
    Connect,
    /// Any other failure while sending or reading the body.
    Other,
}

/// A failure below the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    /// Failure kind.
    pub kind: TransportErrorKind,
    /// Description of the failure.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Sends HTTP requests.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends `request` and returns the raw response.
    ///
    /// Non-2xx statuses are responses, not errors.
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Connection settings for [`ReqwestTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Idle pooled connections kept per host.
    pub max_idle_connections: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_idle_connections: 5,
        }
    }
}

/// [`HttpTransport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds the pooled client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(settings: HttpSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(settings.max_idle_connections)
            .user_agent(concat!("instagram-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::new(TransportErrorKind::Other, e.to_string()))?;
        Ok(Self { client })
    }
}

fn transport_error(err: &reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };
    // reqwest includes the URL, which never carries the token here.
    TransportError::new(kind, err.to_string())
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        }
        .query(&request.query);

        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        builder = match &request.body {
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Json(value)) => builder.json(value),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| transport_error(&e))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        let ok = HttpResponse {
            status: 204,
            body: Vec::new(),
        };
        let redirect = HttpResponse {
            status: 302,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!redirect.is_success());
    }

    #[test]
    fn reqwest_transport_builds() {
        assert!(ReqwestTransport::new(HttpSettings::default()).is_ok());
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::new(TransportErrorKind::Timeout, "operation timed out");
        assert_eq!(err.to_string(), "Timeout: operation timed out");
    }
}
