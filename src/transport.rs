//! The network seam.
//!
//! The pipeline never talks to the network directly. It hands a fully built
//! [`TransportRequest`] to a [`Transport`] and gets back the status, headers
//! and raw body bytes. [`ReqwestTransport`] is the default implementation;
//! tests and embedders can plug in their own.

use crate::cancel::CancellationToken;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use url::Url;

/// Whether cookies and authorization travel with cross-origin requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    /// Always send credentials.
    Include,
    /// Send credentials to the same origin only.
    #[default]
    SameOrigin,
}

/// A request ready to be put on the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// The absolute URL, query string included.
    pub url: String,
    pub headers: HeaderMap,
    /// The already serialized body, if any.
    pub body: Option<String>,
    pub timeout: Option<Duration>,
    pub credentials: CredentialsMode,
    pub cancel: Option<CancellationToken>,
}

/// What came back from the wire, before decoding.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    /// Creates a response with the status' canonical reason as its text.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }
}

/// Performs the actual network exchange.
///
/// Implementations report cancellation as [`Error::Cancelled`] and deadline
/// expiry as [`Error::Timeout`]; any other failure should surface unchanged.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use cachet::transport::{Transport, TransportRequest, TransportResponse};
/// use http::{HeaderMap, StatusCode};
///
/// struct Canned;
///
/// #[async_trait]
/// impl Transport for Canned {
///     async fn send(&self, _request: TransportRequest) -> cachet::Result<TransportResponse> {
///         Ok(TransportResponse::new(StatusCode::OK, HeaderMap::new(), "{}"))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// A [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest::Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self { http_client })
    }

    /// Wraps an existing `reqwest::Client`.
    pub fn from_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn exchange(&self, request: TransportRequest) -> Result<TransportResponse> {
        let url = Url::parse(&request.url)?;
        let mut builder = self
            .http_client
            .request(request.method, url)
            .headers(request.headers);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        // reqwest keeps no cookie jar here, so the mode has nothing to toggle.
        tracing::trace!(credentials = ?request.credentials, "Credentials mode");

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(TransportResponse::new(status, headers, body))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, mut request: TransportRequest) -> Result<TransportResponse> {
        match request.cancel.take() {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(Error::Cancelled),
                    result = self.exchange(request) => result,
                }
            }
            None => self.exchange(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_defaults_to_reason() {
        let response = TransportResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), "");
        assert_eq!(response.status_text, "Not Found");
        assert!(!response.ok());
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let transport = ReqwestTransport::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = transport
            .send(TransportRequest {
                method: Method::GET,
                url: "http://127.0.0.1:9/never".to_string(),
                headers: HeaderMap::new(),
                body: None,
                timeout: None,
                credentials: CredentialsMode::SameOrigin,
                cancel: Some(token),
            })
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let transport = ReqwestTransport::new().unwrap();
        let result = transport
            .send(TransportRequest {
                method: Method::GET,
                url: "/relative/only".to_string(),
                headers: HeaderMap::new(),
                body: None,
                timeout: None,
                credentials: CredentialsMode::Include,
                cancel: None,
            })
            .await;

        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}
