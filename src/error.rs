//! Error types for the request pipeline.
//!
//! Every failure the pipeline can produce is a variant of [`Error`]. Status
//! failures carry an [`HttpError`] that keeps the merged request configuration
//! and the decoded response, so error interceptors and callers can inspect
//! exactly what came back.

use crate::config::RequestConfig;
use crate::response::{Body, Response};
use http::StatusCode;
use std::sync::Arc;

/// The main error type for requests issued through a [`Client`](crate::Client).
///
/// `Error` is `Clone` so the same failure can be stored in observable query or
/// mutation state and still be returned to the caller.
///
/// # Examples
///
/// ```no_run
/// use cachet::{Client, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.get::<serde_json::Value>("/endpoint", None).await {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(Error::Http(err)) => {
///         eprintln!("{} (status {:?})", err, err.status());
///     }
///     Err(Error::DeserializationFailed { raw_response, serde_error, .. }) => {
///         eprintln!("Failed to deserialize. Raw response: {}", raw_response);
///         eprintln!("Serde error: {}", serde_error);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A network-level error reported by the reqwest transport (connection
    /// refused, DNS lookup failed, body read aborted, ...).
    #[error("Network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// A custom [`Transport`](crate::transport::Transport) failed to complete
    /// the exchange.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport deadline configured through `timeout` elapsed.
    #[error("Request timed out")]
    Timeout,

    /// The request's cancellation token fired before the exchange finished.
    #[error("Request cancelled")]
    Cancelled,

    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Http(HttpError),

    /// The body could not be parsed as JSON, or the JSON did not match the
    /// requested type.
    ///
    /// # Fields
    ///
    /// * `raw_response` - The raw response body as a string
    /// * `serde_error` - The error message from serde
    /// * `status` - The HTTP status code of the response
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The body could not be decoded in a non-JSON response mode.
    #[error("Failed to decode response (status {status}): {reason}")]
    Decode {
        /// Why decoding failed
        reason: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// An interceptor callback rejected the value it was given.
    #[error("Interceptor failed: {0}")]
    Interceptor(String),

    /// An error interceptor replaced the failure with a response.
    ///
    /// The pipeline does not tell a recovery apart from a failure: whatever the
    /// rejection chain produces is raised. Match on this variant to pick the
    /// replacement response back up.
    #[error("Request failed but was recovered by an interceptor (status {})", .0.status)]
    Recovered(Box<Response<Body>>),

    /// Invalid configuration was provided, such as an invalid header value.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(Arc::new(err))
        }
    }
}

impl Error {
    /// Builds an [`Error::Interceptor`] from any message.
    pub fn interceptor(message: impl Into<String>) -> Self {
        Error::Interceptor(message.into())
    }

    /// Returns `true` if this error is potentially retryable.
    ///
    /// Network errors, timeouts, 5xx and 429 responses are considered
    /// retryable. Everything else is not.
    ///
    /// # Examples
    ///
    /// ```
    /// use cachet::Error;
    ///
    /// assert!(Error::Timeout.is_retryable());
    /// assert!(!Error::Cancelled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout => true,
            Error::Transport(_) => true,
            Error::Http(err) => err
                .status()
                .map(|status| status.is_server_error() || status.as_u16() == 429)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Returns `true` for [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Http(err) => err.status(),
            Error::DeserializationFailed { status, .. } | Error::Decode { status, .. } => {
                Some(*status)
            }
            Error::Recovered(response) => Some(response.status),
            _ => None,
        }
    }

    /// Returns the response attached to this error, if any.
    pub fn response(&self) -> Option<&Response<Body>> {
        match self {
            Error::Http(err) => err.response(),
            Error::Recovered(response) => Some(&**response),
            _ => None,
        }
    }

    /// Returns the request configuration that produced a status error.
    pub fn config(&self) -> Option<&RequestConfig> {
        match self {
            Error::Http(err) => Some(err.config()),
            Error::Recovered(response) => Some(&response.config),
            _ => None,
        }
    }
}

/// A request that reached the server but failed.
///
/// The status is read from the attached response, so it is present exactly
/// when a response is.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct HttpError {
    message: String,
    config: Box<RequestConfig>,
    response: Option<Box<Response<Body>>>,
}

impl HttpError {
    /// Creates a new `HttpError`.
    pub fn new(
        message: impl Into<String>,
        config: RequestConfig,
        response: Option<Response<Body>>,
    ) -> Self {
        Self {
            message: message.into(),
            config: Box::new(config),
            response: response.map(Box::new),
        }
    }

    /// The human readable message, e.g. `Request failed with status 404`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The merged configuration that produced this error.
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// The decoded response, when the server answered.
    pub fn response(&self) -> Option<&Response<Body>> {
        self.response.as_deref()
    }

    /// The response status, when the server answered.
    pub fn status(&self) -> Option<StatusCode> {
        self.response.as_ref().map(|response| response.status)
    }
}

/// A specialized `Result` type for requests.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use std::time::Duration;

    fn response_with_status(status: StatusCode) -> Response<Body> {
        Response::new(
            Body::Text("oops".to_string()),
            status,
            HeaderMap::new(),
            RequestConfig::new("/things"),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_status_mirrors_response() {
        let err = HttpError::new(
            "Request failed with status 404",
            RequestConfig::new("/things"),
            Some(response_with_status(StatusCode::NOT_FOUND)),
        );
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.to_string(), "Request failed with status 404");

        let err = HttpError::new("no answer", RequestConfig::new("/things"), None);
        assert!(err.status().is_none());
        assert!(err.response().is_none());
    }

    #[test]
    fn test_is_retryable() {
        let server = Error::Http(HttpError::new(
            "Request failed with status 503",
            RequestConfig::new("/"),
            Some(response_with_status(StatusCode::SERVICE_UNAVAILABLE)),
        ));
        assert!(server.is_retryable());

        let client = Error::Http(HttpError::new(
            "Request failed with status 400",
            RequestConfig::new("/"),
            Some(response_with_status(StatusCode::BAD_REQUEST)),
        ));
        assert!(!client.is_retryable());

        let throttled = Error::Http(HttpError::new(
            "Request failed with status 429",
            RequestConfig::new("/"),
            Some(response_with_status(StatusCode::TOO_MANY_REQUESTS)),
        ));
        assert!(throttled.is_retryable());

        assert!(Error::Timeout.is_retryable());
        assert!(!Error::ConfigurationError("bad".to_string()).is_retryable());
        assert!(!Error::interceptor("denied").is_retryable());
    }

    #[test]
    fn test_recovered_exposes_response() {
        let err = Error::Recovered(Box::new(response_with_status(StatusCode::OK)));
        assert_eq!(err.status(), Some(StatusCode::OK));
        assert_eq!(err.config().map(|c| c.url.as_str()), Some("/things"));
    }
}
