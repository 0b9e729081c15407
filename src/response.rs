//! Response wrapper and decoded bodies.
//!
//! The pipeline decodes every body into a [`Body`] according to the
//! request's [`ResponseType`]. Interceptors and the cache work on
//! `Response<Body>`; the typed client helpers turn that into a `Response<T>`
//! with [`Response::json`].

use crate::config::{RequestConfig, ResponseType};
use crate::{Error, Result};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Parsed JSON.
    Json(Value),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes plus the response content type.
    Blob {
        data: Bytes,
        content_type: Option<String>,
    },
    /// Raw bytes.
    ArrayBuffer(Bytes),
}

impl Body {
    /// Decodes raw bytes in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] for invalid JSON and
    /// [`Error::Decode`] for text that is not UTF-8.
    pub fn decode(
        response_type: ResponseType,
        raw: &Bytes,
        headers: &HeaderMap,
        status: StatusCode,
    ) -> Result<Body> {
        match response_type {
            // 204 and friends carry no body at all.
            ResponseType::Json if raw.is_empty() => Ok(Body::Json(Value::Null)),
            ResponseType::Json => match serde_json::from_slice::<Value>(raw) {
                Ok(value) => Ok(Body::Json(value)),
                Err(e) => {
                    let raw_response = String::from_utf8_lossy(raw).into_owned();
                    tracing::error!(
                        error = %e,
                        raw_response = %raw_response,
                        "Failed to deserialize response"
                    );
                    Err(Error::DeserializationFailed {
                        raw_response,
                        serde_error: e.to_string(),
                        status,
                    })
                }
            },
            ResponseType::Text => String::from_utf8(raw.to_vec())
                .map(Body::Text)
                .map_err(|e| Error::Decode {
                    reason: e.to_string(),
                    status,
                }),
            ResponseType::Blob => Ok(Body::Blob {
                data: raw.clone(),
                content_type: headers
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string),
            }),
            ResponseType::ArrayBuffer => Ok(Body::ArrayBuffer(raw.clone())),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The raw bytes of a blob or array buffer body.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Body::Blob { data, .. } | Body::ArrayBuffer(data) => Some(data),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Body::Json(value) => value,
            Body::Text(text) => Value::String(text),
            Body::Blob { data, .. } | Body::ArrayBuffer(data) => {
                Value::Array(data.iter().map(|b| Value::from(*b)).collect())
            }
        }
    }
}

/// A response that made it through the pipeline.
///
/// Besides the decoded data it keeps the status, headers and the exact
/// configuration that produced it.
///
/// # Type Parameters
///
/// * `T` - The type of the response data, [`Body`] for untyped requests
///
/// # Examples
///
/// ```no_run
/// use cachet::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), cachet::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = client.get::<User>("/users/123", None).await?;
///
/// println!("User: {}", response.data.name);
/// println!("Status: {} {}", response.status, response.status_text);
/// println!("Requested: {}", response.config.url);
/// println!("Took {:?}", response.latency);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded response data.
    pub data: T,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The status text reported by the transport.
    pub status_text: String,

    /// The response headers.
    pub headers: HeaderMap,

    /// The merged configuration that produced this response.
    pub config: RequestConfig,

    /// Time spent in the transport call and decoding.
    ///
    /// A response served from the cache keeps the latency of the request
    /// that originally filled the entry.
    pub latency: Duration,
}

impl<T> Response<T> {
    /// Creates a new `Response` with the status' canonical reason as its text.
    pub fn new(
        data: T,
        status: StatusCode,
        headers: HeaderMap,
        config: RequestConfig,
        latency: Duration,
    ) -> Self {
        Self {
            data,
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            config,
            latency,
        }
    }

    /// Maps the response data to a different type using the provided function.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cachet::{RequestConfig, Response};
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     42,
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     RequestConfig::new("/answer"),
    ///     Duration::from_millis(100),
    /// );
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            config: self.config,
            latency: self.latency,
        }
    }

    /// Returns a header value by name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cachet::{RequestConfig, Response};
    /// # use http::{HeaderMap, HeaderValue, StatusCode};
    /// # use std::time::Duration;
    /// let mut headers = HeaderMap::new();
    /// headers.insert("content-type", HeaderValue::from_static("application/json"));
    ///
    /// let response = Response::new(
    ///     (),
    ///     StatusCode::OK,
    ///     headers,
    ///     RequestConfig::new("/"),
    ///     Duration::ZERO,
    /// );
    ///
    /// assert_eq!(response.header("content-type"), Some("application/json"));
    /// ```
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl Response<Body> {
    /// Converts the decoded body into `T`.
    ///
    /// Text bodies convert as JSON strings and binary bodies as byte arrays,
    /// so `String` and `Vec<u8>` work for those modes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<Response<T>> {
        let status = self.status;
        let value = self.data.clone().into_value();
        match serde_json::from_value::<T>(value) {
            Ok(data) => Ok(self.map(|_| data)),
            Err(e) => {
                let raw_response = match &self.data {
                    Body::Text(text) => text.clone(),
                    other => other.clone().into_value().to_string(),
                };
                tracing::error!(
                    error = %e,
                    raw_response = %raw_response,
                    "Failed to deserialize response"
                );
                Err(Error::DeserializationFailed {
                    raw_response,
                    serde_error: e.to_string(),
                    status,
                })
            }
        }
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u32,
        name: String,
    }

    fn body_response(data: Body) -> Response<Body> {
        Response::new(
            data,
            StatusCode::OK,
            HeaderMap::new(),
            RequestConfig::new("/users/1"),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_decode_json() {
        let raw = Bytes::from_static(br#"{"id":1,"name":"Ada"}"#);
        let body = Body::decode(ResponseType::Json, &raw, &HeaderMap::new(), StatusCode::OK)
            .unwrap();
        assert_eq!(
            body.as_json().unwrap(),
            &serde_json::json!({"id": 1, "name": "Ada"})
        );
    }

    #[test]
    fn test_decode_empty_json_is_null() {
        let body = Body::decode(
            ResponseType::Json,
            &Bytes::new(),
            &HeaderMap::new(),
            StatusCode::NO_CONTENT,
        )
        .unwrap();
        assert_eq!(body, Body::Json(Value::Null));
    }

    #[test]
    fn test_decode_invalid_json() {
        let raw = Bytes::from_static(b"not json");
        let err = Body::decode(ResponseType::Json, &raw, &HeaderMap::new(), StatusCode::OK)
            .unwrap_err();
        match err {
            Error::DeserializationFailed { raw_response, .. } => {
                assert_eq!(raw_response, "not json")
            }
            other => panic!("Expected DeserializationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_text_rejects_invalid_utf8() {
        let raw = Bytes::from_static(&[0xff, 0xfe]);
        let err = Body::decode(ResponseType::Text, &raw, &HeaderMap::new(), StatusCode::OK)
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_decode_blob_keeps_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
        let raw = Bytes::from_static(&[1, 2, 3]);

        let body = Body::decode(ResponseType::Blob, &raw, &headers, StatusCode::OK).unwrap();
        assert_eq!(
            body,
            Body::Blob {
                data: raw.clone(),
                content_type: Some("image/png".to_string()),
            }
        );
        assert_eq!(body.as_bytes(), Some(&raw));
    }

    #[test]
    fn test_typed_conversion() {
        let response = body_response(Body::Json(serde_json::json!({"id": 7, "name": "Grace"})));
        let typed = response.json::<User>().unwrap();
        assert_eq!(
            typed.data,
            User {
                id: 7,
                name: "Grace".to_string()
            }
        );
        assert_eq!(typed.config.url, "/users/1");
    }

    #[test]
    fn test_typed_conversion_of_text_and_bytes() {
        let text = body_response(Body::Text("hello".to_string()));
        assert_eq!(text.json::<String>().unwrap().data, "hello");

        let bytes = body_response(Body::ArrayBuffer(Bytes::from_static(&[9, 8])));
        assert_eq!(bytes.json::<Vec<u8>>().unwrap().data, vec![9, 8]);
    }

    #[test]
    fn test_typed_conversion_mismatch() {
        let response = body_response(Body::Json(serde_json::json!({"id": "seven"})));
        let err = response.json::<User>().unwrap_err();
        assert!(matches!(err, Error::DeserializationFailed { .. }));
    }
}
