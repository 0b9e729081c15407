//! Request configuration types.
//!
//! A [`RequestConfig`] describes one request. The client keeps a default
//! configuration and merges each call's configuration over it with
//! [`RequestConfig::merged_over`]: every field the call sets wins, and nested
//! values such as headers or params are replaced wholesale, never combined.

use crate::cancel::CancellationToken;
use crate::Error;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the response body is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// Parse the body as JSON.
    #[default]
    Json,
    /// Read the body as UTF-8 text.
    Text,
    /// Keep the raw bytes along with the response content type.
    Blob,
    /// Keep the raw bytes.
    ArrayBuffer,
}

/// Ordered query parameters.
///
/// Insertion order is kept both in the query string and in the cache key.
/// `null` values stay in the mapping but are left out of the query string.
///
/// # Examples
///
/// ```
/// use cachet::config::Params;
///
/// let params = Params::new()
///     .with("page", 1)
///     .with("limit", 10)
///     .with("filter", serde_json::Value::Null);
///
/// assert_eq!(params.to_query_string(), "page=1&limit=10");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder form of [`Params::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    /// Iterates over the parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encodes the non-null parameters as `application/x-www-form-urlencoded`.
    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.entries {
            if value.is_null() {
                continue;
            }
            serializer.append_pair(key, &stringify(value));
        }
        serializer.finish()
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Derives a cache key from a request configuration.
pub type CacheKeyFn = Arc<dyn Fn(&RequestConfig) -> String + Send + Sync>;

/// Response caching for a request.
///
/// Caching is opt-in: a request is served from, and written to, the cache
/// only when its merged configuration carries an enabled `CacheConfig`.
/// A cached response is fresh while it is younger than `ttl`.
///
/// # Examples
///
/// ```
/// use cachet::config::CacheConfig;
/// use std::time::Duration;
///
/// let cache = CacheConfig::ttl(Duration::from_secs(30));
/// assert!(cache.enabled);
///
/// // Turn caching off for one call even if the client enables it by default.
/// let off = CacheConfig::disabled();
/// assert!(!off.enabled);
/// ```
#[derive(Clone)]
pub struct CacheConfig {
    /// Whether the cache is consulted and written.
    pub enabled: bool,
    /// How long a cached response stays fresh.
    pub ttl: Duration,
    key: Option<CacheKeyFn>,
}

impl CacheConfig {
    /// Enables caching with the given freshness window.
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl,
            key: None,
        }
    }

    /// Disables caching.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ttl: Duration::ZERO,
            key: None,
        }
    }

    /// Uses a custom function to build cache keys instead of
    /// `"{METHOD}:{URL}:{params}"`.
    pub fn with_key<F>(mut self, key: F) -> Self
    where
        F: Fn(&RequestConfig) -> String + Send + Sync + 'static,
    {
        self.key = Some(Arc::new(key));
        self
    }

    pub(crate) fn custom_key(&self, config: &RequestConfig) -> Option<String> {
        self.key.as_ref().map(|key| key(config))
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("enabled", &self.enabled)
            .field("ttl", &self.ttl)
            .field("custom_key", &self.key.is_some())
            .finish()
    }
}

/// Configuration for a single request.
///
/// All fields except `url` are optional so the same type can describe a full
/// request, the client defaults, or a partial override passed to
/// [`Client::set_config`](crate::Client::set_config).
///
/// # Examples
///
/// ```
/// use cachet::config::{RequestConfig, ResponseType};
/// use http::Method;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), cachet::Error> {
/// let config = RequestConfig::new("/search")
///     .with_method(Method::POST)
///     .with_param("page", 2)
///     .with_header("x-request-id", "abc123")?
///     .with_timeout(Duration::from_secs(5))
///     .with_response_type(ResponseType::Json);
///
/// assert_eq!(config.resolved_method(), Method::POST);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// The HTTP method. Defaults to GET.
    pub method: Option<Method>,

    /// The request URL, appended to `base_url` when one is set.
    pub url: String,

    /// Query parameters appended to the URL.
    pub params: Option<Params>,

    /// The body payload, sent JSON-encoded.
    pub body: Option<Value>,

    /// Request headers.
    pub headers: Option<HeaderMap>,

    /// Transport deadline for the whole exchange.
    pub timeout: Option<Duration>,

    /// Prefix joined to `url` by plain concatenation.
    pub base_url: Option<String>,

    /// Whether credentials are included on cross-origin requests.
    pub with_credentials: Option<bool>,

    /// How the body is decoded. Defaults to JSON.
    pub response_type: Option<ResponseType>,

    /// Aborts the transport call when cancelled.
    pub cancel: Option<CancellationToken>,

    /// Response caching for this request.
    pub cache: Option<CacheConfig>,
}

impl RequestConfig {
    /// Creates a configuration for the given URL with every other field unset.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Merges `self` over `defaults`.
    ///
    /// Fields set on `self` win. Unset fields fall back to the default's
    /// value. Headers and params are taken from one side only.
    pub fn merged_over(self, defaults: &RequestConfig) -> RequestConfig {
        RequestConfig {
            method: self.method.or_else(|| defaults.method.clone()),
            url: if self.url.is_empty() {
                defaults.url.clone()
            } else {
                self.url
            },
            params: self.params.or_else(|| defaults.params.clone()),
            body: self.body.or_else(|| defaults.body.clone()),
            headers: self.headers.or_else(|| defaults.headers.clone()),
            timeout: self.timeout.or(defaults.timeout),
            base_url: self.base_url.or_else(|| defaults.base_url.clone()),
            with_credentials: self.with_credentials.or(defaults.with_credentials),
            response_type: self.response_type.or(defaults.response_type),
            cancel: self.cancel.or_else(|| defaults.cancel.clone()),
            cache: self.cache.or_else(|| defaults.cache.clone()),
        }
    }

    /// The method to send, GET when unset.
    pub fn resolved_method(&self) -> Method {
        self.method.clone().unwrap_or(Method::GET)
    }

    /// The decoding mode, JSON when unset.
    pub fn resolved_response_type(&self) -> ResponseType {
        self.response_type.unwrap_or_default()
    }

    /// Whether credentials should be included.
    pub fn includes_credentials(&self) -> bool {
        self.with_credentials.unwrap_or(false)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Adds a query parameter, creating the parameter list if needed.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.get_or_insert_with(Params::new).insert(key, value);
        self
    }

    /// Replaces the query parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    /// Serializes `body` to JSON and sets it as the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `body` cannot be serialized.
    pub fn with_body<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, Error> {
        let value =
            serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Sets an already built JSON payload.
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header, creating the header map if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .insert(name, value);
        Ok(self)
    }

    /// Replaces the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn include_credentials(mut self, include: bool) -> Self {
        self.with_credentials = Some(include);
        self
    }

    pub fn with_response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Threads a cancellation token through to the transport.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_fields_win() {
        let defaults = RequestConfig::new("")
            .with_base_url("https://api.example.com")
            .with_timeout(Duration::from_secs(30))
            .with_response_type(ResponseType::Text);

        let merged = RequestConfig::new("/users")
            .with_timeout(Duration::from_secs(5))
            .merged_over(&defaults);

        assert_eq!(merged.url, "/users");
        assert_eq!(merged.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(merged.timeout, Some(Duration::from_secs(5)));
        assert_eq!(merged.resolved_response_type(), ResponseType::Text);
        assert_eq!(merged.resolved_method(), Method::GET);
    }

    #[test]
    fn test_headers_are_not_deep_merged() {
        let defaults = RequestConfig::default()
            .with_header("authorization", "Bearer token")
            .unwrap()
            .with_param("lang", "en");

        let merged = RequestConfig::new("/x")
            .with_header("x-trace", "1")
            .unwrap()
            .merged_over(&defaults);

        let headers = merged.headers.unwrap();
        assert!(headers.get("authorization").is_none());
        assert_eq!(headers.get("x-trace").unwrap(), "1");
        // params were not overridden, so the default list is kept
        assert_eq!(merged.params.unwrap().get("lang"), Some(&json!("en")));
    }

    #[test]
    fn test_query_string_skips_nulls_and_keeps_order() {
        let params = Params::new()
            .with("z", "last")
            .with("a", Value::Null)
            .with("flag", true)
            .with("q", "hello world");

        assert_eq!(params.to_query_string(), "z=last&flag=true&q=hello+world");
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut params = Params::new().with("page", 1).with("limit", 10);
        params.insert("page", 2);

        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["page", "limit"]);
        assert_eq!(params.get("page"), Some(&json!(2)));
    }

    #[test]
    fn test_params_serialize_in_insertion_order() {
        let params: Params = vec![("page", json!(1)), ("limit", json!(10))]
            .into_iter()
            .collect();
        assert_eq!(
            serde_json::to_string(&params).unwrap(),
            r#"{"page":1,"limit":10}"#
        );
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let result = RequestConfig::new("/").with_header("bad header", "v");
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }
}
