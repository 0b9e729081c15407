//! HTTP client with interceptor chains and a response cache.
//!
//! The [`Client`] type is the main entry point for making HTTP requests.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    cache::{cache_key, ResponseCache},
    config::{CacheConfig, RequestConfig, ResponseType},
    interceptor::{Interceptor, InterceptorChain, InterceptorHandle},
    response::Body,
    transport::{CredentialsMode, ReqwestTransport, Transport, TransportRequest},
    Error, HttpError, Response, Result,
};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// An HTTP client with request/response interceptors and a response cache.
///
/// The client is cheap to clone; clones share defaults, interceptors and the
/// cache. Every request runs through the same steps: merge with the client
/// defaults, request interceptors, cache lookup, transport call, decoding,
/// status check, response interceptors and finally the cache write. Failures
/// after the request interceptors are handed to every response interceptor's
/// `on_rejected` before they reach the caller.
///
/// # Examples
///
/// ```no_run
/// use cachet::{CacheConfig, Client, RequestConfig, Response};
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize)]
/// struct CreateUser {
///     name: String,
/// }
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
///     .timeout(Duration::from_secs(30))
///     .cache(CacheConfig::ttl(Duration::from_secs(60)))
///     .build()?;
///
/// // GET with query parameters
/// let page = RequestConfig::default().with_param("page", 1).with_param("limit", 10);
/// let users: Response<Vec<User>> = client.get("/users", page).await?;
/// println!("Fetched {} users", users.data.len());
///
/// // POST with a JSON body
/// let new_user = CreateUser { name: "Alice".to_string() };
/// let created: Response<User> = client.post("/users", &new_user, None).await?;
/// println!("Created user with ID: {}", created.data.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    defaults: RwLock<RequestConfig>,
    request_interceptors: InterceptorChain<RequestConfig>,
    response_interceptors: InterceptorChain<Response<Body>>,
    cache: ResponseCache,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cachet::Client;
    ///
    /// # fn example() -> Result<(), cachet::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client with no defaults and the reqwest transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the reqwest client cannot be built.
    pub fn new() -> Result<Client> {
        ClientBuilder::new().build()
    }

    /// Merges `partial` into the client defaults.
    ///
    /// Fields set on `partial` replace the current defaults; headers and
    /// params are replaced as a whole.
    pub fn set_config(&self, partial: RequestConfig) {
        let mut defaults = self.inner.defaults.write();
        let merged = partial.merged_over(&defaults);
        *defaults = merged;
    }

    /// Returns a copy of the current defaults.
    pub fn config(&self) -> RequestConfig {
        self.inner.defaults.read().clone()
    }

    /// Registers a request interceptor. It runs after every interceptor
    /// registered before it.
    pub fn intercept_request(&self, interceptor: Interceptor<RequestConfig>) -> InterceptorHandle {
        self.inner.request_interceptors.register(interceptor)
    }

    /// Registers a response interceptor. It runs after every interceptor
    /// registered before it, on both the success and the failure path.
    pub fn intercept_response(
        &self,
        interceptor: Interceptor<Response<Body>>,
    ) -> InterceptorHandle {
        self.inner.response_interceptors.register(interceptor)
    }

    /// Returns the number of registered request interceptors.
    pub fn request_interceptor_count(&self) -> usize {
        self.inner.request_interceptors.len()
    }

    /// Returns the number of registered response interceptors.
    pub fn response_interceptor_count(&self) -> usize {
        self.inner.response_interceptors.len()
    }

    /// Drops every cached response.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Drops the cached response stored under `key`.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.cache.remove(key)
    }

    /// Number of responses currently cached.
    pub fn cached_responses(&self) -> usize {
        self.inner.cache.len()
    }

    /// Runs a request through the pipeline and returns the decoded body.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-2xx statuses, decoding failures and
    /// interceptor failures. Everything except a request interceptor failure
    /// passes through the response interceptors' `on_rejected` callbacks
    /// first.
    pub async fn request(&self, config: RequestConfig) -> Result<Response<Body>> {
        let merged = config.merged_over(&self.inner.defaults.read());
        let config = self.inner.request_interceptors.fulfill(merged).await?;

        match self.dispatch(config).await {
            Ok(response) => Ok(response),
            Err(error) => Err(self.inner.response_interceptors.reject(error).await),
        }
    }

    async fn dispatch(&self, config: RequestConfig) -> Result<Response<Body>> {
        let cache_slot = cache_slot(&config);

        if let Some((key, ttl)) = &cache_slot {
            if let Some(cached) = self.inner.cache.get_fresh(key, *ttl) {
                tracing::debug!(key = %key, "Serving response from cache");
                return Ok(cached);
            }
        }

        let url = build_url(&config);
        let method = config.resolved_method();
        let request = TransportRequest {
            method: method.clone(),
            url: url.clone(),
            headers: request_headers(&config),
            body: request_body(&config)
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| Error::SerializationFailed(e.to_string()))?,
            timeout: config.timeout,
            credentials: if config.includes_credentials() {
                CredentialsMode::Include
            } else {
                CredentialsMode::SameOrigin
            },
            cancel: config.cancel.clone(),
        };

        tracing::debug!(method = %method, url = %url, "Executing HTTP request");

        let start_time = Instant::now();
        let raw = self.inner.transport.send(request).await?;
        let status = raw.status;

        let data = match Body::decode(
            config.resolved_response_type(),
            &raw.body,
            &raw.headers,
            status,
        ) {
            Ok(data) => data,
            // An error page that does not decode still reports its status.
            Err(_) if !raw.ok() => Body::Text(String::from_utf8_lossy(&raw.body).into_owned()),
            Err(e) => return Err(e),
        };
        let latency = start_time.elapsed();

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            "Received HTTP response"
        );

        let mut response = Response::new(data, status, raw.headers, config.clone(), latency);
        response.status_text = raw.status_text;

        if !status.is_success() {
            if status.is_client_error() {
                tracing::error!(status = status.as_u16(), url = %url, "Client error (4xx)");
            } else if status.is_server_error() {
                tracing::warn!(status = status.as_u16(), url = %url, "Server error (5xx)");
            }

            return Err(Error::Http(HttpError::new(
                format!("Request failed with status {}", status.as_u16()),
                config,
                Some(response),
            )));
        }

        let response = self.inner.response_interceptors.fulfill(response).await?;

        if let Some((key, _)) = cache_slot {
            tracing::debug!(key = %key, "Caching response");
            self.inner.cache.insert(key, response.clone());
        }

        Ok(response)
    }

    /// Runs a request and converts the JSON body into `Res`.
    ///
    /// A body that does not convert fails with
    /// [`Error::DeserializationFailed`], which passes through the response
    /// interceptors' `on_rejected` like any other pipeline failure, and drops
    /// the response from the cache.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cachet::{Client, RequestConfig};
    /// use http::Method;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct SearchResults { results: Vec<String> }
    ///
    /// # async fn example() -> Result<(), cachet::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    ///
    /// let config = RequestConfig::new("/search")
    ///     .with_method(Method::POST)
    ///     .with_body(&serde_json::json!({ "query": "rust" }))?;
    ///
    /// let response = client.call::<SearchResults>(config).await?;
    /// println!("Found {} results", response.data.results.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<Res>(&self, config: RequestConfig) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let response = self.request(config).await?;
        let cache_slot = cache_slot(&response.config);

        match response.json() {
            Ok(response) => Ok(response),
            Err(error) => {
                // A body that does not fit `Res` would fail the same way on
                // every cache hit.
                if let Some((key, _)) = cache_slot {
                    self.inner.cache.remove(&key);
                }
                Err(self.inner.response_interceptors.reject(error).await)
            }
        }
    }

    /// Makes a GET request to `url`.
    ///
    /// `config` carries per-call overrides such as params or headers; pass
    /// `None` for none.
    pub async fn get<Res>(
        &self,
        url: impl Into<String>,
        config: impl Into<Option<RequestConfig>>,
    ) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call(verb(Method::GET, url, config)).await
    }

    /// Makes a POST request to `url` with a JSON body.
    ///
    /// Pass `&()` to send no body at all.
    pub async fn post<Req, Res>(
        &self,
        url: impl Into<String>,
        body: &Req,
        config: impl Into<Option<RequestConfig>>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.call(verb(Method::POST, url, config).with_body(body)?)
            .await
    }

    /// Makes a PUT request to `url` with a JSON body. `&()` sends none.
    pub async fn put<Req, Res>(
        &self,
        url: impl Into<String>,
        body: &Req,
        config: impl Into<Option<RequestConfig>>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.call(verb(Method::PUT, url, config).with_body(body)?)
            .await
    }

    /// Makes a PATCH request to `url` with a JSON body. `&()` sends none.
    pub async fn patch<Req, Res>(
        &self,
        url: impl Into<String>,
        body: &Req,
        config: impl Into<Option<RequestConfig>>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.call(verb(Method::PATCH, url, config).with_body(body)?)
            .await
    }

    /// Makes a DELETE request to `url`.
    pub async fn delete<Res>(
        &self,
        url: impl Into<String>,
        config: impl Into<Option<RequestConfig>>,
    ) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call(verb(Method::DELETE, url, config)).await
    }
}

fn verb(
    method: Method,
    url: impl Into<String>,
    config: impl Into<Option<RequestConfig>>,
) -> RequestConfig {
    config
        .into()
        .unwrap_or_default()
        .with_url(url)
        .with_method(method)
}

fn cache_slot(config: &RequestConfig) -> Option<(String, Duration)> {
    let cache = config.cache.as_ref().filter(|cache| cache.enabled)?;
    let key = cache
        .custom_key(config)
        .unwrap_or_else(|| cache_key(config));
    Some((key, cache.ttl))
}

/// Joins the base URL and path, then appends the non-null params.
pub(crate) fn build_url(config: &RequestConfig) -> String {
    let mut url = match &config.base_url {
        Some(base_url) => format!("{}{}", base_url, config.url),
        None => config.url.clone(),
    };

    if let Some(params) = &config.params {
        let query = params.to_query_string();
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
    }

    url
}

/// The body to send. A JSON `null`, which is what `&()` or `None`
/// serialize to, means no body.
fn request_body(config: &RequestConfig) -> Option<&Value> {
    config.body.as_ref().filter(|body| !body.is_null())
}

fn request_headers(config: &RequestConfig) -> HeaderMap {
    let mut headers = config.headers.clone().unwrap_or_default();
    if request_body(config).is_some() && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    headers
}

/// Builder for configuring and creating a [`Client`].
///
/// Everything set here becomes part of the client's default
/// [`RequestConfig`].
///
/// # Examples
///
/// ```no_run
/// use cachet::{CacheConfig, ClientBuilder};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), cachet::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .default_header("User-Agent", "my-app/1.0")?
///     .cache(CacheConfig::ttl(Duration::from_secs(10)))
///     .cache_capacity(512)?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    defaults: RequestConfig,
    transport: Option<Arc<dyn Transport>>,
    cache_capacity: Option<NonZeroUsize>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            defaults: RequestConfig::default(),
            transport: None,
            cache_capacity: None,
        }
    }

    /// Sets the base URL prepended to every request URL.
    ///
    /// The URL is joined by plain concatenation, so leave off the trailing
    /// slash when request paths start with one.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        Url::parse(url.as_ref())?;
        self.defaults.base_url = Some(url.as_ref().to_string());
        Ok(self)
    }

    /// Adds a default header that will be included in all requests that do
    /// not bring their own header map.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        self.defaults = self.defaults.with_header(name, value)?;
        Ok(self)
    }

    /// Sets the transport deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    /// Sends credentials with every request, cross-origin ones included.
    pub fn with_credentials(mut self, include: bool) -> Self {
        self.defaults.with_credentials = Some(include);
        self
    }

    /// Sets how response bodies are decoded. Defaults to JSON.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.defaults.response_type = Some(response_type);
        self
    }

    /// Enables response caching for every request.
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.defaults.cache = Some(cache);
        self
    }

    /// Bounds the cache to `capacity` entries, evicting the least recently
    /// used. The cache is unbounded otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero.
    pub fn cache_capacity(mut self, capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            Error::ConfigurationError("Cache capacity must be greater than zero".to_string())
        })?;
        self.cache_capacity = Some(capacity);
        Ok(self)
    }

    /// Replaces the default configuration wholesale.
    pub fn defaults(mut self, defaults: RequestConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Uses a custom transport instead of reqwest.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default transport cannot be created.
    pub fn build(self) -> Result<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                defaults: RwLock::new(self.defaults),
                request_interceptors: InterceptorChain::new(),
                response_interceptors: InterceptorChain::new(),
                cache: ResponseCache::new(self.cache_capacity),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
