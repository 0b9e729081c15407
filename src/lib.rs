//! # Cachet - An intercepting, caching HTTP client
//!
//! Cachet is an HTTP client built on top of `reqwest`. Every request runs
//! through a pipeline of request interceptors, an optional response cache,
//! the transport, decoding and status checks, and finally response
//! interceptors. On top of the client sit a generic [`retry`] helper and
//! observable [query](query) and [mutation](mutation) state machines for
//! driving UI-style state from HTTP calls.
//!
//! ## Quick Start
//!
//! ```no_run
//! use cachet::{CacheConfig, Client, Interceptor, RequestConfig};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//!     email: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cachet::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     // Attach a token to every request
//!     client.intercept_request(Interceptor::new().on_fulfilled(|config: RequestConfig| async move {
//!         config.with_header("Authorization", "Bearer secret")
//!     }));
//!
//!     // GET, cached for a minute
//!     let config = RequestConfig::default().with_cache(CacheConfig::ttl(Duration::from_secs(60)));
//!     let user = client.get::<User>("/users/123", config).await?;
//!     println!("User: {}", user.data.name);
//!     println!("Request took {:?}", user.latency);
//!
//!     // POST with a JSON body
//!     let new_user = CreateUser {
//!         name: "Alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!     };
//!     let created = client.post::<_, User>("/users", &new_user, None).await?;
//!     println!("Created user with ID: {}", created.data.id);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Interceptor chains** - Rewrite requests, post-process responses and recover from failures
//! - **Response cache** - Opt-in, per-request TTL caching with custom keys and an optional LRU bound
//! - **Cancellation** - Cancel in-flight requests by token, optionally after a timeout
//! - **Flexible retry logic** - Exponential, fixed or custom delays with composable predicates
//! - **Queries and mutations** - Observable loading, data and error state for reads and writes
//! - **Automatic logging** - Structured logging with `tracing` for observability
//! - **Pluggable transport** - Swap reqwest for any [`Transport`](transport::Transport)
//!
//! ## Error Handling
//!
//! Non-2xx responses fail with [`Error::Http`], which keeps the request
//! config and the decoded response:
//!
//! ```no_run
//! use cachet::{Client, Error};
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client.get::<serde_json::Value>("/endpoint", None).await {
//!     Ok(response) => {
//!         println!("Success: {:?}", response.data);
//!     }
//!     Err(Error::DeserializationFailed { raw_response, serde_error, status }) => {
//!         eprintln!("Failed to deserialize (status {}):", status);
//!         eprintln!("  Raw response: {}", raw_response);
//!         eprintln!("  Error: {}", serde_error);
//!     }
//!     Err(Error::Http(error)) => {
//!         eprintln!("{} ({:?})", error.message(), error.response().map(|r| &r.data));
//!     }
//!     Err(e) => {
//!         eprintln!("Other error: {}", e);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry
//!
//! [`retry`] wraps any async operation:
//!
//! ```no_run
//! use cachet::retry::{OrPredicate, RetryOn5xx, RetryOnTimeout};
//! use cachet::{retry, Client, RetryConfig, RetryDelay};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), cachet::Error> {
//! let client = Client::builder().base_url("https://api.example.com")?.build()?;
//!
//! let config = RetryConfig::new()
//!     .retries(5)
//!     .delay(RetryDelay::Exponential {
//!         initial_delay: Duration::from_millis(100),
//!         max_delay: Duration::from_secs(30),
//!         jitter: true,
//!     })
//!     .retry_predicate(OrPredicate::new(vec![
//!         Box::new(RetryOn5xx),
//!         Box::new(RetryOnTimeout),
//!     ]));
//!
//! let health = retry(|| client.get::<serde_json::Value>("/health", None), &config).await?;
//! # let _ = health;
//! # Ok(())
//! # }
//! ```

mod cache;
pub mod cancel;
mod client;
pub mod config;
mod error;
mod global;
pub mod interceptor;
pub mod mutation;
pub mod query;
pub mod reactive;
mod response;
pub mod retry;
pub mod transport;

pub use cancel::{create_cancellation, Cancellation, CancellationToken};
pub use client::{Client, ClientBuilder};
pub use config::{CacheConfig, Params, RequestConfig, ResponseType};
pub use error::{Error, HttpError, Result};
pub use global::{configure_http, http};
pub use interceptor::{Interceptor, InterceptorHandle};
pub use mutation::{use_mutation, Mutation, MutationOptions, MutationState};
pub use query::{use_query, FocusEvents, Query, QueryKey, QueryOptions, QueryState};
pub use response::{Body, Response};
pub use retry::{retry, RetryConfig, RetryDelay, RetryPredicate};
