//! Repeatable reads exposed as observable state.
//!
//! [`use_query`] wires a fetcher to a [`QueryState`]: three observable cells
//! (`data`, `error`, `is_loading`) and two derived flags (`is_error`,
//! `is_success`). A fetch cycle sets `is_loading`, clears `error`, runs the
//! fetcher and lands either the data or the error. The previous data stays
//! visible while a new cycle is in flight.
//!
//! Cycles start automatically whenever the `enabled` input turns true,
//! on every [`FocusEvents`] notification when bound to one, on a fixed
//! interval when configured, and on demand through [`Query::refetch`]. All
//! of them are skipped while the query is disabled.
//!
//! # Example
//!
//! ```no_run
//! use cachet::query::{use_query, QueryOptions};
//! use cachet::Client;
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone, Deserialize)]
//! struct User {
//!     name: String,
//! }
//!
//! # async fn example() -> Result<(), cachet::Error> {
//! let client = Client::builder().base_url("https://api.example.com")?.build()?;
//!
//! let query = use_query(
//!     "user-123",
//!     move || {
//!         let client = client.clone();
//!         async move { client.get::<User>("/users/123", None).await }
//!     },
//!     QueryOptions::new()
//!         .refetch_interval(Duration::from_secs(60))
//!         .on_error(|error| eprintln!("failed to load user: {}", error)),
//! );
//!
//! let _watch = query.data.subscribe(|user| {
//!     if let Some(user) = user {
//!         println!("user is now {}", user.name);
//!     }
//! });
//!
//! query.refetch().await;
//! # Ok(())
//! # }
//! ```

use crate::reactive::{Derived, LoadingGuard, Observable, Subscription};
use crate::retry::{retry, RetryConfig};
use crate::{Error, Response, Result};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Identifies a query in logs.
///
/// Built from a string or a list of string segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(":"))
    }
}

impl From<&str> for QueryKey {
    fn from(key: &str) -> Self {
        QueryKey(vec![key.to_string()])
    }
}

impl From<String> for QueryKey {
    fn from(key: String) -> Self {
        QueryKey(vec![key])
    }
}

impl From<Vec<String>> for QueryKey {
    fn from(segments: Vec<String>) -> Self {
        QueryKey(segments)
    }
}

impl From<Vec<&str>> for QueryKey {
    fn from(segments: Vec<&str>) -> Self {
        QueryKey(segments.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for QueryKey {
    fn from(segments: [&str; N]) -> Self {
        QueryKey(segments.iter().map(|s| s.to_string()).collect())
    }
}

/// Window-focus notifications, fired by the host application.
///
/// Queries bound with [`QueryOptions::refetch_on_window_focus`] start a
/// fetch cycle on every notification.
#[derive(Debug, Clone)]
pub struct FocusEvents {
    tx: broadcast::Sender<()>,
}

impl FocusEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Signals that the window gained focus.
    pub fn notify_focus(&self) {
        // No receivers just means no query is listening.
        let _ = self.tx.send(());
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for FocusEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// The observable state of a query.
pub struct QueryState<T> {
    /// The last successfully fetched data.
    pub data: Observable<Option<T>>,
    /// The error of the last cycle, cleared when a new cycle starts.
    pub error: Observable<Option<Error>>,
    /// Whether a cycle is in flight.
    pub is_loading: Observable<bool>,
    /// `error` is set.
    pub is_error: Derived<bool>,
    /// `data` is set and `error` is not.
    pub is_success: Derived<bool>,
}

impl<T> QueryState<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new() -> Self {
        let data = Observable::new(None::<T>);
        let error = Observable::new(None::<Error>);
        let is_loading = Observable::new(false);

        let is_error = {
            let error = error.clone();
            Derived::new(move || error.with(Option::is_some))
        };
        let is_success = {
            let data = data.clone();
            let error = error.clone();
            Derived::new(move || data.with(Option::is_some) && error.with(Option::is_none))
        };

        Self {
            data,
            error,
            is_loading,
            is_error,
            is_success,
        }
    }
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading.clone(),
            is_error: self.is_error.clone(),
            is_success: self.is_success.clone(),
        }
    }
}

type SuccessFn<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&Error) + Send + Sync>;
type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Response<T>>> + Send + Sync>;

/// Options for [`use_query`].
pub struct QueryOptions<T> {
    enabled: Option<Observable<bool>>,
    focus: Option<FocusEvents>,
    refetch_interval: Option<Duration>,
    retry: Option<RetryConfig>,
    on_success: Option<SuccessFn<T>>,
    on_error: Option<ErrorFn>,
}

impl<T> QueryOptions<T> {
    pub fn new() -> Self {
        Self {
            enabled: None,
            focus: None,
            refetch_interval: None,
            retry: None,
            on_success: None,
            on_error: None,
        }
    }

    /// Enables or disables the query once and for all.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(Observable::new(enabled));
        self
    }

    /// Follows an observable switch: every change to `true` starts a cycle,
    /// `false` stops future automatic cycles.
    pub fn enabled_when(mut self, enabled: Observable<bool>) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn refetch_on_window_focus(mut self, events: &FocusEvents) -> Self {
        self.focus = Some(events.clone());
        self
    }

    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = Some(interval);
        self
    }

    /// Retries the fetcher within each cycle.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct QueryRunner<T> {
    key: QueryKey,
    fetcher: Fetcher<T>,
    state: QueryState<T>,
    enabled: Observable<bool>,
    retry: Option<RetryConfig>,
    on_success: Option<SuccessFn<T>>,
    on_error: Option<ErrorFn>,
    runtime: Handle,
}

impl<T> QueryRunner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Enters the loading state. Returns `None` when disabled.
    fn begin(&self) -> Option<LoadingGuard> {
        if !self.enabled.get() {
            tracing::debug!(key = %self.key, "Query disabled, skipping fetch");
            return None;
        }
        tracing::debug!(key = %self.key, "Query fetch started");
        let loading = LoadingGuard::start(&self.state.is_loading);
        self.state.error.set(None);
        Some(loading)
    }

    async fn complete(&self, loading: LoadingGuard) {
        let result = match &self.retry {
            Some(config) => retry(|| (self.fetcher)(), config).await,
            None => (self.fetcher)().await,
        };

        match result {
            Ok(response) => {
                let data = response.data;
                self.state.data.set(Some(data.clone()));
                self.state.error.set(None);
                tracing::debug!(key = %self.key, "Query fetch succeeded");
                if let Some(on_success) = &self.on_success {
                    on_success(&data);
                }
            }
            Err(error) => {
                tracing::debug!(key = %self.key, error = %error, "Query fetch failed");
                self.state.error.set(Some(error.clone()));
                if let Some(on_error) = &self.on_error {
                    on_error(&error);
                }
            }
        }

        drop(loading);
    }

    async fn run(&self) {
        if let Some(loading) = self.begin() {
            self.complete(loading).await;
        }
    }

    /// Starts a cycle on its own task, so stopping the trigger that fired it
    /// never cuts the cycle short.
    fn trigger(self: Arc<Self>) {
        if let Some(loading) = self.begin() {
            let runtime = self.runtime.clone();
            runtime.spawn(async move { self.complete(loading).await });
        }
    }
}

/// A live query created by [`use_query`].
///
/// Dereferences to its [`QueryState`]. Dropping the query, or calling
/// [`teardown`](Query::teardown), stops the interval and focus triggers and
/// the `enabled` watcher. A cycle already in flight still lands its result.
pub struct Query<T> {
    runner: Arc<QueryRunner<T>>,
    triggers: Vec<JoinHandle<()>>,
    enabled_watch: Option<Subscription>,
}

impl<T> Query<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &QueryKey {
        &self.runner.key
    }

    pub fn state(&self) -> &QueryState<T> {
        &self.runner.state
    }

    /// Runs one fetch cycle and waits for it. Failures land in `error`;
    /// nothing is returned to the caller.
    ///
    /// Dropping the returned future abandons the cycle and clears
    /// `is_loading`.
    pub async fn refetch(&self) {
        self.runner.run().await;
    }

    /// Stops every automatic trigger. Idempotent.
    pub fn teardown(&mut self) {
        self.stop_triggers();
    }
}

impl<T> Query<T> {
    fn stop_triggers(&mut self) {
        for trigger in self.triggers.drain(..) {
            trigger.abort();
        }
        if let Some(watch) = self.enabled_watch.take() {
            watch.unsubscribe();
        }
    }
}

impl<T> Deref for Query<T> {
    type Target = QueryState<T>;

    fn deref(&self) -> &Self::Target {
        &self.runner.state
    }
}

impl<T> Drop for Query<T> {
    fn drop(&mut self) {
        self.stop_triggers();
    }
}

/// Creates a query that drives `fetcher` into observable state.
///
/// When the query starts out enabled the first cycle begins immediately:
/// `is_loading` is already `true` when this returns. Cycles run on the
/// runtime `use_query` was called from, so the `enabled` switch may be
/// flipped from any thread.
///
/// # Panics
///
/// Must be called from within a tokio runtime.
pub fn use_query<T, F, Fut>(
    key: impl Into<QueryKey>,
    fetcher: F,
    options: QueryOptions<T>,
) -> Query<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<T>>> + Send + 'static,
{
    let QueryOptions {
        enabled,
        focus,
        refetch_interval,
        retry,
        on_success,
        on_error,
    } = options;

    let runtime = Handle::current();
    let enabled = enabled.unwrap_or_else(|| Observable::new(true));
    let fetcher: Fetcher<T> = Arc::new(move || fetcher().boxed());

    let runner = Arc::new(QueryRunner {
        key: key.into(),
        fetcher,
        state: QueryState::new(),
        enabled: enabled.clone(),
        retry,
        on_success,
        on_error,
        runtime: runtime.clone(),
    });

    let enabled_watch = {
        let runner: Weak<QueryRunner<T>> = Arc::downgrade(&runner);
        let was_enabled = AtomicBool::new(false);
        enabled.watch(move |&now_enabled| {
            let previously = was_enabled.swap(now_enabled, Ordering::SeqCst);
            if !now_enabled || previously {
                return;
            }
            if let Some(runner) = runner.upgrade() {
                runner.trigger();
            }
        })
    };

    let mut triggers = Vec::new();

    if let Some(period) = refetch_interval {
        let runner = Arc::downgrade(&runner);
        triggers.push(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(runner) = runner.upgrade() else {
                    break;
                };
                runner.trigger();
            }
        }));
    }

    if let Some(focus) = focus {
        let runner = Arc::downgrade(&runner);
        let mut events = focus.subscribe();
        triggers.push(runtime.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let Some(runner) = runner.upgrade() else {
                    break;
                };
                runner.trigger();
            }
        }));
    }

    Query {
        runner,
        triggers,
        enabled_watch: Some(enabled_watch),
    }
}
