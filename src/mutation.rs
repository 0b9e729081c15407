//! On-demand writes exposed as observable state.
//!
//! A [`Mutation`] never runs on its own. Each [`Mutation::mutate`] call runs
//! the fetcher with the given variables, lands the outcome in the state and
//! returns it to the caller as well.

use crate::reactive::{LoadingGuard, Observable};
use crate::{Error, Response, Result};
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

/// The observable state of a mutation.
pub struct MutationState<T> {
    /// Data of the last successful call.
    pub data: Observable<Option<T>>,
    /// Error of the last failed call, cleared when a new call starts.
    pub error: Observable<Option<Error>>,
    pub is_loading: Observable<bool>,
}

impl<T> Clone for MutationState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            is_loading: self.is_loading.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MutationState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationState")
            .field("data", &self.data)
            .field("error", &self.error)
            .field("is_loading", &self.is_loading)
            .finish()
    }
}

type MutateFn<V> = Arc<dyn Fn(&V) + Send + Sync>;
type SuccessFn<T, V> = Arc<dyn Fn(&T, &V) + Send + Sync>;
type ErrorFn<V> = Arc<dyn Fn(&Error, &V) + Send + Sync>;
type Fetcher<T, V> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<Response<T>>> + Send + Sync>;

/// Callbacks for [`use_mutation`].
pub struct MutationOptions<T, V> {
    on_mutate: Option<MutateFn<V>>,
    on_success: Option<SuccessFn<T, V>>,
    on_error: Option<ErrorFn<V>>,
}

impl<T, V> MutationOptions<T, V> {
    pub fn new() -> Self {
        Self {
            on_mutate: None,
            on_success: None,
            on_error: None,
        }
    }

    /// Runs before the fetcher, with the variables of the call.
    pub fn on_mutate<F>(mut self, f: F) -> Self
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        self.on_mutate = Some(Arc::new(f));
        self
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &V) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error, &V) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl<T, V> Default for MutationOptions<T, V> {
    fn default() -> Self {
        Self::new()
    }
}

struct MutationInner<T, V> {
    fetcher: Fetcher<T, V>,
    state: MutationState<T>,
    options: MutationOptions<T, V>,
}

/// A mutation created by [`use_mutation`].
///
/// Clones share the same state. Dereferences to its [`MutationState`].
pub struct Mutation<T, V> {
    inner: Arc<MutationInner<T, V>>,
}

impl<T, V> Clone for Mutation<T, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, V> Mutation<T, V>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn state(&self) -> &MutationState<T> {
        &self.inner.state
    }

    /// Runs the fetcher with `variables`.
    ///
    /// Concurrent calls are not coordinated: each one writes its own outcome
    /// and the last to finish wins. Dropping the returned future abandons the
    /// call and clears `is_loading`.
    pub async fn mutate(&self, variables: V) -> Result<T>
    where
        V: Clone,
    {
        let options = &self.inner.options;
        let state = &self.inner.state;

        if let Some(on_mutate) = &options.on_mutate {
            on_mutate(&variables);
        }
        let loading = LoadingGuard::start(&state.is_loading);
        state.error.set(None);

        let outcome = match (self.inner.fetcher)(variables.clone()).await {
            Ok(response) => {
                let data = response.data;
                state.data.set(Some(data.clone()));
                tracing::debug!("Mutation succeeded");
                if let Some(on_success) = &options.on_success {
                    on_success(&data, &variables);
                }
                Ok(data)
            }
            Err(error) => {
                tracing::debug!(error = %error, "Mutation failed");
                state.error.set(Some(error.clone()));
                if let Some(on_error) = &options.on_error {
                    on_error(&error, &variables);
                }
                Err(error)
            }
        };

        drop(loading);
        outcome
    }

    /// Returns the state to its initial values. A call still in flight will
    /// overwrite it when it lands.
    pub fn reset(&self) {
        let state = &self.inner.state;
        state.data.set(None);
        state.error.set(None);
        state.is_loading.set(false);
    }
}

impl<T, V> Deref for Mutation<T, V> {
    type Target = MutationState<T>;

    fn deref(&self) -> &Self::Target {
        &self.inner.state
    }
}

/// Creates a mutation around `fetcher`.
///
/// # Example
///
/// ```no_run
/// use cachet::mutation::{use_mutation, MutationOptions};
/// use cachet::Client;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize)]
/// struct NewUser {
///     name: String,
/// }
///
/// #[derive(Debug, Clone, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), cachet::Error> {
/// let client = Client::builder().base_url("https://api.example.com")?.build()?;
///
/// let create_user = use_mutation(
///     move |user: NewUser| {
///         let client = client.clone();
///         async move { client.post::<_, User>("/users", &user, None).await }
///     },
///     MutationOptions::new().on_error(|error, user: &NewUser| {
///         eprintln!("could not create {}: {}", user.name, error);
///     }),
/// );
///
/// let user = create_user.mutate(NewUser { name: "Ada".into() }).await?;
/// println!("created user {}", user.id);
/// # Ok(())
/// # }
/// ```
pub fn use_mutation<T, V, F, Fut>(fetcher: F, options: MutationOptions<T, V>) -> Mutation<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: 'static,
    F: Fn(V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<T>>> + Send + 'static,
{
    let fetcher: Fetcher<T, V> = Arc::new(move |variables| fetcher(variables).boxed());

    Mutation {
        inner: Arc::new(MutationInner {
            fetcher,
            state: MutationState {
                data: Observable::new(None),
                error: Observable::new(None),
                is_loading: Observable::new(false),
            },
            options,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use http::{HeaderMap, StatusCode};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn ok<T>(data: T) -> Result<Response<T>> {
        Ok(Response::new(
            data,
            StatusCode::CREATED,
            HeaderMap::new(),
            RequestConfig::new("/"),
            Duration::ZERO,
        ))
    }

    #[tokio::test]
    async fn test_mutate_success_updates_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (before, after) = (log.clone(), log.clone());

        let mutation = use_mutation(
            |n: u32| async move { ok(n * 2) },
            MutationOptions::new()
                .on_mutate(move |n: &u32| before.lock().push(format!("mutate {}", n)))
                .on_success(move |data: &u32, n: &u32| {
                    after.lock().push(format!("success {} {}", data, n))
                }),
        );

        assert_eq!(mutation.mutate(21).await.unwrap(), 42);
        assert_eq!(mutation.data.get(), Some(42));
        assert!(mutation.error.get().is_none());
        assert!(!mutation.is_loading.get());
        assert_eq!(*log.lock(), vec!["mutate 21", "success 42 21"]);
    }

    #[tokio::test]
    async fn test_mutate_failure_propagates_and_records() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();

        let mutation = use_mutation(
            |_: String| async { Err::<Response<()>, _>(Error::Timeout) },
            MutationOptions::new().on_error(move |error: &Error, name: &String| {
                *sink.lock() = Some((error.is_timeout(), name.clone()));
            }),
        );

        let result = mutation.mutate("ada".to_string()).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(matches!(mutation.error.get(), Some(Error::Timeout)));
        assert!(mutation.data.get().is_none());
        assert!(!mutation.is_loading.get());
        assert_eq!(*seen.lock(), Some((true, "ada".to_string())));
    }

    #[tokio::test]
    async fn test_loading_is_visible_during_call() {
        let mutation = use_mutation(
            |_: ()| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ok(1u8)
            },
            MutationOptions::new(),
        );

        let running = mutation.clone();
        let call = tokio::spawn(async move { running.mutate(()).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(mutation.is_loading.get());

        call.await.unwrap().unwrap();
        assert!(!mutation.is_loading.get());
    }

    #[tokio::test]
    async fn test_abandoned_call_clears_loading() {
        let mutation = use_mutation(
            |_: ()| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                ok(1u8)
            },
            MutationOptions::new(),
        );

        let abandoned = tokio::time::timeout(Duration::from_millis(10), mutation.mutate(())).await;
        assert!(abandoned.is_err());
        assert!(!mutation.is_loading.get());
        assert!(mutation.data.get().is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let mutation = use_mutation(|n: i32| async move { ok(n) }, MutationOptions::new());
        mutation.mutate(3).await.unwrap();

        mutation.reset();
        assert!(mutation.data.get().is_none());
        assert!(mutation.error.get().is_none());
        assert!(!mutation.is_loading.get());
    }
}
