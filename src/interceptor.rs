//! Request and response interceptors.
//!
//! Interceptors form ordered chains on the client. Registration order is
//! execution order, and each interceptor receives the previous one's output.
//! Request interceptors rewrite the [`RequestConfig`](crate::RequestConfig)
//! before anything else happens; response interceptors rewrite successful
//! responses and, through `on_rejected`, every failure raised after the
//! request chain has run.

use crate::{Error, Result};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type FulfilledFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<T>> + Send + Sync>;
type RejectedFn = Arc<dyn Fn(Error) -> BoxFuture<'static, Error> + Send + Sync>;

/// A pair of optional callbacks applied to values flowing through a chain.
///
/// # Examples
///
/// ```
/// use cachet::{Interceptor, RequestConfig};
///
/// // Stamp every request with a header.
/// let auth = Interceptor::<RequestConfig>::new().on_fulfilled(|config: RequestConfig| async move {
///     config.with_header("authorization", "Bearer secret")
/// });
///
/// // Log failures without changing them.
/// let logger = Interceptor::<cachet::Response<cachet::Body>>::new().on_rejected(|error| async move {
///     eprintln!("request failed: {}", error);
///     error
/// });
/// # let _ = (auth, logger);
/// ```
pub struct Interceptor<T> {
    on_fulfilled: Option<FulfilledFn<T>>,
    on_rejected: Option<RejectedFn>,
}

impl<T: Send + 'static> Interceptor<T> {
    /// Creates an interceptor with no callbacks.
    pub fn new() -> Self {
        Self {
            on_fulfilled: None,
            on_rejected: None,
        }
    }

    /// Sets the callback that transforms values on the success path.
    ///
    /// Returning an error aborts the pass; the remaining interceptors of the
    /// chain are skipped.
    pub fn on_fulfilled<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.on_fulfilled = Some(Arc::new(move |value| f(value).boxed()));
        self
    }

    /// Sets the callback that transforms errors on the failure path.
    pub fn on_rejected<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Error) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Error> + Send + 'static,
    {
        self.on_rejected = Some(Arc::new(move |error| f(error).boxed()));
        self
    }
}

impl<T: Send + 'static> Default for Interceptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Interceptor<T> {
    fn clone(&self) -> Self {
        Self {
            on_fulfilled: self.on_fulfilled.clone(),
            on_rejected: self.on_rejected.clone(),
        }
    }
}

impl<T> fmt::Debug for Interceptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("on_fulfilled", &self.on_fulfilled.is_some())
            .field("on_rejected", &self.on_rejected.is_some())
            .finish()
    }
}

type Entries<T> = RwLock<Vec<(u64, Interceptor<T>)>>;

/// An ordered list of interceptors.
pub(crate) struct InterceptorChain<T> {
    entries: Arc<Entries<T>>,
    next_id: AtomicU64,
}

impl<T: Send + 'static> InterceptorChain<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn register(&self, interceptor: Interceptor<T>) -> InterceptorHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((id, interceptor));

        let entries: Weak<Entries<T>> = Arc::downgrade(&self.entries);
        InterceptorHandle {
            remove: Box::new(move || {
                let Some(entries) = entries.upgrade() else {
                    return false;
                };
                let mut entries = entries.write();
                let before = entries.len();
                entries.retain(|(entry_id, _)| *entry_id != id);
                entries.len() != before
            }),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    // The list is copied when a pass starts, so removals only affect passes
    // that have not started yet.
    fn snapshot(&self) -> Vec<Interceptor<T>> {
        self.entries
            .read()
            .iter()
            .map(|(_, interceptor)| interceptor.clone())
            .collect()
    }

    /// Pipes `value` through every `on_fulfilled` callback in order.
    pub(crate) async fn fulfill(&self, mut value: T) -> Result<T> {
        for interceptor in self.snapshot() {
            if let Some(on_fulfilled) = &interceptor.on_fulfilled {
                value = on_fulfilled(value).await?;
            }
        }
        Ok(value)
    }

    /// Pipes `error` through every `on_rejected` callback in order.
    pub(crate) async fn reject(&self, mut error: Error) -> Error {
        for interceptor in self.snapshot() {
            if let Some(on_rejected) = &interceptor.on_rejected {
                error = on_rejected(error).await;
            }
        }
        error
    }
}

/// Returned when an interceptor is registered; removes it again.
///
/// Dropping the handle leaves the interceptor registered.
pub struct InterceptorHandle {
    remove: Box<dyn FnOnce() -> bool + Send + Sync>,
}

impl InterceptorHandle {
    /// Unregisters the interceptor. Returns `false` if it was already gone.
    pub fn remove(self) -> bool {
        (self.remove)()
    }
}

impl fmt::Debug for InterceptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fulfill_pipes_in_registration_order() {
        let chain = InterceptorChain::<Vec<&'static str>>::new();
        let _a = chain.register(Interceptor::new().on_fulfilled(|mut v: Vec<&str>| async move {
            v.push("first");
            Ok(v)
        }));
        let _b = chain.register(Interceptor::new().on_fulfilled(|mut v: Vec<&str>| async move {
            v.push("second");
            Ok(v)
        }));

        let out = chain.fulfill(Vec::new()).await.unwrap();
        assert_eq!(out, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_interceptors() {
        let reached = Arc::new(AtomicU64::new(0));
        let reached_clone = reached.clone();

        let chain = InterceptorChain::<u32>::new();
        let _a = chain.register(
            Interceptor::new().on_fulfilled(|_: u32| async { Err(Error::interceptor("denied")) }),
        );
        let _b = chain.register(Interceptor::new().on_fulfilled(move |v: u32| {
            reached_clone.fetch_add(1, Ordering::SeqCst);
            async move { Ok(v) }
        }));

        let err = chain.fulfill(1).await.unwrap_err();
        assert!(matches!(err, Error::Interceptor(ref msg) if msg == "denied"));
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reject_runs_in_registration_order() {
        let chain = InterceptorChain::<u32>::new();
        let _a = chain.register(Interceptor::new().on_rejected(|e: Error| async move {
            Error::interceptor(format!("a({})", e))
        }));
        let _skip = chain.register(Interceptor::new().on_fulfilled(|v: u32| async move { Ok(v) }));
        let _b = chain.register(Interceptor::new().on_rejected(|e: Error| async move {
            Error::interceptor(format!("b({})", e))
        }));

        let err = chain.reject(Error::Timeout).await;
        assert_eq!(
            err.to_string(),
            "Interceptor failed: b(Interceptor failed: a(Request timed out))"
        );
    }

    #[tokio::test]
    async fn test_remove_handle() {
        let chain = InterceptorChain::<u32>::new();
        let handle = chain.register(Interceptor::new().on_fulfilled(|v: u32| async move { Ok(v + 1) }));
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.fulfill(1).await.unwrap(), 2);

        assert!(handle.remove());
        assert_eq!(chain.len(), 0);
        assert_eq!(chain.fulfill(1).await.unwrap(), 1);
    }

    #[test]
    fn test_remove_after_chain_dropped() {
        let chain = InterceptorChain::<u32>::new();
        let handle = chain.register(Interceptor::new());
        drop(chain);
        assert!(!handle.remove());
    }
}
