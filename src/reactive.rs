//! Observable state cells.
//!
//! An [`Observable`] holds a value and a list of subscribers. Every write
//! notifies the subscribers synchronously, in subscription order, with the
//! new value. [`Derived`] values are recomputed from their sources on every
//! read, so they are always current without any dependency tracking.
//!
//! # Example
//!
//! ```
//! use cachet::reactive::{Derived, Observable};
//! use std::sync::{Arc, Mutex};
//!
//! let count = Observable::new(1);
//! let doubled = {
//!     let count = count.clone();
//!     Derived::new(move || count.get() * 2)
//! };
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _subscription = count.subscribe(move |value| sink.lock().unwrap().push(*value));
//!
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//! assert_eq!(*seen.lock().unwrap(), vec![5]);
//! ```

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: RwLock<T>,
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: AtomicU64,
}

/// A shared, observable value.
///
/// Clones share the same value and subscribers.
pub struct Observable<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Returns a copy of the current value.
    pub fn get(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Reads the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.value.read();
        f(&*guard)
    }

    /// Replaces the value and notifies every subscriber.
    pub fn set(&self, value: T) {
        *self.inner.value.write() = value.clone();
        self.notify(&value);
    }

    /// Modifies the value in place and notifies every subscriber.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let value = {
            let mut guard = self.inner.value.write();
            f(&mut *guard);
            guard.clone()
        };
        self.notify(&value);
    }

    // No lock is held while listeners run, so they may read or write any
    // observable, this one included.
    fn notify(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            listener(value);
        }
    }

    /// Calls `f` after every write. The subscription ends when the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(f)));

        let inner: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.listeners.lock().retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Like [`subscribe`](Self::subscribe), but also calls `f` once right
    /// away with the current value.
    pub fn watch<F>(&self, f: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let current = self.get();
        f(&current);
        self.subscribe(f)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl<T> fmt::Debug for Observable<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observable")
            .field(&*self.inner.value.read())
            .finish()
    }
}

/// A value computed from other observables on every read.
pub struct Derived<T> {
    compute: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T> Derived<T> {
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            compute: Arc::new(compute),
        }
    }

    pub fn get(&self) -> T {
        (self.compute)()
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            compute: self.compute.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Derived").field(&self.get()).finish()
    }
}

/// Raises a loading flag and lowers it again on drop, so a cycle whose
/// future is dropped or aborted midway does not leave it raised.
pub(crate) struct LoadingGuard {
    flag: Observable<bool>,
}

impl LoadingGuard {
    pub(crate) fn start(flag: &Observable<bool>) -> Self {
        flag.set(true);
        Self { flag: flag.clone() }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Keeps a subscriber registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Removes the subscriber now.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_set_notifies_in_order() {
        let cell = Observable::new(0);
        let log = Arc::new(Mutex::new(Vec::new()));

        let first_log = log.clone();
        let _first = cell.subscribe(move |v| first_log.lock().push(("first", *v)));
        let second_log = log.clone();
        let _second = cell.subscribe(move |v| second_log.lock().push(("second", *v)));

        cell.set(3);
        assert_eq!(*log.lock(), vec![("first", 3), ("second", 3)]);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn test_watch_runs_immediately() {
        let cell = Observable::new("a".to_string());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let _watch = cell.watch(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cell.set("b".to_string());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let cell = Observable::new(1);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let subscription = cell.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(cell.subscriber_count(), 1);
        drop(subscription);
        assert_eq!(cell.subscriber_count(), 0);

        cell.set(2);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_may_write_other_cells() {
        let source = Observable::new(1);
        let mirror = Observable::new(0);

        let target = mirror.clone();
        let _link = source.subscribe(move |v| target.set(*v * 10));

        source.update(|v| *v += 1);
        assert_eq!(mirror.get(), 20);
    }

    #[test]
    fn test_loading_guard_lowers_flag_on_drop() {
        let loading = Observable::new(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _watch = loading.subscribe(move |v| sink.lock().push(*v));

        let guard = LoadingGuard::start(&loading);
        assert!(loading.get());
        drop(guard);

        assert!(!loading.get());
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[test]
    fn test_derived_recomputes_on_read() {
        let data = Observable::new(None::<u32>);
        let has_data = {
            let data = data.clone();
            Derived::new(move || data.with(Option::is_some))
        };

        assert!(!has_data.get());
        data.set(Some(1));
        assert!(has_data.get());
    }
}
