//! Bounded re-execution of fallible async operations.
//!
//! [`retry`] runs an operation up to `retries + 1` times. After each failure
//! it asks the [`RetryPredicate`] whether to go on, waits for the delay the
//! [`RetryDelay`] policy gives for that attempt, and tries again. Both are
//! consulted afresh on every failure with the latest error and the 0-based
//! attempt index.

use crate::Error;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Computes the delay before the next attempt from the 0-based index of the
/// attempt that just failed.
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// How long to wait between attempts.
///
/// # Examples
///
/// ```
/// use cachet::RetryDelay;
/// use std::time::Duration;
///
/// // The default: 1s, 2s, 4s, ... capped at 30s.
/// let exponential = RetryDelay::default();
/// assert_eq!(exponential.delay_for_attempt(0), Duration::from_secs(1));
/// assert_eq!(exponential.delay_for_attempt(10), Duration::from_secs(30));
///
/// // Fixed: 250ms every time.
/// let fixed = RetryDelay::Fixed(Duration::from_millis(250));
/// assert_eq!(fixed.delay_for_attempt(3), Duration::from_millis(250));
///
/// // Computed from the attempt index.
/// let linear = RetryDelay::custom(|attempt| Duration::from_millis(10 * attempt as u64));
/// assert_eq!(linear.delay_for_attempt(2), Duration::from_millis(20));
/// ```
#[derive(Clone)]
pub enum RetryDelay {
    /// The same delay before every retry.
    Fixed(Duration),

    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    ///
    /// Optional jitter scales the delay to a random 50-100% of its value.
    Exponential {
        /// The delay after the first failure.
        initial_delay: Duration,
        /// The maximum delay between attempts.
        max_delay: Duration,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },

    /// Delay returned by a function of the attempt index.
    ///
    /// A panic inside the function propagates out of [`retry`].
    Custom(DelayFn),
}

impl RetryDelay {
    /// Wraps a delay function.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        RetryDelay::Custom(Arc::new(f))
    }

    /// Returns the delay to wait after the given 0-based attempt failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryDelay::Fixed(delay) => *delay,
            RetryDelay::Exponential {
                initial_delay,
                max_delay,
                jitter,
            } => {
                let multiplier = 2u32.saturating_pow(attempt);
                let delay = initial_delay.saturating_mul(multiplier).min(*max_delay);

                if *jitter {
                    let jitter_factor = rand::thread_rng().gen_range(0.5..=1.0);
                    delay.mul_f64(jitter_factor)
                } else {
                    delay
                }
            }
            RetryDelay::Custom(delay_fn) => delay_fn(attempt),
        }
    }
}

impl Default for RetryDelay {
    fn default() -> Self {
        RetryDelay::Exponential {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryDelay::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            RetryDelay::Exponential {
                initial_delay,
                max_delay,
                jitter,
            } => f
                .debug_struct("Exponential")
                .field("initial_delay", initial_delay)
                .field("max_delay", max_delay)
                .field("jitter", jitter)
                .finish(),
            RetryDelay::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Decides whether a failed attempt should be retried.
///
/// # Examples
///
/// ```
/// use cachet::{Error, RetryPredicate};
///
/// struct RetryOnRateLimit;
///
/// impl RetryPredicate for RetryOnRateLimit {
///     fn should_retry(&self, error: &Error, _attempt: u32) -> bool {
///         error.status().map(|s| s.as_u16()) == Some(429)
///     }
/// }
/// ```
pub trait RetryPredicate<E = Error>: Send + Sync {
    /// Determines whether the operation should run again.
    ///
    /// # Arguments
    ///
    /// * `error` - The error the attempt failed with
    /// * `attempt` - The 0-based index of the attempt that failed
    fn should_retry(&self, error: &E, attempt: u32) -> bool;
}

/// Retries every failure. The default predicate.
#[derive(Debug, Clone, Copy)]
pub struct Always;

impl<E> RetryPredicate<E> for Always {
    fn should_retry(&self, _error: &E, _attempt: u32) -> bool {
        true
    }
}

/// Retry all errors that are marked as retryable.
///
/// This uses [`Error::is_retryable`], which returns `true` for network
/// errors, timeouts, 429 and 5xx responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPredicate for RetryOnRetryable {
    fn should_retry(&self, error: &Error, _attempt: u32) -> bool {
        error.is_retryable()
    }
}

/// Retry only on 5xx server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPredicate for RetryOn5xx {
    fn should_retry(&self, error: &Error, _attempt: u32) -> bool {
        matches!(error.status(), Some(status) if status.is_server_error())
    }
}

/// Retry only on timeout errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnTimeout;

impl RetryPredicate for RetryOnTimeout {
    fn should_retry(&self, error: &Error, _attempt: u32) -> bool {
        matches!(error, Error::Timeout)
    }
}

/// Retry only on network/connection errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConnectionError;

impl RetryPredicate for RetryOnConnectionError {
    fn should_retry(&self, error: &Error, _attempt: u32) -> bool {
        matches!(error, Error::Network(_) | Error::Transport(_))
    }
}

/// Combine multiple retry predicates with OR logic.
///
/// # Examples
///
/// ```
/// use cachet::retry::{OrPredicate, RetryOn5xx, RetryOnTimeout};
///
/// // Retry on 5xx errors OR timeouts
/// let predicate = OrPredicate::new(vec![Box::new(RetryOn5xx), Box::new(RetryOnTimeout)]);
/// ```
pub struct OrPredicate<E = Error> {
    predicates: Vec<Box<dyn RetryPredicate<E>>>,
}

impl<E> OrPredicate<E> {
    /// Creates a new `OrPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate<E>>>) -> Self {
        Self { predicates }
    }
}

impl<E> RetryPredicate<E> for OrPredicate<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> bool {
        self.predicates
            .iter()
            .any(|p| p.should_retry(error, attempt))
    }
}

/// Combine multiple retry predicates with AND logic.
///
/// # Examples
///
/// ```
/// use cachet::retry::{AndPredicate, RetryOn5xx};
/// use cachet::{Error, RetryPredicate};
///
/// struct FirstAttemptsOnly(u32);
///
/// impl RetryPredicate for FirstAttemptsOnly {
///     fn should_retry(&self, _error: &Error, attempt: u32) -> bool {
///         attempt < self.0
///     }
/// }
///
/// let predicate = AndPredicate::new(vec![Box::new(RetryOn5xx), Box::new(FirstAttemptsOnly(2))]);
/// ```
pub struct AndPredicate<E = Error> {
    predicates: Vec<Box<dyn RetryPredicate<E>>>,
}

impl<E> AndPredicate<E> {
    /// Creates a new `AndPredicate` from a list of predicates.
    pub fn new(predicates: Vec<Box<dyn RetryPredicate<E>>>) -> Self {
        Self { predicates }
    }
}

impl<E> RetryPredicate<E> for AndPredicate<E> {
    fn should_retry(&self, error: &E, attempt: u32) -> bool {
        self.predicates
            .iter()
            .all(|p| p.should_retry(error, attempt))
    }
}

struct FnPredicate<F>(F);

impl<E, F> RetryPredicate<E> for FnPredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E, _attempt: u32) -> bool {
        (self.0)(error)
    }
}

/// Settings for [`retry`].
///
/// Defaults to 3 retries (4 attempts in total), exponential backoff starting
/// at one second and capped at 30 seconds, and retrying every error.
///
/// # Examples
///
/// ```
/// use cachet::RetryConfig;
/// use std::time::Duration;
///
/// let config: RetryConfig = RetryConfig::new()
///     .retries(5)
///     .fixed_delay(Duration::from_millis(200))
///     .retry_condition(|error: &cachet::Error| error.is_retryable());
/// assert_eq!(config.retries, 5);
/// ```
pub struct RetryConfig<E = Error> {
    /// Maximum number of retries after the first attempt.
    pub retries: u32,
    /// Delay policy between attempts.
    pub delay: RetryDelay,
    predicate: Arc<dyn RetryPredicate<E>>,
}

impl<E: 'static> RetryConfig<E> {
    pub fn new() -> Self {
        Self {
            retries: 3,
            delay: RetryDelay::default(),
            predicate: Arc::new(Always),
        }
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn delay(mut self, delay: RetryDelay) -> Self {
        self.delay = delay;
        self
    }

    pub fn fixed_delay(self, delay: Duration) -> Self {
        self.delay(RetryDelay::Fixed(delay))
    }

    pub fn delay_fn<F>(self, f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.delay(RetryDelay::custom(f))
    }

    /// Retries only errors for which `condition` returns `true`.
    pub fn retry_condition<F>(self, condition: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_predicate(FnPredicate(condition))
    }

    /// Uses a [`RetryPredicate`] to decide whether to retry.
    pub fn retry_predicate(mut self, predicate: impl RetryPredicate<E> + 'static) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }

    pub(crate) fn should_retry(&self, error: &E, attempt: u32) -> bool {
        attempt < self.retries && self.predicate.should_retry(error, attempt)
    }
}

impl<E: 'static> Default for RetryConfig<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            retries: self.retries,
            delay: self.delay.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryConfig<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("retries", &self.retries)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

/// Runs `operation` until it succeeds, the predicate refuses, or the
/// retries are used up. The last error is returned unchanged.
///
/// # Examples
///
/// ```no_run
/// use cachet::{retry, Client, RetryConfig};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), cachet::Error> {
/// let client = Client::builder().base_url("https://api.example.com")?.build()?;
///
/// let config = RetryConfig::new()
///     .retries(3)
///     .delay_fn(|attempt| Duration::from_millis(100 * (attempt as u64 + 1)))
///     .retry_condition(|error: &cachet::Error| error.is_retryable());
///
/// let user = retry(|| client.get::<serde_json::Value>("/users/1", None), &config).await?;
/// # let _ = user;
/// # Ok(())
/// # }
/// ```
pub async fn retry<T, E, F, Fut>(mut operation: F, config: &RetryConfig<E>) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display + 'static,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                tracing::warn!(error = %error, attempt = attempt, "Attempt failed");

                if !config.should_retry(&error, attempt) {
                    return Err(error);
                }

                let delay = config.delay.delay_for_attempt(attempt);
                tracing::info!(
                    delay_ms = delay.as_millis(),
                    attempt = attempt,
                    "Retrying after delay"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
