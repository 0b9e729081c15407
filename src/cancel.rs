//! Cancellation handles for in-flight requests.
//!
//! A [`Cancellation`] owns a [`CancellationToken`]. Pass the token into a
//! request with [`RequestConfig::with_cancellation`](crate::config::RequestConfig::with_cancellation);
//! cancelling it aborts the transport call, which then fails with
//! [`Error::Cancelled`](crate::Error::Cancelled).

use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

/// A cancellation signal plus the means to fire it.
///
/// # Examples
///
/// ```no_run
/// use cachet::{create_cancellation, Client, RequestConfig};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), cachet::Error> {
/// let client = Client::builder().base_url("https://api.example.com")?.build()?;
///
/// // Abort the request if it has not finished after two seconds.
/// let cancellation = create_cancellation(Some(Duration::from_secs(2)));
/// let config = RequestConfig::default().with_cancellation(cancellation.token());
///
/// let result = client.get::<serde_json::Value>("/slow", config).await;
/// # let _ = result;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
}

impl Cancellation {
    /// Creates a handle that only fires when [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token to thread through request configurations.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Creates a cancellation handle, optionally firing on its own after `timeout`.
///
/// The timer task exits early if the handle is cancelled by hand.
///
/// # Panics
///
/// Panics if a `timeout` is given outside of a tokio runtime.
pub fn create_cancellation(timeout: Option<Duration>) -> Cancellation {
    let cancellation = Cancellation::new();

    if let Some(timeout) = timeout {
        let token = cancellation.token();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    tracing::debug!(timeout_ms = timeout.as_millis(), "Cancellation deadline reached");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });
    }

    cancellation
}
