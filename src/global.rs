//! Process-wide default client.

use crate::client::Client;
use crate::config::RequestConfig;
use crate::Result;
use std::sync::OnceLock;

static HTTP: OnceLock<Client> = OnceLock::new();

/// Returns the shared default client, building it on first use.
///
/// The client has no base URL and no default headers; tune it with
/// [`configure_http`]. Fails only if the underlying transport cannot be
/// constructed.
pub fn http() -> Result<&'static Client> {
    if let Some(client) = HTTP.get() {
        return Ok(client);
    }
    let client = Client::new()?;
    // A concurrent first call may have won; its client is kept.
    Ok(HTTP.get_or_init(|| client))
}

/// Merges `partial` into the shared client's defaults.
///
/// ```no_run
/// use cachet::{configure_http, http, RequestConfig};
///
/// # async fn example() -> Result<(), cachet::Error> {
/// configure_http(RequestConfig::default().with_base_url("https://api.example.com"))?;
/// let users = http()?.get::<serde_json::Value>("/users", None).await?;
/// # let _ = users;
/// # Ok(())
/// # }
/// ```
pub fn configure_http(partial: RequestConfig) -> Result<()> {
    http()?.set_config(partial);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_is_shared() {
        let first = http().unwrap();
        let second = http().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_configure_http_merges_defaults() {
        configure_http(RequestConfig::default().with_base_url("https://global.example.com"))
            .unwrap();
        assert_eq!(
            http().unwrap().config().base_url.as_deref(),
            Some("https://global.example.com")
        );
    }
}
