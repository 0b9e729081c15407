//! Example demonstrating the retry helper.
//!
//! This example shows how to:
//! - Retry with the default exponential backoff
//! - Use a fixed or computed delay
//! - Restrict retries with predicates
//!
//! Run with: `cargo run --example retry_strategies`

use cachet::retry::{OrPredicate, RetryOn5xx, RetryOnTimeout};
use cachet::{retry, Client, Error, RetryConfig, RetryDelay};
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing to see retry attempts
    tracing_subscriber::fmt()
        .with_env_filter("cachet=info,retry_strategies=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .timeout(Duration::from_secs(5))
        .build()?;

    println!("=== Exponential Backoff ===");
    println!("Delays: 100ms, 200ms, 400ms (with jitter)");
    let exponential = RetryConfig::new().retries(3).delay(RetryDelay::Exponential {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(30),
        jitter: true,
    });

    let start = Instant::now();
    match retry(|| client.get::<serde_json::Value>("/posts/999999", None), &exponential).await {
        Ok(response) => println!("Response: {:?}", response.data),
        Err(e) => {
            println!("Failed after retries: {}", e);
            println!("Total time: {:?}", start.elapsed());
        }
    }
    println!();

    println!("=== Computed Delay ===");
    println!("Delays: 0ms, 250ms, 500ms");
    let linear = RetryConfig::new()
        .retries(3)
        .delay_fn(|attempt| Duration::from_millis(250 * attempt as u64));

    let response = retry(|| client.get::<serde_json::Value>("/posts/1", None), &linear).await?;
    println!("Succeeded: {}", response.data["title"]);
    println!();

    println!("=== Retry Only Server Errors And Timeouts ===");
    let selective = RetryConfig::new()
        .retries(5)
        .fixed_delay(Duration::from_millis(200))
        .retry_predicate(OrPredicate::new(vec![
            Box::new(RetryOn5xx),
            Box::new(RetryOnTimeout),
        ]));

    // A 404 is neither, so this fails after a single attempt.
    let start = Instant::now();
    match retry(|| client.get::<serde_json::Value>("/nonexistent", None), &selective).await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => println!("Failed without retrying in {:?}: {}", start.elapsed(), e),
    }

    Ok(())
}
