//! Basic example demonstrating requests, interceptors and caching.
//!
//! This example shows how to:
//! - Create a client with a base URL and default headers
//! - Make GET requests with query parameters
//! - Make POST requests to create data
//! - Stamp every request with an interceptor
//! - Serve repeated GETs from the response cache
//!
//! Run with: `cargo run --example basic_call`

use cachet::{CacheConfig, Client, Error, Interceptor, RequestConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("cachet=debug,basic_call=info")
        .init();

    // Create a client for the JSONPlaceholder API
    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .default_header("accept", "application/json")?
        .timeout(Duration::from_secs(10))
        .build()?;

    client.intercept_request(Interceptor::new().on_fulfilled(|config: RequestConfig| async move {
        config.with_header("x-request-source", "basic_call")
    }));

    println!("=== GET Request Example ===");
    let response = client.get::<Post>("/posts/1", None).await?;

    println!("Post ID: {}", response.data.id);
    println!("Title: {}", response.data.title);
    println!("Request latency: {:?}", response.latency);
    println!("Status: {} {}", response.status, response.status_text);
    println!();

    println!("=== GET With Params ===");
    let page = RequestConfig::default().with_param("userId", 1);
    let posts = client.get::<Vec<Post>>("/posts", page).await?;
    println!("User 1 has {} posts", posts.data.len());
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };

    let response = client.post::<_, Post>("/posts", &new_post, None).await?;
    println!("Created post ID: {}", response.data.id);
    println!("Content-Type: {:?}", response.header("content-type"));
    println!();

    println!("=== Cached GET ===");
    let cached = RequestConfig::default().with_cache(CacheConfig::ttl(Duration::from_secs(30)));
    let first = client.get::<Post>("/posts/2", cached.clone()).await?;
    let second = client.get::<Post>("/posts/2", cached).await?;
    println!("First latency: {:?}", first.latency);
    println!("Second call served from cache with the same latency: {:?}", second.latency);
    println!("Cached responses: {}", client.cached_responses());

    Ok(())
}
