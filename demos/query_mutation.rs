//! Example demonstrating observable queries and mutations.
//!
//! This example shows how to:
//! - Drive loading, data and error state from a GET with `use_query`
//! - Refetch on focus and on an interval
//! - Gate a query behind an `enabled` switch
//! - Run writes through `use_mutation`
//!
//! Run with: `cargo run --example query_mutation`

use cachet::reactive::Observable;
use cachet::{
    use_mutation, use_query, Client, Error, FocusEvents, MutationOptions, QueryOptions,
    RetryConfig,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
struct Todo {
    id: u32,
    title: String,
    completed: bool,
}

#[derive(Debug, Clone, Serialize)]
struct NewTodo {
    title: String,
    completed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("cachet=debug,query_mutation=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .build()?;

    println!("=== Query ===");
    let focus = FocusEvents::new();
    let enabled = Observable::new(false);

    let fetch_client = client.clone();
    let todo = use_query(
        ["todos", "1"],
        move || {
            let client = fetch_client.clone();
            async move { client.get::<Todo>("/todos/1", None).await }
        },
        QueryOptions::new()
            .enabled_when(enabled.clone())
            .refetch_on_window_focus(&focus)
            .refetch_interval(Duration::from_secs(30))
            .retry(RetryConfig::new().retries(2).fixed_delay(Duration::from_millis(200)))
            .on_success(|todo: &Todo| println!("Loaded todo {}: {}", todo.id, todo.title)),
    );

    let _loading = todo
        .is_loading
        .subscribe(|loading| println!("Loading: {}", loading));

    println!("Disabled, nothing fetched yet: {:?}", todo.data.get());
    enabled.set(true);
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("Success: {}", todo.is_success.get());

    // Simulate the window regaining focus
    focus.notify_focus();
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!();

    println!("=== Mutation ===");
    let create = use_mutation(
        move |todo: NewTodo| {
            let client = client.clone();
            async move { client.post::<_, Todo>("/todos", &todo, None).await }
        },
        MutationOptions::new()
            .on_mutate(|todo: &NewTodo| println!("Creating {:?}", todo.title))
            .on_error(|error, todo: &NewTodo| println!("Could not create {}: {}", todo.title, error)),
    );

    let created = create
        .mutate(NewTodo {
            title: "Write the docs".to_string(),
            completed: false,
        })
        .await?;
    println!("Created todo with ID {}", created.id);
    println!("Mutation data: {:?}", create.data.get());

    create.reset();
    println!("After reset: {:?}", create.data.get());

    Ok(())
}
