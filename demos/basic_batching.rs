//! Two logical calls, one physical round trip.
//!
//! Run with a backend that exposes a multipart batch endpoint:
//!
//! ```bash
//! RUST_LOG=http_batcher=debug cargo run --example basic_batching -- https://api.example.com/
//! ```

use http_batcher::{EndpointConfig, HttpBatcher, HttpRequest};
use std::time::Duration;

#[tokio::main]
async fn main() -> http_batcher::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let root = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://api.example.com/".to_string());
    let batch_endpoint = format!("{}$batch", root);

    let batcher = HttpBatcher::builder()
        .with_configuration(
            EndpointConfig::new(root.clone(), batch_endpoint)
                .with_collection_delay(Duration::from_millis(50)),
        )
        .build()?;

    let (users, orders) = tokio::join!(
        batcher.request(HttpRequest::get(format!("{}users", root))),
        batcher.request(HttpRequest::get(format!("{}orders", root))),
    );

    match users {
        Ok(response) => println!("users  -> HTTP {}", response.status),
        Err(error) => println!("users  -> {}", error),
    }
    match orders {
        Ok(response) => println!("orders -> HTTP {}", response.status),
        Err(error) => println!("orders -> {}", error),
    }
    Ok(())
}
