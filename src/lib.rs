//! # http-batcher
//!
//! Transparent HTTP request batching: bursts of independent requests issued
//! within a short window are folded into one `multipart/mixed` physical
//! call, and the combined response is demultiplexed back to each caller in
//! order.
//!
//! ## Overview
//!
//! Applications that fan out many small API calls pay one network round
//! trip per call. This library intercepts outgoing requests, groups the
//! ones aimed at a configured backend, and replaces N round trips with one,
//! without the callers noticing: each still awaits its own response.
//!
//! ## Core Pieces
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`HttpBatcher`] front door: match, forward or pass through |
//! | [`scheduler`] | Per-endpoint collection queue, timers and delivery |
//! | [`codec`] | `multipart/mixed` encode/decode of batched payloads |
//! | [`config`] | Endpoint configuration and URL matching |
//! | [`transport`] | The physical-call capability (reqwest-backed default) |
//! | [`types`] | HTTP request/response value types |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use http_batcher::{EndpointConfig, HttpBatcher, HttpRequest};
//!
//! #[tokio::main]
//! async fn main() -> http_batcher::Result<()> {
//!     let batcher = HttpBatcher::builder()
//!         .with_configuration(EndpointConfig::new(
//!             "https://api.abc.com/",
//!             "https://api.abc.com/$batch",
//!         ))
//!         .build()?;
//!
//!     // Issued together, these share one physical round trip.
//!     let (users, orders) = tokio::join!(
//!         batcher.request(HttpRequest::get("https://api.abc.com/users")),
//!         batcher.request(HttpRequest::get("https://api.abc.com/orders")),
//!     );
//!     println!("{} / {}", users?.status, orders?.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! - Within one batch, responses are delivered in submission order; part
//!   *i* of the envelope always answers request *i*.
//! - A malformed part or a non-success status affects only its own entry.
//! - Transport and framing failures of the combined call reach every entry
//!   of that batch.
//! - Cancelled entries are dropped at flush time and receive no outcome.

pub mod client;
pub mod codec;
pub mod config;
pub mod scheduler;
pub mod transport;
pub mod types;

pub mod error;
pub use error::Error;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use client::{CancelHandle, HttpBatcher, HttpBatcherBuilder};
pub use codec::{BatchCodec, CodecSelector, MultipartMixedCodec};
pub use config::{ConfigCollection, EndpointConfig, EndpointOptions};
pub use scheduler::BatchScheduler;
pub use transport::{HttpTransport, Transport, TransportError};
pub use types::{Headers, HttpRequest, HttpResponse, Method};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
