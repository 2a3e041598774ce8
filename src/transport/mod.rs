//! # Transport Module
//!
//! The narrow capability the batcher uses to perform physical HTTP calls.
//!
//! The core treats the transport as opaque: it does not retry, pool
//! connections, or set timeouts itself. [`HttpTransport`] is the production
//! implementation on `reqwest`; tests substitute their own
//! [`Transport`] doubles.

mod http;

pub use http::HttpTransport;

use crate::types::{HttpRequest, HttpResponse};
use async_trait::async_trait;

/// Performs one physical HTTP call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Other(String),
}
