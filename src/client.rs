//! # Client Module
//!
//! [`HttpBatcher`] is the dispatch front door: it matches every outgoing
//! request against the configured endpoints and either forwards it to that
//! endpoint's batch scheduler or performs it directly through the transport,
//! untouched.
//!
//! A request bypasses batching when no configuration matches its URL, when
//! the matching configuration is disabled, or when its verb is in the
//! configuration's ignored set.

use crate::codec;
use crate::config::{ConfigCollection, EndpointConfig};
use crate::scheduler::{BatchScheduler, PendingEntry};
use crate::transport::{HttpTransport, Transport};
use crate::types::{HttpRequest, HttpResponse};
use crate::{Error, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Marks one submitted request as cancelled.
///
/// Cancellation is best-effort: before its batch is flushed the entry is
/// dropped silently and receives no outcome; once the physical call is in
/// flight the outcome is simply discarded.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self { cancelled }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Batching HTTP front door with one scheduler per configured endpoint.
pub struct HttpBatcher {
    configurations: ConfigCollection,
    schedulers: Vec<BatchScheduler>,
    transport: Arc<dyn Transport>,
}

impl HttpBatcher {
    pub fn builder() -> HttpBatcherBuilder {
        HttpBatcherBuilder::new()
    }

    pub fn new(configurations: ConfigCollection, transport: Arc<dyn Transport>) -> Self {
        let schedulers = configurations
            .configurations()
            .iter()
            .map(|config| {
                BatchScheduler::new(
                    Arc::clone(config),
                    codec::codec_for(config),
                    Arc::clone(&transport),
                )
            })
            .collect();
        Self {
            configurations,
            schedulers,
            transport,
        }
    }

    /// Perform a request, batching it when a matching configuration allows.
    pub async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let (_handle, outcome) = self.request_with_cancel(request);
        outcome.await
    }

    /// Like [`HttpBatcher::request`], but also hands back a [`CancelHandle`]
    /// usable until the outcome is delivered.
    pub fn request_with_cancel(
        &self,
        request: HttpRequest,
    ) -> (CancelHandle, impl Future<Output = Result<HttpResponse>> + '_) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = CancelHandle::new(Arc::clone(&cancelled));
        let outcome = async move {
            match self.scheduler_for(&request) {
                Some(scheduler) => {
                    let (entry, receiver) = PendingEntry::with_cancellation(request, cancelled);
                    scheduler.submit(entry).await;
                    match receiver.await {
                        Ok(outcome) => outcome,
                        // The sink was dropped without an outcome: the entry
                        // was discarded as cancelled.
                        Err(_) => Err(Error::Cancelled),
                    }
                }
                None => self.transport.perform(request).await.map_err(Error::from),
            }
        };
        (handle, outcome)
    }

    /// The scheduler this request batches through, or `None` for the
    /// pass-through path.
    fn scheduler_for(&self, request: &HttpRequest) -> Option<BatchScheduler> {
        let config = self.configurations.config_for_url(&request.url)?;
        if !config.enabled || config.ignores_verb(request.method) {
            return None;
        }
        self.schedulers
            .iter()
            .find(|scheduler| {
                scheduler.config().batch_endpoint_url == config.batch_endpoint_url
            })
            .cloned()
    }
}

/// Assembles an [`HttpBatcher`] from endpoint configurations and an
/// optional custom transport.
#[derive(Default)]
pub struct HttpBatcherBuilder {
    configurations: Vec<EndpointConfig>,
    transport: Option<Arc<dyn Transport>>,
}

impl HttpBatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configuration(mut self, configuration: EndpointConfig) -> Self {
        self.configurations.push(configuration);
        self
    }

    pub fn with_configurations(mut self, configurations: ConfigCollection) -> Self {
        self.configurations.extend(
            configurations
                .configurations()
                .iter()
                .map(|config| (**config).clone()),
        );
        self
    }

    /// Substitute the transport the batcher performs physical calls with.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<HttpBatcher> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        Ok(HttpBatcher::new(
            ConfigCollection::new(self.configurations),
            transport,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{count_parts, multipart_ok_response, MockTransport};
    use crate::types::{HttpResponse, Method};
    use std::time::Duration;

    fn test_config() -> EndpointConfig {
        EndpointConfig::new("https://api.abc.com/", "https://api.abc.com/$batch")
            .with_collection_delay(Duration::from_millis(20))
    }

    fn batching_transport() -> Arc<MockTransport> {
        MockTransport::new(|request| {
            if request.url.ends_with("$batch") {
                let parts = count_parts(request.body.as_deref().unwrap_or_default());
                Ok(multipart_ok_response(parts))
            } else {
                Ok(HttpResponse::new(200, "OK").with_body("direct"))
            }
        })
    }

    #[tokio::test]
    async fn matching_requests_are_batched() {
        let transport = batching_transport();
        let batcher = HttpBatcher::builder()
            .with_configuration(test_config())
            .with_transport(transport.clone())
            .build()
            .unwrap();

        let (response_a, response_b) = tokio::join!(
            batcher.request(HttpRequest::get("https://api.abc.com/users")),
            batcher.request(HttpRequest::get("https://api.abc.com/orders")),
        );
        assert_eq!(response_a.unwrap().body.as_deref(), Some("{\"part\":0}"));
        assert_eq!(response_b.unwrap().body.as_deref(), Some("{\"part\":1}"));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(transport.calls()[0].url, "https://api.abc.com/$batch");
    }

    #[tokio::test]
    async fn unmatched_urls_pass_through() {
        let transport = batching_transport();
        let batcher = HttpBatcher::builder()
            .with_configuration(test_config())
            .with_transport(transport.clone())
            .build()
            .unwrap();

        let response = batcher
            .request(HttpRequest::get("https://other.example.org/users"))
            .await
            .unwrap();
        assert_eq!(response.body.as_deref(), Some("direct"));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(transport.calls()[0].url, "https://other.example.org/users");
    }

    #[tokio::test]
    async fn disabled_configurations_pass_through() {
        let transport = batching_transport();
        let batcher = HttpBatcher::builder()
            .with_configuration(test_config().with_enabled(false))
            .with_transport(transport.clone())
            .build()
            .unwrap();

        let response = batcher
            .request(HttpRequest::get("https://api.abc.com/users"))
            .await
            .unwrap();
        assert_eq!(response.body.as_deref(), Some("direct"));
        assert_eq!(transport.calls()[0].url, "https://api.abc.com/users");
    }

    #[tokio::test]
    async fn ignored_verbs_pass_through() {
        let transport = batching_transport();
        let batcher = HttpBatcher::builder()
            .with_configuration(test_config())
            .with_transport(transport.clone())
            .build()
            .unwrap();

        let response = batcher
            .request(HttpRequest::new(Method::Head, "https://api.abc.com/users"))
            .await
            .unwrap();
        assert_eq!(response.body.as_deref(), Some("direct"));
        assert_eq!(transport.call_count(), 1);
        assert_eq!(transport.calls()[0].method, Method::Head);
    }

    #[tokio::test]
    async fn cancel_handle_withdraws_an_entry_before_flush() {
        let transport = batching_transport();
        let batcher = HttpBatcher::builder()
            .with_configuration(test_config().with_min_requests_per_batch(2))
            .with_transport(transport.clone())
            .build()
            .unwrap();

        let (handle, cancelled_outcome) =
            batcher.request_with_cancel(HttpRequest::get("https://api.abc.com/orders"));
        handle.cancel();
        assert!(handle.is_cancelled());

        let (keep_a, keep_b, dropped) = tokio::join!(
            batcher.request(HttpRequest::get("https://api.abc.com/users")),
            batcher.request(HttpRequest::get("https://api.abc.com/carts")),
            cancelled_outcome,
        );
        assert!(keep_a.is_ok());
        assert!(keep_b.is_ok());
        assert!(matches!(dropped.unwrap_err(), Error::Cancelled));

        let body = transport.calls()[0].body.clone().unwrap();
        assert_eq!(count_parts(&body), 2);
        assert!(!body.contains("GET /orders"));
    }

    #[tokio::test]
    async fn a_custom_codec_replaces_the_multipart_format() {
        use crate::codec::{BatchCodec, CodecSelector};

        /// Toy codec: one URL per line out, one body per line back.
        struct NewlineCodec;

        impl BatchCodec for NewlineCodec {
            fn encode(&self, requests: &[HttpRequest]) -> crate::Result<HttpRequest> {
                let body = requests
                    .iter()
                    .map(|request| request.url.clone())
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(HttpRequest::post("https://api.abc.com/$batch").with_body(body))
            }

            fn decode(
                &self,
                response: &HttpResponse,
            ) -> crate::Result<Vec<crate::Result<HttpResponse>>> {
                Ok(response
                    .body
                    .as_deref()
                    .unwrap_or_default()
                    .lines()
                    .map(|line| Ok(HttpResponse::new(200, "OK").with_body(line.to_string())))
                    .collect())
            }
        }

        let transport = MockTransport::new(|request| {
            let echoed = request
                .body
                .as_deref()
                .unwrap_or_default()
                .lines()
                .map(|url| format!("echo {}", url))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(HttpResponse::new(200, "OK").with_body(echoed))
        });
        let batcher = HttpBatcher::builder()
            .with_configuration(
                test_config().with_codec(CodecSelector::Custom(Arc::new(NewlineCodec))),
            )
            .with_transport(transport.clone())
            .build()
            .unwrap();

        let (response_a, response_b) = tokio::join!(
            batcher.request(HttpRequest::get("https://api.abc.com/users")),
            batcher.request(HttpRequest::get("https://api.abc.com/orders")),
        );
        assert_eq!(
            response_a.unwrap().body.as_deref(),
            Some("echo https://api.abc.com/users")
        );
        assert_eq!(
            response_b.unwrap().body.as_deref(),
            Some("echo https://api.abc.com/orders")
        );
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn first_matching_configuration_routes_the_request() {
        let transport = batching_transport();
        let versioned = EndpointConfig::new("https://api.abc.com/1/", "https://api.abc.com/1/$batch")
            .with_collection_delay(Duration::from_millis(20));
        let batcher = HttpBatcher::builder()
            .with_configuration(versioned)
            .with_configuration(test_config())
            .with_transport(transport.clone())
            .build()
            .unwrap();

        let (response_a, response_b) = tokio::join!(
            batcher.request(HttpRequest::get("https://api.abc.com/1/users")),
            batcher.request(HttpRequest::get("https://api.abc.com/1/orders")),
        );
        assert!(response_a.is_ok());
        assert!(response_b.is_ok());
        assert_eq!(transport.calls()[0].url, "https://api.abc.com/1/$batch");
    }
}
