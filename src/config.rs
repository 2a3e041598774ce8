//! Endpoint configuration: which URLs are batchable, where their batch
//! endpoint lives, and the collection policy for each.
//!
//! Configurations come in two shapes: [`EndpointOptions`], a serde-friendly
//! options document with default-value resolution, and [`EndpointConfig`],
//! the immutable resolved form the scheduler and codec consume. Options can
//! be written inline, or loaded from YAML/JSON documents via
//! [`ConfigCollection::from_yaml_str`] / [`ConfigCollection::from_json_str`].

use crate::codec::CodecSelector;
use crate::types::{HttpRequest, Method};
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Hook invoked synchronously on the assembled multipart envelope just
/// before it is sent. May mutate headers, e.g. to inject credentials.
pub type BeforeSendHook = Arc<dyn Fn(&mut HttpRequest) + Send + Sync>;

/// Supplies the current cookie string when cookie forwarding is enabled.
/// Stands in for an ambient browser cookie jar.
pub type CookieSource = Arc<dyn Fn() -> String + Send + Sync>;

/// Deserializable endpoint options with the stock defaults applied to any
/// omitted field.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointOptions {
    /// Root URL prefix; requests whose URL contains it are batch candidates.
    pub root_endpoint_url: String,
    /// URL of the batch endpoint associated with the root endpoint.
    pub batch_endpoint_url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum queued requests for a flush to use the batch endpoint at all.
    #[serde(default = "default_min_requests")]
    pub min_requests_per_batch: usize,
    /// Queue size that forces an immediate flush.
    #[serde(default = "default_max_requests")]
    pub max_requests_per_batch: usize,
    /// Time between the first queued request and the flush.
    #[serde(default = "default_collection_delay_ms")]
    pub collection_delay_ms: u64,
    /// Requests with these verbs bypass batching entirely.
    #[serde(default = "default_ignored_verbs")]
    pub ignored_verbs: Vec<Method>,
    /// Tag appended to content-disposition headers as `; name=<tag><index>`.
    /// Needed by some Java servers.
    #[serde(default)]
    pub unique_request_name: Option<String>,
    /// Forward cookies into each part. Off by default to keep envelopes small.
    #[serde(default)]
    pub send_cookies: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_min_requests() -> usize {
    2
}

fn default_max_requests() -> usize {
    20
}

fn default_collection_delay_ms() -> u64 {
    75
}

fn default_ignored_verbs() -> Vec<Method> {
    vec![Method::Head, Method::Options]
}

impl EndpointOptions {
    pub fn new(root_endpoint_url: impl Into<String>, batch_endpoint_url: impl Into<String>) -> Self {
        Self {
            root_endpoint_url: root_endpoint_url.into(),
            batch_endpoint_url: batch_endpoint_url.into(),
            enabled: default_enabled(),
            min_requests_per_batch: default_min_requests(),
            max_requests_per_batch: default_max_requests(),
            collection_delay_ms: default_collection_delay_ms(),
            ignored_verbs: default_ignored_verbs(),
            unique_request_name: None,
            send_cookies: false,
        }
    }
}

/// Immutable per-endpoint configuration. One instance per configured backend
/// service, created at startup and shared by reference from then on.
#[derive(Clone)]
pub struct EndpointConfig {
    pub root_endpoint_url: String,
    pub batch_endpoint_url: String,
    pub enabled: bool,
    pub min_requests_per_batch: usize,
    pub max_requests_per_batch: usize,
    pub collection_delay: Duration,
    pub ignored_verbs: Vec<Method>,
    pub unique_request_name: Option<String>,
    pub send_cookies: bool,
    pub cookie_source: Option<CookieSource>,
    pub on_before_send: Option<BeforeSendHook>,
    pub codec: CodecSelector,
}

impl EndpointConfig {
    pub fn new(root_endpoint_url: impl Into<String>, batch_endpoint_url: impl Into<String>) -> Self {
        Self::from_options(EndpointOptions::new(root_endpoint_url, batch_endpoint_url))
    }

    pub fn from_options(options: EndpointOptions) -> Self {
        Self {
            root_endpoint_url: options.root_endpoint_url,
            batch_endpoint_url: options.batch_endpoint_url,
            enabled: options.enabled,
            min_requests_per_batch: options.min_requests_per_batch,
            max_requests_per_batch: options.max_requests_per_batch,
            collection_delay: Duration::from_millis(options.collection_delay_ms),
            ignored_verbs: options.ignored_verbs,
            unique_request_name: options.unique_request_name,
            send_cookies: options.send_cookies,
            cookie_source: None,
            on_before_send: None,
            codec: CodecSelector::MultipartMixed,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_requests_per_batch(mut self, min: usize) -> Self {
        self.min_requests_per_batch = min;
        self
    }

    pub fn with_max_requests_per_batch(mut self, max: usize) -> Self {
        self.max_requests_per_batch = max;
        self
    }

    pub fn with_collection_delay(mut self, delay: Duration) -> Self {
        self.collection_delay = delay;
        self
    }

    pub fn with_ignored_verbs(mut self, verbs: Vec<Method>) -> Self {
        self.ignored_verbs = verbs;
        self
    }

    pub fn with_unique_request_name(mut self, name: impl Into<String>) -> Self {
        self.unique_request_name = Some(name.into());
        self
    }

    pub fn with_send_cookies(mut self, send: bool) -> Self {
        self.send_cookies = send;
        self
    }

    pub fn with_cookie_source(mut self, source: CookieSource) -> Self {
        self.cookie_source = Some(source);
        self
    }

    pub fn with_before_send_hook(mut self, hook: BeforeSendHook) -> Self {
        self.on_before_send = Some(hook);
        self
    }

    pub fn with_codec(mut self, codec: CodecSelector) -> Self {
        self.codec = codec;
        self
    }

    /// True when `url` targets this endpoint. Substring containment in
    /// declaration order, matching the source behavior.
    pub fn matches(&self, url: &str) -> bool {
        url.contains(&self.root_endpoint_url)
    }

    pub fn ignores_verb(&self, method: Method) -> bool {
        self.ignored_verbs.contains(&method)
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("root_endpoint_url", &self.root_endpoint_url)
            .field("batch_endpoint_url", &self.batch_endpoint_url)
            .field("enabled", &self.enabled)
            .field("min_requests_per_batch", &self.min_requests_per_batch)
            .field("max_requests_per_batch", &self.max_requests_per_batch)
            .field("collection_delay", &self.collection_delay)
            .field("ignored_verbs", &self.ignored_verbs)
            .field("unique_request_name", &self.unique_request_name)
            .field("send_cookies", &self.send_cookies)
            .field("has_cookie_source", &self.cookie_source.is_some())
            .field("has_before_send_hook", &self.on_before_send.is_some())
            .field("codec", &self.codec)
            .finish()
    }
}

/// All configured endpoints, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ConfigCollection {
    configurations: Vec<Arc<EndpointConfig>>,
}

impl ConfigCollection {
    pub fn new(configurations: Vec<EndpointConfig>) -> Self {
        Self {
            configurations: configurations.into_iter().map(Arc::new).collect(),
        }
    }

    /// Parse a YAML sequence of endpoint options documents.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let options: Vec<EndpointOptions> = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Configuration(format!("invalid endpoint YAML: {}", e)))?;
        Ok(Self::new(
            options.into_iter().map(EndpointConfig::from_options).collect(),
        ))
    }

    /// Parse a JSON array of endpoint options documents.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Vec<EndpointOptions> = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid endpoint JSON: {}", e)))?;
        Ok(Self::new(
            options.into_iter().map(EndpointConfig::from_options).collect(),
        ))
    }

    /// First configuration whose root endpoint URL is contained in `url`.
    ///
    /// First match wins when several roots overlap; the declaration order of
    /// the collection is the tiebreak.
    pub fn config_for_url(&self, url: &str) -> Option<&Arc<EndpointConfig>> {
        self.configurations.iter().find(|config| config.matches(url))
    }

    pub fn configurations(&self) -> &[Arc<EndpointConfig>] {
        &self.configurations
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }
}
