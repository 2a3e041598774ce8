//! Response-side value types.

use super::request::Headers;

/// An HTTP response: either the combined physical response of a batch call,
/// or one per-request response split out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body: Option<String>,
    /// The URL of the originating request. Split responses get this
    /// rewritten to the logical request's URL after decoding, as a
    /// diagnostic convenience.
    pub url: Option<String>,
}

impl HttpResponse {
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Headers::new(),
            body: None,
            url: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// True for statuses in `[200, 300)`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
