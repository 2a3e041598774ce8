//! The `multipart/mixed` batch codec.
//!
//! See <https://cloud.google.com/storage/docs/json_api/v1/how-tos/batch> for
//! the conventions this format follows.

use super::BatchCodec;
use crate::config::{CookieSource, EndpointConfig};
use crate::types::{Headers, HttpRequest, HttpResponse};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

const HTTP_VERSION_1_1: &str = "HTTP/1.1";
const DEFAULT_BOUNDARY: &str = "1494052623884";
const MULTIPART_MIXED_CONTENT_TYPE: &str = "multipart/mixed; boundary=";
const CONTENT_ID_NAMESPACE: &str = "b29c5de2-0db4-490b-b421-6a51b598bd22";
const ACCEPT: &str = "application/json, text/plain, */*";
const NEW_LINE: &str = "\r\n";

/// Anti-JSON-hijacking prefix some backends emit before JSON bodies.
static XSSI_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\)\]\}',?\r?\n").unwrap());

/// Built-in `multipart/mixed` codec.
///
/// The boundary token is a fixed literal per codec instance, not regenerated
/// per call; [`MultipartMixedCodec::with_random_boundary`] opts into a
/// per-instance random token instead.
pub struct MultipartMixedCodec {
    boundary: String,
    batch_endpoint_url: String,
    unique_request_name: Option<String>,
    send_cookies: bool,
    cookie_source: Option<CookieSource>,
}

impl MultipartMixedCodec {
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            boundary: DEFAULT_BOUNDARY.to_string(),
            batch_endpoint_url: config.batch_endpoint_url.clone(),
            unique_request_name: config.unique_request_name.clone(),
            send_cookies: config.send_cookies,
            cookie_source: config.cookie_source.clone(),
        }
    }

    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    /// Use a random boundary token for this instance. Encode and decode stay
    /// in agreement because the response boundary is always read back from
    /// the combined response's own Content-Type header.
    pub fn with_random_boundary(mut self) -> Self {
        self.boundary = uuid::Uuid::new_v4().simple().to_string();
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    fn cookie_header(&self) -> Option<String> {
        if !self.send_cookies {
            return None;
        }
        let cookies = self.cookie_source.as_ref().map(|source| source())?;
        if cookies.is_empty() {
            None
        } else {
            Some(cookies)
        }
    }

    /// Emit the body lines of one request part.
    fn encode_part(&self, index: usize, request: &HttpRequest, lines: &mut Vec<String>) -> Result<()> {
        let url = Url::parse(&request.url).map_err(|e| {
            Error::Configuration(format!("cannot encode request URL '{}': {}", request.url, e))
        })?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(Error::Configuration(format!(
                    "request URL '{}' has no host",
                    request.url
                )))
            }
        };
        let search = url.query().map(|q| format!("?{}", q)).unwrap_or_default();

        // Part framing headers.
        lines.push(format!("--{}", self.boundary));
        lines.push("Content-Type: application/http; msgtype=request".to_string());
        lines.push(format!("Content-ID: <{}+{}>", CONTENT_ID_NAMESPACE, index));
        lines.push(String::new());

        // Inner request line and mandatory headers.
        lines.push(format!(
            "{} {}{} {}",
            request.method,
            url.path(),
            search,
            HTTP_VERSION_1_1
        ));
        lines.push(format!("Host: {}", host));
        lines.push(format!("Accept: {}", ACCEPT));

        // The request's own headers, verbatim except for the unique-name tag.
        for (name, value) in request.headers.iter() {
            let mut header = format!("{}: {}", name, value);
            if let Some(tag) = &self.unique_request_name {
                if name.to_ascii_lowercase().contains("content-disposition") {
                    header.push_str(&format!("; name={}{}", tag, index));
                }
            }
            lines.push(header);
        }

        if let Some(cookies) = self.cookie_header() {
            lines.push(format!("Cookie: {}", cookies));
        }

        lines.push(String::new());
        if let Some(body) = &request.body {
            lines.push(body.clone());
            lines.push(String::new());
        }
        lines.push(String::new());
        Ok(())
    }

    fn decode_part(&self, index: usize, segment: &str) -> Result<HttpResponse> {
        // A segment splits on double CRLF into at most three pieces: the
        // part framing header block, the inner status line plus headers,
        // and the inner body.
        let mut pieces = segment.splitn(3, "\r\n\r\n");
        let _framing = pieces.next();
        let status_block = pieces.next().ok_or_else(|| Error::PartDecode {
            index,
            message: "part has no inner status block".to_string(),
        })?;
        let raw_body = pieces.next();

        let mut lines = status_block.split(NEW_LINE);
        let status_line = lines.next().unwrap_or_default();
        let mut words = status_line.split(' ');
        let _version = words.next();
        let status = words
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| Error::PartDecode {
                index,
                message: format!("invalid inner status line '{}'", status_line),
            })?;
        let status_text = words.collect::<Vec<_>>().join(" ");

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) => headers.append(name.trim(), value.trim_start()),
                None => tracing::debug!(part = index, line, "skipping malformed inner header"),
            }
        }

        // The CRLF preceding the next delimiter belongs to the delimiter,
        // not the body.
        let body = raw_body.map(|body| {
            let body = body.strip_suffix(NEW_LINE).unwrap_or(body);
            XSSI_PREFIX.replace(body, "").into_owned()
        });

        Ok(HttpResponse {
            status,
            status_text,
            headers,
            body,
            url: None,
        })
    }
}

impl BatchCodec for MultipartMixedCodec {
    fn encode(&self, requests: &[HttpRequest]) -> Result<HttpRequest> {
        let mut lines = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            self.encode_part(index, request, &mut lines)?;
        }
        lines.push(format!("--{}--", self.boundary));

        let mut envelope =
            HttpRequest::post(&self.batch_endpoint_url).with_body(lines.join(NEW_LINE));
        envelope.headers.append(
            "Content-Type",
            format!("{}{}", MULTIPART_MIXED_CONTENT_TYPE, self.boundary),
        );
        Ok(envelope)
    }

    fn decode(&self, response: &HttpResponse) -> Result<Vec<Result<HttpResponse>>> {
        let content_type = response.headers.get_joined("Content-Type").ok_or_else(|| {
            Error::Framing("combined response has no Content-Type header".to_string())
        })?;
        let boundary = content_type
            .split_once(MULTIPART_MIXED_CONTENT_TYPE)
            .map(|(_, rest)| rest.replace('"', "").trim().to_string())
            .filter(|boundary| !boundary.is_empty())
            .ok_or_else(|| {
                Error::Framing(format!(
                    "combined response must carry a '{}<token>' Content-Type, got '{}'",
                    MULTIPART_MIXED_CONTENT_TYPE, content_type
                ))
            })?;

        let body = response.body.as_deref().unwrap_or_default();
        let delimiter = format!("--{}", boundary);
        let parts = body
            .split(delimiter.as_str())
            // Drop the leading empty segment and the closing-delimiter rest.
            .filter(|segment| !segment.is_empty() && *segment != "--" && *segment != "--\r\n")
            .enumerate()
            .map(|(index, segment)| self.decode_part(index, segment))
            .collect();
        Ok(parts)
    }
}
