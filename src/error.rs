use crate::transport::TransportError;
use crate::types::HttpResponse;
use thiserror::Error;

/// Unified error type for the batcher.
///
/// The variants mirror how a batched call can fail: the whole physical call
/// (`Transport`), the framing of the combined response (`Framing`), one part
/// inside an otherwise well-framed response (`PartDecode`), or a single
/// upstream response with a non-success status (`UpstreamStatus`).
#[derive(Debug, Error)]
pub enum Error {
    /// The combined response could not be recognized as a multipart payload.
    /// Fatal for every entry in the batch.
    #[error("invalid multipart framing: {0}")]
    Framing(String),

    /// The physical call itself failed. Delivered identically to every entry
    /// of a batched call, or to the single affected entry on fan-out.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// One decoded response carried a status outside `[200, 300)`. Affects
    /// only the corresponding entry; the response is carried for inspection.
    #[error("upstream returned HTTP {} {}", .response.status, .response.status_text)]
    UpstreamStatus { response: HttpResponse },

    /// One part of a well-framed combined response was malformed, or the
    /// response carried no part at this entry's position. Isolated to the
    /// affected entry.
    #[error("failed to decode batch part {index}: {message}")]
    PartDecode { index: usize, message: String },

    /// Invalid endpoint configuration or an unencodable request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request was cancelled before an outcome was produced.
    #[error("request cancelled before completion")]
    Cancelled,
}

impl Error {
    pub fn upstream(response: HttpResponse) -> Self {
        Error::UpstreamStatus { response }
    }

    /// The upstream response attached to this error, if any.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Error::UpstreamStatus { response } => Some(response),
            _ => None,
        }
    }
}
