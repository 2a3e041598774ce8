//! # Wire Codec Module
//!
//! Deterministic, reversible framing of N HTTP requests/responses into a
//! single physical payload.
//!
//! The codec is a capability interface ([`BatchCodec`]) with one built-in
//! implementation, the `multipart/mixed` codec modeled on the batch
//! conventions of the major cloud REST APIs, plus an escape hatch for a
//! caller-supplied implementation via [`CodecSelector::Custom`].
//!
//! Correlation between requests and decoded responses is purely positional:
//! part *i* of the envelope corresponds to input request *i*, and decode
//! returns responses in segment order without any re-sorting or ID matching.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`BatchCodec`] | Encode/decode capability interface |
//! | [`MultipartMixedCodec`] | Built-in `multipart/mixed` implementation |
//! | [`CodecSelector`] | Tagged choice between built-in and custom codecs |

mod multipart;

pub use multipart::MultipartMixedCodec;

use crate::config::EndpointConfig;
use crate::types::{HttpRequest, HttpResponse};
use crate::Result;
use std::fmt;
use std::sync::Arc;

/// Folds an ordered sequence of logical requests into one physical request,
/// and splits a combined physical response back into per-request responses.
pub trait BatchCodec: Send + Sync {
    /// Encode `requests` into a single physical request envelope.
    ///
    /// Part order must equal input order; the envelope targets the
    /// configured batch endpoint.
    fn encode(&self, requests: &[HttpRequest]) -> Result<HttpRequest>;

    /// Decode a combined physical response into per-part results, in
    /// segment order.
    ///
    /// The outer `Result` is fatal for the whole batch (unrecognizable
    /// framing); an inner `Err` is isolated to one part and must not stop
    /// the decoding of its siblings.
    fn decode(&self, response: &HttpResponse) -> Result<Vec<Result<HttpResponse>>>;
}

/// Selects the codec used for a configured endpoint.
#[derive(Clone, Default)]
pub enum CodecSelector {
    /// The built-in `multipart/mixed` codec.
    #[default]
    MultipartMixed,
    /// A caller-supplied codec implementation.
    Custom(Arc<dyn BatchCodec>),
}

impl fmt::Debug for CodecSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecSelector::MultipartMixed => f.write_str("MultipartMixed"),
            CodecSelector::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Resolve the codec instance for `config`.
pub(crate) fn codec_for(config: &EndpointConfig) -> Arc<dyn BatchCodec> {
    match &config.codec {
        CodecSelector::MultipartMixed => Arc::new(MultipartMixedCodec::from_config(config)),
        CodecSelector::Custom(codec) => Arc::clone(codec),
    }
}
