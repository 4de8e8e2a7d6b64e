//! Error types for calls against the tracking service.
//!
//! All failures funnel into a single [`Error`] enum. Server-reported
//! failures keep the parsed error envelope (per-field details with JSON
//! pointers) alongside the status code and headers, so callers can react to
//! individual validation problems instead of grepping response text.

use http::{HeaderMap, StatusCode};
use serde::Deserialize;

/// The error type for all operations in this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level failure before any HTTP response was obtained
    /// (DNS, connection refused, TLS handshake).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered with status >= 400.
    ///
    /// `message` is taken from the parsed error envelope when the body is
    /// well-formed, otherwise it is the raw body text. `details` holds the
    /// per-field entries of the envelope, in server order; it is empty when
    /// the body could not be parsed.
    #[error("api error {status}: {message}")]
    Api {
        /// The HTTP status code.
        status: StatusCode,
        /// Human-readable summary of the failure.
        message: String,
        /// Per-field error entries from the envelope.
        details: Vec<ErrorDetail>,
        /// The response headers.
        headers: Box<HeaderMap>,
        /// Rate limit hint parsed from the response headers.
        rate_limit: Option<crate::rate_limit::RateLimitInfo>,
    },

    /// The response body did not match the expected shape.
    ///
    /// Raised both for a missing `data` envelope key and for payloads the
    /// target type cannot absorb. Never retried; the body is preserved for
    /// debugging.
    #[error("failed to decode response (status {status}): {detail}")]
    Decode {
        /// The raw response body.
        raw_body: String,
        /// The underlying deserialization error message.
        detail: String,
        /// The HTTP status code of the response being decoded.
        status: StatusCode,
    },

    /// All retry attempts were consumed without a success.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Total attempts made, the initial try included.
        attempts: usize,
        /// The failure of the final attempt.
        last_error: Box<Error>,
    },

    /// The caller's deadline fired before or between attempts.
    #[error("operation cancelled by deadline")]
    Cancelled,

    /// The client or a request was misconfigured (bad URL, bad header).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request body could not be serialized to JSON.
    #[error("failed to serialize request body: {0}")]
    Serialization(String),

    /// An invalid URL was provided.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// One entry of the service error envelope.
///
/// The service reports validation problems field by field; `pointer` is a
/// JSON-pointer-style path into the offending request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Status code of this entry, as the server string-encodes it.
    pub status: String,
    /// Short summary.
    pub title: Option<String>,
    /// Longer description.
    pub detail: Option<String>,
    /// JSON pointer into the offending payload, when applicable.
    pub pointer: Option<String>,
}

/// Wire form of the error envelope: `{"errors": [...]}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    errors: Vec<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    #[serde(default)]
    status: String,
    title: Option<String>,
    detail: Option<String>,
    source: Option<WireErrorSource>,
}

#[derive(Debug, Deserialize)]
struct WireErrorSource {
    pointer: Option<String>,
}

impl From<WireErrorDetail> for ErrorDetail {
    fn from(wire: WireErrorDetail) -> Self {
        ErrorDetail {
            status: wire.status,
            title: wire.title,
            detail: wire.detail,
            pointer: wire.source.and_then(|s| s.pointer),
        }
    }
}

impl Error {
    /// Builds an [`Error::Api`] from a buffered failure response.
    ///
    /// Attempts to parse the body as the service error envelope; an
    /// unparsable body degrades to the raw text as the message, never to a
    /// separate error. The status code is populated in both cases.
    pub(crate) fn from_failure_response(
        status: StatusCode,
        headers: HeaderMap,
        body: String,
        rate_limit: Option<crate::rate_limit::RateLimitInfo>,
    ) -> Self {
        let (message, details) = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) if !envelope.errors.is_empty() => {
                let details: Vec<ErrorDetail> =
                    envelope.errors.into_iter().map(Into::into).collect();
                let message = details
                    .iter()
                    .map(|d| match (&d.title, &d.detail) {
                        (Some(title), Some(detail)) => format!("{title}: {detail}"),
                        (Some(title), None) => title.clone(),
                        (None, Some(detail)) => detail.clone(),
                        (None, None) => d.status.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                (message, details)
            }
            _ => (body, Vec::new()),
        };

        Error::Api {
            status,
            message,
            details,
            headers: Box::new(headers),
            rate_limit,
        }
    }

    /// Returns `true` if this error is worth retrying by default.
    ///
    /// Network errors, timeouts, 5xx responses, and 429 responses qualify.
    /// Client errors, decode failures, and cancellation do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout => true,
            Error::Api { status, .. } => status.is_server_error() || status.as_u16() == 429,
            Error::Decode { .. }
            | Error::RetriesExhausted { .. }
            | Error::Cancelled
            | Error::Configuration(_)
            | Error::Serialization(_)
            | Error::InvalidUrl(_) => false,
        }
    }

    /// Returns the HTTP status code, for errors that carry one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the per-field error details of a server failure.
    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            Error::Api { details, .. } => details,
            _ => &[],
        }
    }

    /// Returns the raw response body, for errors that preserve one.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            Error::Decode { raw_body, .. } => Some(raw_body),
            _ => None,
        }
    }

    /// Returns the rate limit hint attached to a server failure.
    pub fn rate_limit(&self) -> Option<&crate::rate_limit::RateLimitInfo> {
        match self {
            Error::Api { rate_limit, .. } => rate_limit.as_ref(),
            _ => None,
        }
    }

    /// Returns the server-recommended retry delay, capped at `max_wait`.
    pub fn rate_limit_delay(
        &self,
        max_wait: std::time::Duration,
    ) -> Option<std::time::Duration> {
        self.rate_limit()?.delay(max_wait)
    }
}

/// A specialized `Result` for operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;
