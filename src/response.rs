//! Response wrapper and body decoding.
//!
//! The service wraps successful payloads in a `{"data": ...}` envelope.
//! [`decode_envelope`] unwraps it; [`decode_raw`] deserializes a body
//! as-is for the few endpoints that answer outside the envelope. Both
//! consume the response, buffering and releasing the body exactly once.
//!
//! [`Response`] is what the high-level client verbs return: the decoded
//! payload plus the transaction metadata (status, headers, latency, attempt
//! count) and the raw body for debugging.

use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// A successful, decoded response.
///
/// # Examples
///
/// ```no_run
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct WorkItem {
///     id: String,
/// }
///
/// # async fn example() -> Result<(), trackline::Error> {
/// # let client = trackline::Client::builder()
/// #     .base_url("https://tracker.example.com")?.bearer_token("t").build()?;
/// let response = client.get::<WorkItem>("/projects/elibrary/workitems/EL-101").await?;
/// println!("{} in {:?} ({} attempts)", response.data.id, response.latency, response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded payload.
    pub data: T,

    /// The raw response body.
    pub raw_body: String,

    /// The HTTP status code.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Total latency including every retry attempt.
    pub latency: Duration,

    /// Attempts made, the initial try included.
    pub attempts: usize,
}

impl<T> Response<T> {
    pub(crate) fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Transforms the payload while keeping the transaction metadata.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if more than one attempt was needed.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a response header as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Decodes a success response through the `{"data": ...}` envelope.
///
/// Consumes the response. Fails with [`Error::Decode`] when the envelope is
/// missing or the inner payload does not fit `T`; the raw body is preserved
/// in the error.
pub async fn decode_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    envelope_from_str(&body, status)
}

/// Decodes a success response body directly into `T`, with no envelope.
///
/// Consumes the response.
pub async fn decode_raw<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    raw_from_str(&body, status)
}

pub(crate) fn envelope_from_str<T: DeserializeOwned>(raw: &str, status: StatusCode) -> Result<T> {
    match serde_json::from_str::<Envelope<T>>(raw) {
        Ok(envelope) => Ok(envelope.data),
        Err(e) => Err(Error::Decode {
            raw_body: raw.to_string(),
            detail: e.to_string(),
            status,
        }),
    }
}

pub(crate) fn raw_from_str<T: DeserializeOwned>(raw: &str, status: StatusCode) -> Result<T> {
    match serde_json::from_str::<T>(raw) {
        Ok(data) => Ok(data),
        Err(e) => Err(Error::Decode {
            raw_body: raw.to_string(),
            detail: e.to_string(),
            status,
        }),
    }
}
