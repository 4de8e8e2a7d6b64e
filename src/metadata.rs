//! Per-request metadata.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tokio::time::Instant;

/// Everything needed to describe a single request: method, path relative to
/// the service base URL, extra headers, and query parameters.
///
/// The client never mutates a `RequestMetadata`; each attempt builds a fresh
/// outbound request from it, so one value can be reused across retries.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method.
    pub method: Method,

    /// The request path, resolved against the client's base URL.
    pub path: String,

    /// Headers added on top of the client defaults.
    pub headers: HeaderMap,

    /// Query parameters, appended in insertion order.
    pub query_params: Vec<(String, String)>,

    /// Optional deadline bounding the whole call, retries included.
    ///
    /// No attempt starts after the deadline, and an inter-attempt wait is
    /// cut short by it; an attempt already handed to the transport is left
    /// to finish under its own timeout.
    pub deadline: Option<Instant>,
}

impl RequestMetadata {
    /// Creates metadata for `method` against `path`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query_params: Vec::new(),
            deadline: None,
        }
    }

    /// Adds a request-specific header.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the name or value is not a
    /// valid header.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| crate::Error::Configuration(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| crate::Error::Configuration(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Appends a query parameter.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Appends multiple query parameters.
    pub fn with_query_params(
        mut self,
        params: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.query_params.extend(params);
        self
    }

    /// Bounds the call, retries included, by `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}
