//! Authenticated transport for the tracking service.
//!
//! [`Client`] owns the connection pool, the bearer credentials, and the
//! retry configuration. Each attempt builds a fresh outbound request from
//! the caller's [`RequestMetadata`], so metadata values can be reused and
//! are never mutated. Responses with status >= 400 are converted to
//! [`Error::Api`] with the parsed service error envelope; everything below
//! that line is handed to the response decoder untouched.

use crate::{
    metadata::RequestMetadata,
    rate_limit::{RateLimitConfig, RateLimitInfo},
    response::{envelope_from_str, raw_from_str},
    retry::{Retrier, RetryOnTransient, RetryPredicate, RetryStrategy},
    Error, Response, Result,
};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// The media type the service speaks.
pub const MEDIA_TYPE: &str = "application/json";

/// A client for a JSON:API work-item tracking service.
///
/// Cheap to clone; all clones share one connection pool and configuration.
///
/// # Examples
///
/// ```no_run
/// use trackline::{Client, RetryStrategy};
/// use serde::Deserialize;
/// use std::time::Duration;
///
/// #[derive(Deserialize)]
/// struct WorkItem {
///     id: String,
/// }
///
/// # async fn example() -> Result<(), trackline::Error> {
/// let client = Client::builder()
///     .base_url("https://tracker.example.com/api/v1")?
///     .bearer_token(std::env::var("TRACKER_TOKEN").unwrap())
///     .timeout(Duration::from_secs(30))
///     .retry_strategy(RetryStrategy::ExponentialBackoff {
///         min_wait: Duration::from_millis(100),
///         max_wait: Duration::from_secs(10),
///         max_retries: 3,
///     })
///     .build()?;
///
/// let item = client
///     .get::<WorkItem>("/projects/elibrary/workitems/EL-101")
///     .await?;
/// println!("{}", item.data.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: Url,
    bearer_token: String,
    default_headers: HeaderMap,
    retrier: Retrier,
    timeout: Option<Duration>,
}

impl Client {
    /// Creates a [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Executes one authenticated request attempt, with no retries.
    ///
    /// Attaches the bearer token and media-type headers, resolves the URL,
    /// serializes the optional body, and sends. A response with status
    /// >= 400 is buffered and converted to [`Error::Api`]; a successful
    /// response is returned with its body unconsumed, ready for
    /// [`decode_envelope`](crate::response::decode_envelope) or
    /// [`decode_raw`](crate::response::decode_raw).
    pub async fn execute<Req>(
        &self,
        metadata: &RequestMetadata,
        body: Option<&Req>,
    ) -> Result<reqwest::Response>
    where
        Req: Serialize,
    {
        let mut url = self.inner.base_url.clone();
        url.set_path(&metadata.path);
        for (key, value) in &metadata.query_params {
            url.query_pairs_mut().append_pair(key, value);
        }

        tracing::debug!(method = %metadata.method, url = %url, "dispatching request");

        let mut request = self
            .inner
            .http_client
            .request(metadata.method.clone(), url)
            .bearer_auth(&self.inner.bearer_token)
            .header(header::ACCEPT, MEDIA_TYPE);

        for (name, value) in &self.inner.default_headers {
            request = request.header(name, value);
        }
        for (name, value) in &metadata.headers {
            request = request.header(name, value);
        }
        if let Some(timeout) = self.inner.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            let json =
                serde_json::to_value(body).map_err(|e| Error::Serialization(e.to_string()))?;
            request = request.header(header::CONTENT_TYPE, MEDIA_TYPE).json(&json);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::Network(e)
            }
        })?;

        self.classify(response).await
    }

    /// Passes successful responses through; turns >= 400 into `Error::Api`.
    async fn classify(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.as_u16() < 400 {
            tracing::info!(status = status.as_u16(), "received response");
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();

        let rate_limit = {
            let info = RateLimitInfo::from_headers(&headers);
            info.is_limited().then_some(info)
        };

        if status.is_client_error() {
            tracing::error!(status = status.as_u16(), body = %body, "client error");
        } else {
            tracing::warn!(status = status.as_u16(), body = %body, "server error");
        }

        Err(Error::from_failure_response(status, headers, body, rate_limit))
    }

    /// Makes an enveloped request: executes with retries, then decodes the
    /// body through the `{"data": ...}` envelope.
    ///
    /// Cancellation, when set on the metadata via
    /// [`with_deadline`](RequestMetadata::with_deadline), bounds the whole
    /// retry loop: no attempt starts after the deadline, and inter-attempt
    /// waits are cut short.
    pub async fn call<Req, Res>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.request(metadata, body, envelope_from_str).await
    }

    /// Like [`call`](Client::call), but decodes the body directly, with no
    /// envelope. For the few endpoints that answer outside it.
    pub async fn call_raw<Req, Res>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.request(metadata, body, raw_from_str).await
    }

    async fn request<Req, Res, D>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
        decode: D,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        D: Fn(&str, StatusCode) -> Result<Res>,
    {
        let start = Instant::now();
        let metadata = &metadata;
        let decode = &decode;

        self.inner
            .retrier
            .run(metadata.deadline, |attempt| async move {
                let response = self.execute(metadata, body).await?;
                let status = response.status();
                let headers = response.headers().clone();
                let raw_body = response.text().await?;
                let data = decode(&raw_body, status)?;
                Ok(Response::new(
                    data,
                    raw_body,
                    status,
                    headers,
                    start.elapsed(),
                    attempt,
                ))
            })
            .await
    }

    /// GET, decoded through the envelope.
    pub async fn get<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call::<(), Res>(RequestMetadata::new(Method::GET, path), None)
            .await
    }

    /// POST with a JSON body, decoded through the envelope.
    pub async fn post<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.call(RequestMetadata::new(Method::POST, path), Some(body))
            .await
    }

    /// PATCH with a JSON body, decoded through the envelope.
    pub async fn patch<Req, Res>(
        &self,
        path: impl Into<String>,
        body: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.call(RequestMetadata::new(Method::PATCH, path), Some(body))
            .await
    }

    /// PUT with a JSON body, decoded through the envelope.
    pub async fn put<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        self.call(RequestMetadata::new(Method::PUT, path), Some(body))
            .await
    }

    /// DELETE. The service answers `204 No Content`, so nothing is decoded.
    pub async fn delete(&self, path: impl Into<String>) -> Result<Response<()>> {
        self.request::<(), (), _>(
            RequestMetadata::new(Method::DELETE, path),
            None,
            |_, _| Ok(()),
        )
        .await
    }
}

/// Builder for [`Client`].
///
/// # Examples
///
/// ```no_run
/// use trackline::ClientBuilder;
///
/// # fn example() -> Result<(), trackline::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://tracker.example.com/api/v1")?
///     .bearer_token("secret")
///     .default_header("User-Agent", "sync-tool/2.1")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    bearer_token: Option<String>,
    default_headers: HeaderMap,
    retry_strategy: RetryStrategy,
    retry_predicate: Option<Arc<dyn RetryPredicate>>,
    timeout: Option<Duration>,
    rate_limit_config: RateLimitConfig,
}

impl ClientBuilder {
    /// Creates a builder with no retries and rate-limit handling enabled.
    pub fn new() -> Self {
        Self {
            base_url: None,
            bearer_token: None,
            default_headers: HeaderMap::new(),
            retry_strategy: RetryStrategy::None,
            retry_predicate: None,
            timeout: None,
            rate_limit_config: RateLimitConfig::default(),
        }
    }

    /// Sets the service base URL. Required.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the bearer token sent as `Authorization: Bearer <token>`.
    /// Required.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Adds a header included in every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or value is not a valid header.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("invalid header value: {e}")))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the retry strategy. Defaults to [`RetryStrategy::None`].
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Sets the retry predicate. Defaults to
    /// [`RetryOnTransient`](crate::retry::RetryOnTransient).
    pub fn retry_predicate(mut self, predicate: Arc<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Sets the per-attempt request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the rate limit configuration. Enabled by default with a
    /// five-minute cap on honored waits.
    pub fn rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit_config = config;
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the base URL or bearer token is
    /// missing, or when the underlying HTTP client cannot be constructed.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("base URL is required".to_string()))?;
        let bearer_token = self
            .bearer_token
            .ok_or_else(|| Error::Configuration("bearer token is required".to_string()))?;

        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        let predicate = self
            .retry_predicate
            .unwrap_or_else(|| Arc::new(RetryOnTransient));
        let retrier = Retrier::new(self.retry_strategy, predicate)
            .with_rate_limit(self.rate_limit_config);

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                base_url,
                bearer_token,
                default_headers: self.default_headers,
                retrier,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
