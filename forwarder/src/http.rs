use crate::config::RetryConfig;
use crate::errors::TransportError;
use crate::metrics_defs::{UPSTREAM_ATTEMPTS, UPSTREAM_DURATION, UPSTREAM_FAILURES, UPSTREAM_RETRIES};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use shared::{counter, histogram};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use url::Url;

/// Statuses treated as transient: the call is repeated instead of returned.
pub const RETRIABLE_STATUS_CODES: &[StatusCode] = &[
    StatusCode::BAD_GATEWAY,         // 502
    StatusCode::SERVICE_UNAVAILABLE, // 503
    StatusCode::GATEWAY_TIMEOUT,     // 504
];

/// A fully buffered outbound call
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Budget for the whole attempt, body included
    pub timeout: Duration,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout,
        }
    }

    pub fn get(url: Url, timeout: Duration) -> Self {
        Self::new(Method::GET, url, timeout)
    }

    /// POST with `value` serialized as the JSON body
    pub fn post_json<T: Serialize>(
        url: Url,
        value: &T,
        timeout: Duration,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        let mut request = Self::new(Method::POST, url, timeout);
        request.body = Some(Bytes::from(body));
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(request)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }
}

/// An upstream response with its body collected
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Outcome of a single failed attempt, before retry policy is applied
#[derive(Debug)]
pub enum TransportFailure {
    /// The endpoint could not be reached
    Connect(String),
    Timeout,
    Other(String),
}

/// One attempt of an outbound call. Implementations must be safe to share
/// between concurrently running inbound requests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportFailure>;
}

/// Transport backed by a pooled `reqwest` client
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<RawResponse, TransportFailure> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(request.timeout);

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(e: reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        TransportFailure::Timeout
    } else if e.is_connect() {
        TransportFailure::Connect(error_chain(&e))
    } else {
        TransportFailure::Other(error_chain(&e))
    }
}

// reqwest's top-level message hides the interesting part in the source chain
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Fixed exponential backoff, no jitter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

/// Outbound HTTP client shared by every adapter.
///
/// Retries on [`RETRIABLE_STATUS_CODES`] and on connect failures, for every
/// method. Any other status is handed back to the caller as a normal response.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub async fn request(&self, request: OutboundRequest) -> Result<RawResponse, TransportError> {
        let started = Instant::now();
        let result = self.request_with_retries(&request).await;
        histogram!(UPSTREAM_DURATION).record(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            counter!(UPSTREAM_FAILURES).increment(1);
            tracing::warn!(method = %request.method, url = %request.url, error = %e, "outbound call failed");
        }
        result
    }

    async fn request_with_retries(
        &self,
        request: &OutboundRequest,
    ) -> Result<RawResponse, TransportError> {
        let mut retries = 0;

        loop {
            counter!(UPSTREAM_ATTEMPTS).increment(1);

            let reason = match self.transport.send(request).await {
                Ok(response) if RETRIABLE_STATUS_CODES.contains(&response.status) => {
                    if retries >= self.policy.max_retries {
                        return Err(TransportError::Exhausted {
                            url: request.url.to_string(),
                            status: response.status,
                            attempts: retries + 1,
                        });
                    }
                    format!("status {}", response.status)
                }
                Ok(response) => return Ok(response),
                Err(TransportFailure::Connect(cause)) => {
                    if retries >= self.policy.max_retries {
                        return Err(TransportError::ConnectFailed {
                            url: request.url.to_string(),
                            cause,
                        });
                    }
                    cause
                }
                Err(TransportFailure::Timeout) => {
                    return Err(TransportError::Timeout(request.url.to_string()));
                }
                Err(TransportFailure::Other(cause)) => {
                    return Err(TransportError::Failed {
                        url: request.url.to_string(),
                        cause,
                    });
                }
            };

            let delay = self.policy.backoff(retries);
            tracing::info!(
                method = %request.method,
                url = %request.url,
                attempt = retries + 1,
                reason = %reason,
                delay_ms = delay.as_millis() as u64,
                "retrying outbound call"
            );
            counter!(UPSTREAM_RETRIES).increment(1);
            sleep(delay).await;
            retries += 1;
        }
    }
}
