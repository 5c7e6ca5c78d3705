//! HTTP transport shared by all providers.
//!
//! Providers never talk to `reqwest` directly. They go through an
//! [`HttpClient`], which paces requests with a [`Pacer`], maps status codes
//! to [`KbError`] variants and delegates the actual I/O to a [`Transport`].
//! Tests swap the transport for a canned one.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{KbError, Result};
use crate::pacing::Pacer;

/// Browser-like user agent accepted by the public endpoints.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An outgoing GET request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL including the query string.
    pub url: String,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a GET request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A response as returned by a [`Transport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Decodes the body as UTF-8, dropping a leading byte order mark.
    #[must_use]
    pub fn text(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
    }
}

/// Executes HTTP requests.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Executes a GET request. Only transport failures are errors; any
    /// status code is returned as a response.
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a transport with the given user agent and the default timeout.
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| KbError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

/// Paced, status-checked HTTP access for one provider.
#[derive(Clone)]
pub struct HttpClient {
    provider: &'static str,
    transport: Arc<dyn Transport>,
    pacer: Pacer,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("provider", &self.provider)
            .field("interval", &self.pacer.interval())
            .finish()
    }
}

impl HttpClient {
    /// Creates a client for `provider` on top of `transport`.
    #[must_use]
    pub fn new(provider: &'static str, transport: Arc<dyn Transport>, pacer: Pacer) -> Self {
        Self {
            provider,
            transport,
            pacer,
        }
    }

    /// Returns the provider name used in errors and logs.
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Sends a request and returns the response if its status is 2xx.
    ///
    /// Waits for the pacing interval first, whatever the outcome of the
    /// previous request was.
    pub async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.pacer.wait().await;
        debug!(provider = self.provider, url = %request.url, "HTTP GET");

        let response = self.transport.execute(request).await?;
        if response.status == 429 {
            return Err(KbError::RateLimited {
                provider: self.provider.to_string(),
                retry_after: None,
            });
        }
        if !response.is_success() {
            return Err(KbError::HttpStatus {
                status: response.status,
                url: request.url.clone(),
            });
        }
        Ok(response)
    }

    /// Fetches a URL and returns the raw body.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        Ok(self.send(&HttpRequest::get(url)).await?.body)
    }

    /// Fetches a URL and returns the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.send(&HttpRequest::get(url)).await?.text())
    }

    /// Sends a request and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<T> {
        let response = self.send(request).await?;
        serde_json::from_slice(&response.body).map_err(|e| KbError::Schema {
            provider: self.provider.to_string(),
            reason: e.to_string(),
        })
    }
}
