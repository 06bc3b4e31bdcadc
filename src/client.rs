//! HTTP transport shared by the plan catalog and the checkout session.
//!
//! [`BackendClient`] wraps a `reqwest::Client` with the app's base URL, JSON
//! headers and request timeout. It is cheap to clone.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::{BackendConfig, DEFAULT_TIMEOUT_SECS};
use crate::error::{ClientError, ClientResult};

#[derive(Debug)]
struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
}

/// Client for the companion backend API.
#[derive(Debug, Clone)]
pub struct BackendClient {
    inner: Arc<ClientInner>,
}

impl BackendClient {
    /// Start building a new client.
    pub fn builder(base_url: &str) -> BackendClientBuilder {
        BackendClientBuilder {
            base_url: base_url.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn from_config(config: &BackendConfig) -> ClientResult<Self> {
        Self::builder(&config.base_url)
            .timeout(config.timeout_secs)
            .build()
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Build the full URL for an API path relative to the base URL.
    pub(crate) fn url(&self, path: &str) -> ClientResult<Url> {
        self.inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(ClientError::UrlParse)
    }

    /// Execute a GET request and deserialize the JSON response.
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let url = self.url(path)?;
        let resp = self.inner.http.get(url).send().await?;
        Self::handle_response(resp).await
    }

    /// Execute a POST request with a JSON body.
    pub(crate) async fn post<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let url = self.url(path)?;
        let resp = self.inner.http.post(url).json(body).send().await?;
        Self::handle_response(resp).await
    }

    /// Return the deserialized body of a 2xx response, or an API error carrying
    /// the status and response text.
    async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> ClientResult<T> {
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            let message = if message.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                message
            };
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builder for [`BackendClient`].
pub struct BackendClientBuilder {
    base_url: String,
    timeout_secs: u64,
}

impl BackendClientBuilder {
    /// Set the request timeout in seconds (default: 15).
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Build the client.
    pub fn build(self) -> ClientResult<BackendClient> {
        let mut base_url: Url = self
            .base_url
            .parse()
            .map_err(|e: url::ParseError| ClientError::Config(e.to_string()))?;

        // `Url::join` drops the last segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;

        Ok(BackendClient {
            inner: Arc::new(ClientInner { http, base_url }),
        })
    }
}
