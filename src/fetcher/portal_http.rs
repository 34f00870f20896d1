//! Portal HTTP client
//!
//! reqwest-backed [`Transport`] that attaches the bearer token and the
//! configured default headers to every request. Bodies are streamed and
//! collected, so large export files never need a second buffer copy.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::PortalConfig;
use crate::fetcher::{FetcherError, FetcherResult, Transport, TransportResponse};

/// Bearer-authenticated HTTP client for the research portal.
#[derive(Clone)]
pub struct PortalHttpClient {
    client: Client,
    token: String,
}

impl PortalHttpClient {
    /// Build a client from portal settings.
    ///
    /// # Errors
    /// Returns [`FetcherError::ClientError`] if a configured header is not a
    /// valid HTTP header or the TLS backend cannot be initialized.
    pub fn new(config: &PortalConfig) -> FetcherResult<Self> {
        let headers = default_headers(&config.headers)?;
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| FetcherError::ClientError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, config.token.clone()))
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: Client, token: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn collect(url: &str, response: Response) -> FetcherResult<TransportResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            body.extend_from_slice(&chunk);
        }

        debug!(url, status, bytes = body.len(), "Response received");

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for PortalHttpClient {
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> FetcherResult<TransportResponse> {
        debug!(url, "POST");
        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::collect(url, response).await
    }

    async fn get(&self, url: &str) -> FetcherResult<TransportResponse> {
        debug!(url, "GET");
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::collect(url, response).await
    }
}

fn default_headers(configured: &std::collections::BTreeMap<String, String>) -> FetcherResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in configured {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetcherError::ClientError(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| FetcherError::ClientError(format!("invalid value for header '{name}': {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn map_reqwest_error(err: reqwest::Error) -> FetcherError {
    if err.is_timeout() {
        FetcherError::Timeout(err.to_string())
    } else if err.is_connect() {
        FetcherError::ConnectionFailed(err.to_string())
    } else {
        FetcherError::NetworkError(err.to_string())
    }
}
