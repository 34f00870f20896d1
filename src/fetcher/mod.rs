//! HTTP transport and payload decoding
//!
//! The export protocol only needs two verbs against the portal: a JSON
//! `POST` to submit a job and authenticated `GET`s for status documents and
//! result files. [`Transport`] is the seam between the protocol logic in
//! [`crate::export`] and the network; [`portal_http::PortalHttpClient`] is
//! the production implementation.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

pub mod csv_parser;
pub mod portal_http;
pub mod retry_formatter;

pub use csv_parser::CsvTableParser;
pub use portal_http::PortalHttpClient;

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Request timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Any other network error
    #[error("network error: {0}")]
    NetworkError(String),

    /// Server answered with an error status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Body is not valid UTF-8
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Body could not be parsed (CSV or JSON)
    #[error("parse error: {0}")]
    ParseError(String),

    /// Body parsed to a table without rows
    #[error("no rows in content from {0}")]
    EmptyContent(String),

    /// Response is well-formed but not what the protocol expects
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// HTTP client could not be constructed
    #[error("client error: {0}")]
    ClientError(String),
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Fully received HTTP response.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, keys lowercased
    pub headers: HashMap<String, String>,
    /// Raw body
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Build a response; header names are lowercased.
    pub fn new<I, K, V>(status: u16, headers: I, body: impl Into<Vec<u8>>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            status,
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
            body: body.into(),
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Turn 4xx/5xx statuses into [`FetcherError::HttpStatus`].
    pub fn error_for_status(self, url: &str) -> FetcherResult<Self> {
        if self.status >= 400 {
            return Err(FetcherError::HttpStatus {
                status: self.status,
                url: url.to_string(),
            });
        }
        Ok(self)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> FetcherResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| FetcherError::ParseError(format!("invalid JSON body: {e}")))
    }
}

/// Authenticated HTTP transport used by every export stage.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` as JSON to `url`.
    async fn post_json(&self, url: &str, body: &serde_json::Value)
        -> FetcherResult<TransportResponse>;

    /// GET `url`, receiving the whole body.
    async fn get(&self, url: &str) -> FetcherResult<TransportResponse>;
}
