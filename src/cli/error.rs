//! CLI error types and conversions

use crate::config::ConfigError;
use crate::export::ExportError;
use crate::fetcher::FetcherError;
use crate::metadata::MetadataError;
use crate::output::OutputError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Export error
    #[error("export error: {0}")]
    ExportError(#[from] ExportError),

    /// Metadata error
    #[error("metadata error: {0}")]
    MetadataError(#[from] MetadataError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// JSON rendering error
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
