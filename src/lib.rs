//! # Minder Downloader Library
//!
//! Client for the research portal's asynchronous export API. An export is a
//! server-side job: the client submits a description of the datasets and time
//! range it wants, polls until the portal has materialized the result files,
//! then downloads every file and consolidates them into a single table.
//!
//! ## Quick Start
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use minder_downloader::config::PortalConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PortalConfig::discover(None)?;
//! let since = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let until = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap().and_hms_opt(0, 0, 0).unwrap();
//!
//! let table = minder_downloader::load(
//!     &config,
//!     since,
//!     until,
//!     vec!["raw_sleep_mat".to_string(), "raw_activity_pir".to_string()],
//!     None,
//! )
//! .await?;
//! println!("{} rows", table.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`] - Portal settings (token, server, default headers) from YAML
//! - [`metadata`] - Dataset/organization metadata and the [`metadata::MetadataLookup`] seam
//! - [`fetcher`] - Authenticated HTTP [`fetcher::Transport`] and CSV decoding
//! - [`export`] - Request builder, job submitter, status poller, resilient fetcher, assembler
//! - [`table`] - The [`table::Table`] abstraction returned to callers
//! - [`output`] - CSV writer for consolidated tables
//! - [`shutdown`] - Cooperative cancellation of poll/retry waits
//!
//! ## Export flow
//!
//! 1. [`export::ExportJobRequest::build`] resolves each dataset's columns
//! 2. [`export::JobSubmitter`] POSTs the request and reads the job id
//! 3. [`export::StatusPoller`] polls until the job reports its result files
//! 4. [`export::ResilientFetcher`] downloads each file, retrying on failure
//! 5. [`export::ResultAssembler`] concatenates and cleans the tables

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// CLI command implementations
pub mod cli;

/// Portal configuration
pub mod config;

/// Export protocol client
pub mod export;

/// HTTP transport and payload decoding
pub mod fetcher;

/// Dataset and organization metadata
pub mod metadata;

/// Table output writers
pub mod output;

/// Graceful shutdown coordination
pub mod shutdown;

/// Tabular results
pub mod table;

pub use export::{load, ExportError, ExportExecutor, ExportOptions, ExportParams};
pub use table::{Cell, Table};

/// Wire format of export time bounds, before the trailing `Z`.
pub const PORTAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Format a timestamp the way the export endpoint expects it.
///
/// The value is rendered offset-naive with millisecond precision and a
/// literal `Z` appended, e.g. `2024-01-01T00:00:00.000Z`.
pub fn format_portal_timestamp(timestamp: NaiveDateTime) -> String {
    format!("{}Z", timestamp.format(PORTAL_TIMESTAMP_FORMAT))
}

/// Server-issued handle for one export job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    job_id: String,
}

impl JobHandle {
    /// Wrap a job identifier.
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }

    /// Opaque job identifier.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_id)
    }
}

/// One downloadable result file of a finished export job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDescriptor {
    /// Download URL
    pub url: String,
    /// Dataset type the file was exported from; becomes the `source` column
    pub source_type: String,
    /// Job status code reported alongside the file
    pub status_code: u16,
}

impl ResultDescriptor {
    /// Create a descriptor.
    pub fn new(url: impl Into<String>, source_type: impl Into<String>, status_code: u16) -> Self {
        Self {
            url: url.into(),
            source_type: source_type.into(),
            status_code,
        }
    }
}
