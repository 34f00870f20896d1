//! Export protocol client
//!
//! An export runs in four stages, each in its own module:
//!
//! - [`request`] - resolve dataset columns and build the job description
//! - [`submit`] - POST the job and read its id from `Content-Location`
//! - [`poller`] - poll `export/{id}/` until the result files are listed
//! - [`fetch`] / [`assemble`] - download every file with retries and
//!   consolidate the tables
//!
//! [`executor::ExportExecutor`] wires the stages together; [`load`] is the
//! one-call entry point.

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::info;

use crate::config::PortalConfig;
use crate::fetcher::{FetcherError, PortalHttpClient};
use crate::metadata::{DatasetCatalog, MetadataError};
use crate::table::{Table, TableError};

pub mod assemble;
pub mod executor;
pub mod fetch;
pub mod poller;
pub mod progress;
pub mod request;
pub mod retry;
pub mod sleeper;
pub mod submit;

pub use assemble::{consolidate, AssemblyStats, ResultAssembler, TableSource};
pub use executor::{ExportExecutor, ExportOptions, ExportReport};
pub use fetch::ResilientFetcher;
pub use poller::{classify_status, EmptyResultPolicy, PollOutcome, PollState, StatusPoller};
pub use progress::{LogProgress, NoProgress, ProgressReporter};
pub use request::{DatasetSelection, ExportJobRequest, ExportParams};
pub use retry::{Backoff, RetryDecision, RetryPolicy};
pub use sleeper::{Sleeper, TokioSleeper};
pub use submit::{parse_job_id, JobSubmitter};

/// Export errors
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Requested dataset is not in the portal metadata
    #[error("unknown dataset: {0}")]
    UnknownDataset(String),

    /// Request parameters are unusable
    #[error("invalid export request: {0}")]
    InvalidRequest(String),

    /// Job submission response could not be interpreted
    #[error("export submission failed: {0}")]
    Submission(String),

    /// Transport or HTTP failure outside a retry loop
    #[error(transparent)]
    Transport(#[from] FetcherError),

    /// A bounded poll or download loop gave up
    #[error("{operation} gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Loop that gave up ("status poll", "download")
        operation: &'static str,
        /// Attempts made
        attempts: u32,
        /// Last failure seen
        last_error: String,
    },

    /// Fetched tables could not be reconciled
    #[error("schema error: {0}")]
    Schema(#[from] TableError),

    /// Metadata lookup failed
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Shutdown was requested while waiting
    #[error("export cancelled")]
    Cancelled,
}

/// Export `datasets` between `since` and `until` and return the consolidated table.
///
/// Dataset columns are resolved from the portal's `/info/datasets`. Polling
/// and downloads retry every 2 seconds without bound; use
/// [`ExportExecutor`] directly to bound them or to add progress reporting.
///
/// # Errors
/// Any [`ExportError`]; an empty export is an empty table, not an error.
pub async fn load(
    config: &PortalConfig,
    since: NaiveDateTime,
    until: NaiveDateTime,
    datasets: Vec<String>,
    organizations: Option<Vec<String>>,
) -> Result<Table, ExportError> {
    let transport = Arc::new(PortalHttpClient::new(config)?);
    let catalog = DatasetCatalog::fetch(transport.as_ref(), &config.server).await?;

    let mut params = ExportParams::new(since, until, datasets);
    params.organizations = organizations;

    let executor = ExportExecutor::new(transport, &config.server);
    let table = executor.fetch_dataset_table(&catalog, &params).await?;
    info!(rows = table.len(), columns = table.width(), "Export loaded");
    Ok(table)
}
