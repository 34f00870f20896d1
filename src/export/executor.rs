//! Export executor
//!
//! Runs an export end to end: submit, poll, download, consolidate.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::PortalConfig;
use crate::export::assemble::{AssemblyStats, ResultAssembler};
use crate::export::fetch::ResilientFetcher;
use crate::export::poller::{EmptyResultPolicy, PollOutcome, StatusPoller};
use crate::export::progress::{NoProgress, ProgressReporter};
use crate::export::request::{ExportJobRequest, ExportParams};
use crate::export::retry::{RetryPolicy, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_INTERVAL};
use crate::export::sleeper::{Sleeper, TokioSleeper};
use crate::export::submit::JobSubmitter;
use crate::export::ExportError;
use crate::fetcher::{PortalHttpClient, Transport};
use crate::metadata::MetadataLookup;
use crate::shutdown::SharedShutdown;
use crate::table::{SchemaPolicy, Table};
use crate::{JobHandle, ResultDescriptor};

/// Tunables of an export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Interval and bounds of status polling
    pub poll_policy: RetryPolicy,
    /// Interval and bounds of per-file download retries
    pub fetch_policy: RetryPolicy,
    /// Whether a finished job without records ends polling
    pub empty_result: EmptyResultPolicy,
    /// Reconciliation of per-file schemas
    pub schema: SchemaPolicy,
    /// Downloads in flight
    pub concurrency: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            poll_policy: RetryPolicy::unbounded(DEFAULT_POLL_INTERVAL),
            fetch_policy: RetryPolicy::unbounded(DEFAULT_RETRY_INTERVAL),
            empty_result: EmptyResultPolicy::default(),
            schema: SchemaPolicy::default(),
            concurrency: 1,
        }
    }
}

/// Everything known about a finished export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// Job that produced the data
    pub job: JobHandle,
    /// Result files listed by the portal
    pub descriptors: Vec<ResultDescriptor>,
    /// Consolidated table
    pub table: Table,
    /// Download attempts, retries included
    pub fetch_attempts: u32,
    /// Consolidation counters
    pub stats: AssemblyStats,
}

/// Orchestrates submit, poll, fetch and assembly for one portal.
pub struct ExportExecutor {
    transport: Arc<dyn Transport>,
    server: String,
    options: ExportOptions,
    sleeper: Arc<dyn Sleeper>,
    progress: Arc<dyn ProgressReporter>,
    shutdown: Option<SharedShutdown>,
}

impl ExportExecutor {
    /// Executor with default options over `transport`.
    pub fn new(transport: Arc<dyn Transport>, server: &str) -> Self {
        Self {
            transport,
            server: server.trim_end_matches('/').to_string(),
            options: ExportOptions::default(),
            sleeper: Arc::new(TokioSleeper),
            progress: Arc::new(NoProgress),
            shutdown: None,
        }
    }

    /// Executor talking to the portal described by `config`.
    pub fn from_config(config: &PortalConfig) -> Result<Self, ExportError> {
        let transport = Arc::new(PortalHttpClient::new(config)?);
        Ok(Self::new(transport, &config.server))
    }

    /// Replace the options.
    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the timer used by poll and retry waits.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Report download progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Options in force.
    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Transport shared by every stage.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Export `params` and return the consolidated table.
    ///
    /// Dataset columns are resolved through `metadata` before any network
    /// call. A job that finishes without records yields an empty table.
    pub async fn fetch_dataset_table(
        &self,
        metadata: &dyn MetadataLookup,
        params: &ExportParams,
    ) -> Result<Table, ExportError> {
        let request = ExportJobRequest::build(params, metadata)?;
        Ok(self.run(&request).await?.table)
    }

    /// Run a prepared request through every stage.
    #[instrument(skip_all, fields(datasets = ?request.dataset_names()))]
    pub async fn run(&self, request: &ExportJobRequest) -> Result<ExportReport, ExportError> {
        info!(
            since = request.since(),
            until = request.until(),
            "Starting export"
        );

        let job = JobSubmitter::new(Arc::clone(&self.transport), &self.server)
            .submit(request)
            .await?;

        let outcome = StatusPoller::new(Arc::clone(&self.transport), &self.server)
            .with_policy(self.options.poll_policy.clone())
            .with_empty_policy(self.options.empty_result)
            .with_sleeper(Arc::clone(&self.sleeper))
            .with_shutdown(self.shutdown.clone())
            .wait_for_results(&job)
            .await?;

        let descriptors = match outcome {
            PollOutcome::Ready(descriptors) => descriptors,
            PollOutcome::Empty => Vec::new(),
        };

        let fetcher = ResilientFetcher::new(Arc::clone(&self.transport))
            .with_policy(self.options.fetch_policy.clone())
            .with_sleeper(Arc::clone(&self.sleeper))
            .with_shutdown(self.shutdown.clone())
            .with_job_id(job.job_id());

        let (table, stats) = ResultAssembler::new()
            .with_schema_policy(self.options.schema)
            .with_concurrency(self.options.concurrency)
            .collect(&descriptors, &fetcher, self.progress.as_ref())
            .await?;

        info!(
            job_id = %job,
            files = stats.files,
            rows = stats.rows,
            attempts = fetcher.attempts(),
            "Export complete"
        );

        Ok(ExportReport {
            job,
            descriptors,
            table,
            fetch_attempts: fetcher.attempts(),
            stats,
        })
    }
}
