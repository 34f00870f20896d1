//! Result file download with retry
//!
//! A result file listed by a finished job does not disappear, so every
//! failure (network, HTTP status, decoding, CSV parsing, zero rows) is
//! retried on the same URL. The default policy retries forever; a bounded
//! [`RetryPolicy`] turns exhaustion into [`ExportError::RetriesExhausted`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::export::assemble::TableSource;
use crate::export::retry::{RetryDecision, RetryPolicy};
use crate::export::sleeper::{pause, Sleeper, TokioSleeper};
use crate::export::ExportError;
use crate::fetcher::retry_formatter::{RetryContext, RetryErrorType};
use crate::fetcher::{CsvTableParser, FetcherError, FetcherResult, Transport};
use crate::shutdown::SharedShutdown;
use crate::table::Table;
use crate::ResultDescriptor;

/// Downloads result files, retrying each one until it parses.
pub struct ResilientFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    shutdown: Option<SharedShutdown>,
    job_id: String,
    attempts: AtomicU32,
}

impl ResilientFetcher {
    /// Fetcher using the default unbounded 2 second retry policy.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            shutdown: None,
            job_id: String::new(),
            attempts: AtomicU32::new(0),
        }
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the timer used between attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Attach a shared shutdown handle.
    pub fn with_shutdown(mut self, shutdown: Option<SharedShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Job id included in retry messages.
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    /// Download attempts made so far across all descriptors.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// One download attempt: GET, decode, parse, tag.
    pub async fn fetch_once(&self, descriptor: &ResultDescriptor) -> FetcherResult<Table> {
        let url = descriptor.url.as_str();
        let response = self.transport.get(url).await?.error_for_status(url)?;
        let mut table = CsvTableParser::parse_bytes(&response.body)?;
        if table.is_empty() {
            return Err(FetcherError::EmptyContent(url.to_string()));
        }
        table.tag_source(&descriptor.source_type);
        Ok(table)
    }

    /// Download `descriptor`, retrying per the policy.
    ///
    /// # Errors
    /// - [`ExportError::RetriesExhausted`] when a bounded policy runs out
    /// - [`ExportError::Cancelled`] if shutdown interrupts a wait
    pub async fn fetch(&self, descriptor: &ResultDescriptor) -> Result<Table, ExportError> {
        let mut tracker = self.policy.tracker();
        let mut last_failure: Option<RetryContext> = None;

        loop {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            let err = match self.fetch_once(descriptor).await {
                Ok(table) => {
                    if let Some(mut context) = last_failure.take() {
                        context.attempt = tracker.failures() + 1;
                        info!("{}", context.format_success());
                    }
                    debug!(
                        url = %descriptor.url,
                        source_type = %descriptor.source_type,
                        rows = table.len(),
                        "Result file fetched"
                    );
                    return Ok(table);
                }
                Err(err) => err,
            };

            let mut context = self.context(descriptor, tracker.failures() + 1, &err);
            match tracker.record_failure() {
                RetryDecision::Retry(delay) => {
                    context.backoff_duration = delay;
                    debug!(url = %descriptor.url, "{}", context.format_retry());
                    last_failure = Some(context);
                    pause(self.sleeper.as_ref(), self.shutdown.as_deref(), delay).await?;
                }
                RetryDecision::GiveUp => {
                    error!("{}", context.format_failure());
                    return Err(ExportError::RetriesExhausted {
                        operation: "download",
                        attempts: tracker.failures(),
                        last_error: err.to_string(),
                    });
                }
            }
        }
    }

    fn context(&self, descriptor: &ResultDescriptor, attempt: u32, err: &FetcherError) -> RetryContext {
        RetryContext {
            operation: "download",
            attempt,
            max_attempts: self.policy.max_attempts,
            error_type: RetryErrorType::from(err),
            backoff_duration: std::time::Duration::ZERO,
            job_id: self.job_id.clone(),
            error_message: err.to_string(),
            endpoint: descriptor.url.clone(),
        }
    }
}

#[async_trait]
impl TableSource for ResilientFetcher {
    async fn fetch_table(&self, descriptor: &ResultDescriptor) -> Result<Table, ExportError> {
        self.fetch(descriptor).await
    }
}
