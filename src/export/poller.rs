//! Export job status polling
//!
//! `GET {server}/export/{job_id}/` returns a status document. The job is
//! still running while its `status` is 202; at 200 the document lists the
//! result files:
//!
//! ```json
//! {"id": "job-42", "status": 200,
//!  "jobRecord": {"output": [{"type": "raw_sleep_mat", "url": "https://..."}]}}
//! ```
//!
//! Both `jobRecord.output` and `output.jobRecord` nestings are accepted.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::export::retry::{RetryDecision, RetryPolicy, DEFAULT_POLL_INTERVAL};
use crate::export::sleeper::{pause, Sleeper, TokioSleeper};
use crate::export::ExportError;
use crate::fetcher::retry_formatter::{RetryContext, RetryErrorType};
use crate::fetcher::{FetcherError, FetcherResult, Transport};
use crate::shutdown::SharedShutdown;
use crate::{JobHandle, ResultDescriptor};

/// Job status while processing.
pub const STATUS_PROCESSING: i64 = 202;

/// Job status once finished.
pub const STATUS_FINISHED: i64 = 200;

/// State of an export job as reported by one status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// Accepted and still processing
    Pending,
    /// Finished with no matching records
    ReadyEmpty,
    /// Finished; result files listed in server order
    ReadyWithData(Vec<ResultDescriptor>),
    /// Any other status code
    Unexpected(i64),
}

/// What the poller does when a job finishes without records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyResultPolicy {
    /// Stop polling and report an empty result
    #[default]
    Terminal,
    /// Keep polling until result files appear
    KeepPolling,
}

/// Terminal result of polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Result files to download, in server order
    Ready(Vec<ResultDescriptor>),
    /// The job finished with nothing to download
    Empty,
}

impl PollOutcome {
    /// Result files, empty for [`PollOutcome::Empty`].
    pub fn into_descriptors(self) -> Vec<ResultDescriptor> {
        match self {
            PollOutcome::Ready(descriptors) => descriptors,
            PollOutcome::Empty => Vec::new(),
        }
    }
}

/// Interpret a status document.
///
/// # Errors
/// Returns [`FetcherError::InvalidResponse`] when `status` is missing or not
/// numeric, or when the record list is not an array.
pub fn classify_status(document: &Value) -> FetcherResult<PollState> {
    let status = document
        .get("status")
        .and_then(status_code)
        .ok_or_else(|| {
            FetcherError::InvalidResponse("status document has no numeric 'status'".to_string())
        })?;

    match status {
        STATUS_PROCESSING => Ok(PollState::Pending),
        STATUS_FINISHED => {
            let Some(records) = job_records(document) else {
                return Ok(PollState::Pending);
            };
            let records = records.as_array().ok_or_else(|| {
                FetcherError::InvalidResponse("job record list is not an array".to_string())
            })?;

            let descriptors: Vec<ResultDescriptor> = records
                .iter()
                .filter_map(|record| descriptor_from_record(record, status))
                .collect();

            if descriptors.is_empty() {
                Ok(PollState::ReadyEmpty)
            } else {
                Ok(PollState::ReadyWithData(descriptors))
            }
        }
        other => Ok(PollState::Unexpected(other)),
    }
}

/// Integer status from an int, a whole float or a numeric string.
fn status_code(value: &Value) -> Option<i64> {
    if let Some(code) = value.as_i64() {
        return Some(code);
    }
    let code = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (code.is_finite() && code.fract() == 0.0).then_some(code as i64)
}

fn job_records(document: &Value) -> Option<&Value> {
    document
        .get("output")
        .and_then(|o| o.get("jobRecord"))
        .or_else(|| document.get("jobRecord").and_then(|j| j.get("output")))
        .filter(|v| !v.is_null())
}

fn descriptor_from_record(record: &Value, status: i64) -> Option<ResultDescriptor> {
    let Some(url) = record.get("url").and_then(Value::as_str) else {
        warn!(record = %record, "Job record without url skipped");
        return None;
    };
    let source_type = match record.get("type").and_then(Value::as_str) {
        Some(t) => t,
        None => {
            warn!(url, "Job record without type, tagging as 'unknown'");
            "unknown"
        }
    };
    Some(ResultDescriptor::new(url, source_type, status as u16))
}

/// Polls an export job until the portal lists its result files.
pub struct StatusPoller {
    transport: Arc<dyn Transport>,
    server: String,
    policy: RetryPolicy,
    empty_policy: EmptyResultPolicy,
    sleeper: Arc<dyn Sleeper>,
    shutdown: Option<SharedShutdown>,
}

impl StatusPoller {
    /// Poller for the portal at `server`, polling every 2 seconds without bound.
    pub fn new(transport: Arc<dyn Transport>, server: &str) -> Self {
        Self {
            transport,
            server: server.trim_end_matches('/').to_string(),
            policy: RetryPolicy::unbounded(DEFAULT_POLL_INTERVAL),
            empty_policy: EmptyResultPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            shutdown: None,
        }
    }

    /// Override the poll interval and bounds.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Choose how a finished-but-empty job is handled.
    pub fn with_empty_policy(mut self, empty_policy: EmptyResultPolicy) -> Self {
        self.empty_policy = empty_policy;
        self
    }

    /// Replace the timer used between polls.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: Option<SharedShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Status endpoint of `job`.
    pub fn status_url(&self, job: &JobHandle) -> String {
        format!("{}/export/{}/", self.server, job.job_id())
    }

    /// Query the job status once.
    pub async fn poll_once(&self, job: &JobHandle) -> FetcherResult<PollState> {
        let url = self.status_url(job);
        let response = self.transport.get(&url).await?.error_for_status(&url)?;
        let document: Value = response.json()?;
        classify_status(&document)
    }

    /// Poll until the job reaches a terminal state.
    ///
    /// Waits happen between polls only. Transport and decode failures are
    /// logged at debug level and treated like a still-running job.
    ///
    /// # Errors
    /// - [`ExportError::RetriesExhausted`] if the poll policy is bounded and
    ///   the bound is reached
    /// - [`ExportError::Cancelled`] if shutdown is requested while waiting
    pub async fn wait_for_results(&self, job: &JobHandle) -> Result<PollOutcome, ExportError> {
        let url = self.status_url(job);
        let mut tracker = self.policy.tracker();
        debug!(job_id = %job, "Polling export status");

        loop {
            let (error_type, message) = match self.poll_once(job).await {
                Ok(PollState::ReadyWithData(descriptors)) => {
                    info!(job_id = %job, files = descriptors.len(), "Export job ready");
                    return Ok(PollOutcome::Ready(descriptors));
                }
                Ok(PollState::ReadyEmpty) => {
                    debug!(job_id = %job, "Export job finished without records");
                    if self.empty_policy == EmptyResultPolicy::Terminal {
                        return Ok(PollOutcome::Empty);
                    }
                    (RetryErrorType::StillProcessing, "finished without records".to_string())
                }
                Ok(PollState::Pending) => (RetryErrorType::StillProcessing, "pending".to_string()),
                Ok(PollState::Unexpected(code)) => {
                    debug!(job_id = %job, status = code, "Unexpected export status");
                    (RetryErrorType::UnexpectedStatus(code), format!("unexpected status {code}"))
                }
                Err(e) => {
                    debug!(job_id = %job, error = %e, "Status poll failed");
                    (RetryErrorType::from(&e), e.to_string())
                }
            };

            let mut context = RetryContext {
                operation: "status poll",
                attempt: tracker.failures() + 1,
                max_attempts: self.policy.max_attempts,
                error_type,
                backoff_duration: std::time::Duration::ZERO,
                job_id: job.job_id().to_string(),
                error_message: message.clone(),
                endpoint: url.clone(),
            };

            match tracker.record_failure() {
                RetryDecision::Retry(delay) => {
                    context.backoff_duration = delay;
                    debug!("{}", context.format_retry());
                    pause(self.sleeper.as_ref(), self.shutdown.as_deref(), delay).await?;
                }
                RetryDecision::GiveUp => {
                    error!("{}", context.format_failure());
                    return Err(ExportError::RetriesExhausted {
                        operation: "status poll",
                        attempts: tracker.failures(),
                        last_error: message,
                    });
                }
            }
        }
    }
}
