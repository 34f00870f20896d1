//! Retry message formatting for the export poll and download loops.
//!
//! Both loops retry on every failure, so the useful output is a consistent
//! one-line message per attempt and, when a caller-imposed bound is hit, a
//! failure summary with the job context and a remediation hint.

use std::time::Duration;

use crate::fetcher::FetcherError;

/// Classification of retry causes for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Network timeout
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 5xx server error
    ServerError(u16),
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx)
    ClientError(u16),
    /// Body was not valid UTF-8
    Decode,
    /// Body could not be parsed
    Parse,
    /// Body parsed to zero rows
    EmptyContent,
    /// Export job still being processed by the portal
    StillProcessing,
    /// Status document carried an unrecognised status code
    UnexpectedStatus(i64),
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::AuthFailed(code) => match code {
                401 => "authentication failed (401)",
                403 => "authentication failed (403)",
                _ => "authentication failed",
            },
            Self::ClientError(code) => match code {
                404 => "resource not found",
                _ => "client error",
            },
            Self::Decode => "undecodable content",
            Self::Parse => "malformed content",
            Self::EmptyContent => "empty content",
            Self::StillProcessing => "export still processing",
            Self::UnexpectedStatus(_) => "unexpected export status",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation presented after a bound is exhausted.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection or raise request_timeout_secs",
            Self::NetworkOffline => "Verify internet connectivity and the configured server URL",
            Self::ServerError(_) => "The portal may be experiencing issues, try again later",
            Self::AuthFailed(_) => "Verify the token in info.yaml or MINDER_TOKEN",
            Self::ClientError(_) => "Check that the export job and result URLs are still valid",
            Self::Decode | Self::Parse | Self::EmptyContent => {
                "The result file may still be materializing, retry with a larger bound"
            }
            Self::StillProcessing => "Large exports can take minutes, raise the poll bound",
            Self::UnexpectedStatus(_) => "Inspect the export job status on the portal",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }
}

impl From<&FetcherError> for RetryErrorType {
    fn from(err: &FetcherError) -> Self {
        match err {
            FetcherError::Timeout(_) => Self::NetworkTimeout,
            FetcherError::ConnectionFailed(_) => Self::NetworkOffline,
            FetcherError::HttpStatus { status, .. } => match *status {
                401 | 403 => Self::AuthFailed(*status),
                s if s >= 500 => Self::ServerError(s),
                s => Self::ClientError(s),
            },
            FetcherError::DecodeError(_) => Self::Decode,
            FetcherError::ParseError(_) | FetcherError::InvalidResponse(_) => Self::Parse,
            FetcherError::EmptyContent(_) => Self::EmptyContent,
            FetcherError::NetworkError(_) | FetcherError::ClientError(_) => Self::NetworkGeneric,
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Operation being retried ("download", "status poll")
    pub operation: &'static str,
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Attempt ceiling, if the caller imposed one
    pub max_attempts: Option<u32>,
    /// Type of error that triggered the retry
    pub error_type: RetryErrorType,
    /// Wait before the next attempt
    pub backoff_duration: Duration,
    /// Export job identifier
    pub job_id: String,
    /// Original error message for details
    pub error_message: String,
    /// URL that failed
    pub endpoint: String,
}

impl RetryContext {
    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying {} (attempt {}) after {} - waiting {:.1} seconds... (job {})",
            self.operation,
            self.attempt_label(),
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.job_label()
        )
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        format!(
            "{} attempt {} succeeded (job {})",
            capitalize(self.operation),
            self.attempt_label(),
            self.job_label()
        )
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let lines = [
            format!(
                "[FAILED] {} gave up after {} attempts",
                capitalize(self.operation),
                self.attempt
            ),
            format!("  Last error: {}", self.error_message),
            format!("  Job: {}", self.job_label()),
            format!("  Endpoint: {}", self.endpoint),
            "  Suggestions:".to_string(),
            format!("    - {}", self.error_type.suggestion()),
            "    - Relax or remove the attempt/deadline bound for this operation".to_string(),
        ];
        lines.join("\n")
    }

    fn attempt_label(&self) -> String {
        match self.max_attempts {
            Some(max) => format!("{}/{}", self.attempt, max),
            None => self.attempt.to_string(),
        }
    }

    fn job_label(&self) -> &str {
        if self.job_id.is_empty() {
            "unknown"
        } else {
            &self.job_id
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
