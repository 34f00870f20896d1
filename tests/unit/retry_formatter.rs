use std::time::Duration;

use minder_downloader::fetcher::retry_formatter::{RetryContext, RetryErrorType};
use minder_downloader::fetcher::FetcherError;

fn sample_context(error_type: RetryErrorType, max_attempts: Option<u32>) -> RetryContext {
    RetryContext {
        operation: "download",
        attempt: 2,
        max_attempts,
        error_type,
        backoff_duration: Duration::from_secs(4),
        job_id: "job-42".to_string(),
        error_message: "connection reset".to_string(),
        endpoint: "https://files.example.org/raw_sleep_mat.csv".to_string(),
    }
}

#[test]
fn format_retry_captures_attempt_and_wait() {
    let ctx = sample_context(RetryErrorType::ServerError(503), Some(5));
    let message = ctx.format_retry();
    assert!(message.contains("Retrying download"));
    assert!(message.contains("attempt 2/5"));
    assert!(message.contains("service unavailable"));
    assert!(message.contains("4.0 seconds"));
    assert!(message.contains("job-42"));
}

#[test]
fn format_retry_without_bound_has_no_denominator() {
    let ctx = sample_context(RetryErrorType::StillProcessing, None);
    let message = ctx.format_retry();
    assert!(message.contains("(attempt 2)"));
    assert!(message.contains("export still processing"));
}

#[test]
fn format_success_includes_job() {
    let ctx = sample_context(RetryErrorType::NetworkTimeout, Some(5));
    assert_eq!(ctx.format_success(), "Download attempt 2/5 succeeded (job job-42)");
}

#[test]
fn format_failure_lists_suggestions() {
    let mut ctx = sample_context(RetryErrorType::AuthFailed(401), Some(3));
    ctx.attempt = 3;
    let output = ctx.format_failure();
    assert!(output.starts_with("[FAILED] Download gave up after 3 attempts"));
    assert!(output.contains("Last error: connection reset"));
    assert!(output.contains("Endpoint: https://files.example.org/raw_sleep_mat.csv"));
    assert!(output.contains("MINDER_TOKEN"));
}

#[test]
fn missing_job_id_is_labelled_unknown() {
    let mut ctx = sample_context(RetryErrorType::Parse, None);
    ctx.job_id.clear();
    assert!(ctx.format_retry().contains("(job unknown)"));
}

#[test]
fn fetcher_errors_are_classified() {
    let cases = [
        (FetcherError::Timeout("t".into()), RetryErrorType::NetworkTimeout),
        (FetcherError::ConnectionFailed("c".into()), RetryErrorType::NetworkOffline),
        (
            FetcherError::HttpStatus { status: 403, url: "u".into() },
            RetryErrorType::AuthFailed(403),
        ),
        (
            FetcherError::HttpStatus { status: 502, url: "u".into() },
            RetryErrorType::ServerError(502),
        ),
        (
            FetcherError::HttpStatus { status: 404, url: "u".into() },
            RetryErrorType::ClientError(404),
        ),
        (FetcherError::DecodeError("d".into()), RetryErrorType::Decode),
        (FetcherError::ParseError("p".into()), RetryErrorType::Parse),
        (FetcherError::EmptyContent("u".into()), RetryErrorType::EmptyContent),
        (FetcherError::NetworkError("n".into()), RetryErrorType::NetworkGeneric),
    ];

    for (err, expected) in cases {
        assert_eq!(RetryErrorType::from(&err), expected, "{err}");
    }
}
