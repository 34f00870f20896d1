//! Export job submission

use std::sync::Arc;
use tracing::{debug, info};

use crate::export::request::ExportJobRequest;
use crate::export::ExportError;
use crate::fetcher::Transport;
use crate::JobHandle;

/// Headers that may carry the job location, in lookup order.
const LOCATION_HEADERS: [&str; 2] = ["content-location", "location"];

/// Submits export jobs to `{server}/export`.
///
/// One network call per submission, never retried here.
pub struct JobSubmitter {
    transport: Arc<dyn Transport>,
    export_url: String,
}

impl JobSubmitter {
    /// Submitter for the portal at `server`.
    pub fn new(transport: Arc<dyn Transport>, server: &str) -> Self {
        Self {
            transport,
            export_url: format!("{}/export", server.trim_end_matches('/')),
        }
    }

    /// Endpoint jobs are POSTed to.
    pub fn export_url(&self) -> &str {
        &self.export_url
    }

    /// POST the request and return the server-assigned job handle.
    ///
    /// # Errors
    /// - [`ExportError::Transport`] on network failure or an HTTP error status
    /// - [`ExportError::Submission`] if no usable location header is returned
    pub async fn submit(&self, request: &ExportJobRequest) -> Result<JobHandle, ExportError> {
        let body = request.to_json()?;
        debug!(
            url = %self.export_url,
            datasets = ?request.dataset_names(),
            since = request.since(),
            until = request.until(),
            "Submitting export job"
        );

        let response = self
            .transport
            .post_json(&self.export_url, &body)
            .await?
            .error_for_status(&self.export_url)?;

        let location = LOCATION_HEADERS
            .iter()
            .find_map(|name| response.header(name))
            .ok_or_else(|| {
                ExportError::Submission(format!(
                    "response (HTTP {}) carries no Content-Location header",
                    response.status
                ))
            })?;

        let job_id = parse_job_id(location).ok_or_else(|| {
            ExportError::Submission(format!("cannot extract job id from location '{location}'"))
        })?;

        info!(job_id = %job_id, "Export job submitted");
        Ok(JobHandle::new(job_id))
    }
}

/// Final `/`-delimited segment of a location header, ignoring trailing slashes.
pub fn parse_job_id(location: &str) -> Option<String> {
    let segment = location.trim().trim_end_matches('/').rsplit('/').next()?;
    if segment.is_empty() || segment.contains(char::is_whitespace) {
        return None;
    }
    Some(segment.to_string())
}
