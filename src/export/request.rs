//! Export job description
//!
//! [`ExportJobRequest`] is the body POSTed to `{server}/export`:
//!
//! ```json
//! {
//!   "since": "2024-01-01T00:00:00.000Z",
//!   "until": "2024-01-08T00:00:00.000Z",
//!   "datasets": {"raw_sleep_mat": {"columns": ["id", "start_date"]}},
//!   "organizations": ["org-1"]
//! }
//! ```

use chrono::NaiveDateTime;
use serde::ser::Serializer;
use serde::Serialize;

use crate::export::ExportError;
use crate::format_portal_timestamp;
use crate::metadata::MetadataLookup;

/// Caller-facing parameters of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportParams {
    /// Start of the time range
    pub since: NaiveDateTime,
    /// End of the time range
    pub until: NaiveDateTime,
    /// Datasets to export, in order
    pub datasets: Vec<String>,
    /// Optional organization filter
    pub organizations: Option<Vec<String>>,
}

impl ExportParams {
    /// Parameters for `datasets` between `since` and `until`.
    pub fn new<I, S>(since: NaiveDateTime, until: NaiveDateTime, datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            since,
            until,
            datasets: datasets.into_iter().map(Into::into).collect(),
            organizations: None,
        }
    }

    /// Restrict the export to some organizations.
    pub fn with_organizations<I, S>(mut self, organizations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.organizations = Some(organizations.into_iter().map(Into::into).collect());
        self
    }
}

/// Columns requested for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSelection {
    /// Dataset name (serialized as the map key)
    #[serde(skip)]
    pub name: String,
    /// Columns to export, in metadata order
    pub columns: Vec<String>,
}

/// Immutable export job description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportJobRequest {
    since: String,
    until: String,
    #[serde(serialize_with = "serialize_datasets")]
    datasets: Vec<DatasetSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    organizations: Option<Vec<String>>,
}

fn serialize_datasets<S: Serializer>(
    datasets: &[DatasetSelection],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(datasets.iter().map(|d| (&d.name, d)))
}

impl ExportJobRequest {
    /// Resolve columns for every dataset and build the request.
    ///
    /// # Errors
    /// - [`ExportError::UnknownDataset`] if a dataset has no metadata entry
    /// - [`ExportError::InvalidRequest`] for an empty dataset list, a dataset
    ///   without columns, or `until` not after `since`
    pub fn build(params: &ExportParams, metadata: &dyn MetadataLookup) -> Result<Self, ExportError> {
        if params.datasets.is_empty() {
            return Err(ExportError::InvalidRequest(
                "at least one dataset is required".to_string(),
            ));
        }

        if params.until <= params.since {
            return Err(ExportError::InvalidRequest(format!(
                "until ({}) must be after since ({})",
                params.until, params.since
            )));
        }

        let mut datasets: Vec<DatasetSelection> = Vec::with_capacity(params.datasets.len());
        for name in &params.datasets {
            if datasets.iter().any(|d| &d.name == name) {
                continue;
            }

            let columns = metadata
                .columns_for(name)
                .ok_or_else(|| ExportError::UnknownDataset(name.clone()))?;
            if columns.is_empty() {
                return Err(ExportError::InvalidRequest(format!(
                    "dataset '{name}' has no available columns"
                )));
            }

            datasets.push(DatasetSelection {
                name: name.clone(),
                columns: columns.to_vec(),
            });
        }

        let organizations = params.organizations.as_ref().and_then(|orgs| {
            let mut unique: Vec<String> = Vec::with_capacity(orgs.len());
            for org in orgs {
                if !unique.contains(org) {
                    unique.push(org.clone());
                }
            }
            (!unique.is_empty()).then_some(unique)
        });

        Ok(Self {
            since: format_portal_timestamp(params.since),
            until: format_portal_timestamp(params.until),
            datasets,
            organizations,
        })
    }

    /// Formatted start of the time range.
    pub fn since(&self) -> &str {
        &self.since
    }

    /// Formatted end of the time range.
    pub fn until(&self) -> &str {
        &self.until
    }

    /// Requested datasets in caller order.
    pub fn datasets(&self) -> &[DatasetSelection] {
        &self.datasets
    }

    /// Requested dataset names in caller order.
    pub fn dataset_names(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.name.as_str()).collect()
    }

    /// Organization filter, if any.
    pub fn organizations(&self) -> Option<&[String]> {
        self.organizations.as_deref()
    }

    /// JSON body for the submission endpoint.
    pub fn to_json(&self) -> Result<serde_json::Value, ExportError> {
        serde_json::to_value(self)
            .map_err(|e| ExportError::InvalidRequest(format!("failed to serialize request: {e}")))
    }
}
