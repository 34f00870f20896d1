//! Dataset and organization metadata
//!
//! The portal describes its exportable datasets at `GET {server}/info/datasets`,
//! grouped by domain category:
//!
//! ```json
//! {"Categories": {"raw": {"raw_sleep": {"availableColumns": ["id", "start_date"], "description": "..."}}}}
//! ```
//!
//! A [`DatasetCatalog`] is the parsed form; it implements [`MetadataLookup`],
//! which is all the export request builder needs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::fetcher::{FetcherError, Transport};

/// Metadata errors
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// Metadata endpoint could not be reached
    #[error("metadata request failed: {0}")]
    Fetch(#[from] FetcherError),

    /// Metadata document did not have the expected shape
    #[error("metadata parse error: {0}")]
    ParseError(String),
}

/// Resolves dataset names to the columns an export should request.
pub trait MetadataLookup: Send + Sync {
    /// Available columns for `dataset`, or `None` if the dataset is unknown.
    fn columns_for(&self, dataset: &str) -> Option<&[String]>;
}

/// Metadata about one exportable dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    /// Dataset name as used in export requests
    pub name: String,
    /// Category the portal files the dataset under
    pub domain: String,
    /// Human-readable description
    pub description: Option<String>,
    /// Columns that can be requested
    pub available_columns: Vec<String>,
    /// Any other fields the portal publishes
    pub extra: Map<String, Value>,
}

/// Metadata about one participating organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationInfo {
    /// Identifier used in the `organizations` request filter
    #[serde(alias = "organization", alias = "organisation")]
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Short name
    #[serde(default)]
    pub acronym: Option<String>,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Any other fields the portal publishes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawDatasetEntry {
    #[serde(rename = "availableColumns", default)]
    available_columns: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawDatasetsDocument {
    #[serde(rename = "Categories")]
    categories: BTreeMap<String, BTreeMap<String, RawDatasetEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawOrganizationsDocument {
    organizations: Vec<OrganizationInfo>,
}

/// Catalog of datasets available for export.
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    entries: BTreeMap<String, DatasetInfo>,
}

impl DatasetCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from dataset entries.
    pub fn from_entries(entries: impl IntoIterator<Item = DatasetInfo>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }

    /// Register a dataset with its columns (domain left blank).
    pub fn with_dataset<I, S>(mut self, name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        self.entries.insert(
            name.clone(),
            DatasetInfo {
                name,
                domain: String::new(),
                description: None,
                available_columns: columns.into_iter().map(Into::into).collect(),
                extra: Map::new(),
            },
        );
        self
    }

    /// Parse the `/info/datasets` document.
    pub fn from_json(json: &str) -> Result<Self, MetadataError> {
        let raw: RawDatasetsDocument = serde_json::from_str(json)
            .map_err(|e| MetadataError::ParseError(format!("failed to parse datasets: {e}")))?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawDatasetsDocument) -> Self {
        let mut entries = BTreeMap::new();
        for (domain, datasets) in raw.categories {
            for (name, entry) in datasets {
                entries.insert(
                    name.clone(),
                    DatasetInfo {
                        name,
                        domain: domain.clone(),
                        description: entry.description,
                        available_columns: entry.available_columns,
                        extra: entry.extra,
                    },
                );
            }
        }
        Self { entries }
    }

    /// Fetch and parse the catalog from `{server}/info/datasets`.
    pub async fn fetch(transport: &dyn Transport, server: &str) -> Result<Self, MetadataError> {
        let url = format!("{server}/info/datasets");
        debug!(url = %url, "Fetching dataset metadata");
        let response = transport.get(&url).await?.error_for_status(&url)?;
        let raw: RawDatasetsDocument = response.json()?;
        let catalog = Self::from_raw(raw);
        debug!(datasets = catalog.len(), "Dataset metadata loaded");
        Ok(catalog)
    }

    /// Look up one dataset.
    pub fn get(&self, name: &str) -> Option<&DatasetInfo> {
        self.entries.get(name)
    }

    /// All datasets, sorted by name.
    pub fn entries(&self) -> impl Iterator<Item = &DatasetInfo> {
        self.entries.values()
    }

    /// Datasets filed under `domain`.
    pub fn in_domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a DatasetInfo> + 'a {
        self.entries.values().filter(move |e| e.domain == domain)
    }

    /// Distinct domains, sorted.
    pub fn domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = self.entries.values().map(|e| e.domain.as_str()).collect();
        domains.sort_unstable();
        domains.dedup();
        domains
    }

    /// Number of datasets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no datasets.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataLookup for DatasetCatalog {
    fn columns_for(&self, dataset: &str) -> Option<&[String]> {
        self.entries
            .get(dataset)
            .map(|e| e.available_columns.as_slice())
    }
}

/// Parse the `/info/organizations` document.
pub fn parse_organizations(json: &str) -> Result<Vec<OrganizationInfo>, MetadataError> {
    let raw: RawOrganizationsDocument = serde_json::from_str(json)
        .map_err(|e| MetadataError::ParseError(format!("failed to parse organizations: {e}")))?;
    Ok(raw.organizations)
}

/// Fetch organization metadata from `{server}/info/organizations`.
pub async fn fetch_organizations(
    transport: &dyn Transport,
    server: &str,
) -> Result<Vec<OrganizationInfo>, MetadataError> {
    let url = format!("{server}/info/organizations");
    debug!(url = %url, "Fetching organization metadata");
    let response = transport.get(&url).await?.error_for_status(&url)?;
    let raw: RawOrganizationsDocument = response.json()?;
    Ok(raw.organizations)
}
