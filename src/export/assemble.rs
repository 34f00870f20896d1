//! Consolidation of downloaded result files into one table
//!
//! Files are fetched in descriptor order (or through an ordered buffered
//! stream when concurrency is above 1), concatenated, stripped of echoed
//! header rows and given real booleans for `"true"` / `"false"` text.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::export::progress::ProgressReporter;
use crate::export::ExportError;
use crate::table::{SchemaPolicy, Table, TableSchema};
use crate::ResultDescriptor;

/// Notice logged when an export has nothing to download.
pub const NO_DATA_NOTICE: &str = "No data in this period";

/// Produces the table behind one result descriptor.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Fetch and parse the file, tagged with its source type.
    async fn fetch_table(&self, descriptor: &ResultDescriptor) -> Result<Table, ExportError>;
}

/// Counters from one consolidation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyStats {
    /// Files consolidated
    pub files: usize,
    /// Rows in the consolidated table
    pub rows: usize,
    /// Header echo rows dropped
    pub header_rows_removed: usize,
    /// Cells converted to booleans
    pub booleans_normalized: usize,
}

/// Concatenate `tables` in order and clean the result.
pub fn consolidate(tables: Vec<Table>) -> (Table, AssemblyStats) {
    let files = tables.len();
    let mut table = Table::concat(tables);
    let header_rows_removed = table.remove_header_echoes();
    if header_rows_removed > 0 {
        debug!(rows = header_rows_removed, "Dropped echoed header rows");
    }
    let booleans_normalized = table.normalize_booleans();

    let stats = AssemblyStats {
        files,
        rows: table.len(),
        header_rows_removed,
        booleans_normalized,
    };
    (table, stats)
}

/// Fetches every result file and consolidates the tables.
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    schema_policy: SchemaPolicy,
    concurrency: usize,
}

impl Default for ResultAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAssembler {
    /// Sequential assembler with the union schema policy.
    pub fn new() -> Self {
        Self {
            schema_policy: SchemaPolicy::default(),
            concurrency: 1,
        }
    }

    /// How tables of the same source are reconciled.
    pub fn with_schema_policy(mut self, schema_policy: SchemaPolicy) -> Self {
        self.schema_policy = schema_policy;
        self
    }

    /// Maximum downloads in flight (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Downloads in flight.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetch every descriptor through `source` and consolidate the results.
    ///
    /// Descriptors without a URL are skipped. If nothing is left to fetch,
    /// the "No data in this period" notice is logged and an empty table is
    /// returned without calling `source`.
    ///
    /// # Errors
    /// - Whatever `source` returns for a file
    /// - [`ExportError::Schema`] under [`SchemaPolicy::Strict`] when a
    ///   table's columns differ from the first table of its source type
    pub async fn collect(
        &self,
        descriptors: &[ResultDescriptor],
        source: &dyn TableSource,
        progress: &dyn ProgressReporter,
    ) -> Result<(Table, AssemblyStats), ExportError> {
        let usable: Vec<&ResultDescriptor> = descriptors
            .iter()
            .filter(|d| {
                let has_url = !d.url.trim().is_empty();
                if !has_url {
                    warn!(source_type = %d.source_type, "Result descriptor without url skipped");
                }
                has_url
            })
            .collect();

        if usable.is_empty() {
            info!("{NO_DATA_NOTICE}");
            return Ok((Table::empty(), AssemblyStats::default()));
        }

        let total = usable.len();
        progress.on_start(total);

        let mut schema = TableSchema::new(self.schema_policy);
        let mut tables = Vec::with_capacity(total);
        let pending: Vec<_> = usable
            .into_iter()
            .map(|descriptor| async move {
                source
                    .fetch_table(descriptor)
                    .await
                    .map(|table| (descriptor, table))
            })
            .collect();
        let mut fetched = stream::iter(pending).buffered(self.concurrency);

        while let Some(result) = fetched.next().await {
            let (descriptor, table) = result?;
            schema.conform(&descriptor.source_type, &table)?;
            progress.on_item_complete(tables.len() + 1, total, descriptor, table.len());
            tables.push(table);
        }

        let (table, stats) = consolidate(tables);
        progress.on_finish(table.len());
        Ok((table, stats))
    }
}
