//! Row-oriented tables produced by export downloads.
//!
//! Every downloaded file becomes a [`Table`]; the assembler concatenates them
//! into the consolidated table handed back to the caller. Cells are kept as
//! text (the portal serves CSV), with [`Cell::Null`] for empty fields and
//! [`Cell::Bool`] once boolean literals have been normalized.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Column that tags every row with the dataset type it was exported from.
pub const SOURCE_COLUMN: &str = "source";

/// Table errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    /// A row did not match the table width
    #[error("row has {actual} cells, table has {expected} columns")]
    RowWidth {
        /// Number of columns in the table
        expected: usize,
        /// Number of cells in the rejected row
        actual: usize,
    },

    /// A table did not conform to the schema established for its source
    #[error("schema mismatch for source '{source_type}': expected columns {expected:?}, got {actual:?}")]
    SchemaMismatch {
        /// Source type whose schema was violated
        source_type: String,
        /// Columns established by the first table of this source
        expected: Vec<String>,
        /// Columns of the offending table
        actual: Vec<String>,
    },
}

/// A single table cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Cell {
    /// Missing value (empty CSV field, or column absent from a source file)
    Null,
    /// Raw text value
    Text(String),
    /// Boolean value after normalization of `"true"` / `"false"`
    Bool(bool),
}

impl Cell {
    /// Text content, if this is a text cell.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean content, if this is a boolean cell.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Parse a text cell as a floating point number.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_str().and_then(|s| s.trim().parse().ok())
    }

    /// Whether this cell holds no value.
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Render the cell the way it is written back to CSV.
    pub fn render(&self) -> &str {
        match self {
            Cell::Null => "",
            Cell::Text(s) => s,
            Cell::Bool(true) => "true",
            Cell::Bool(false) => "false",
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

/// Row-oriented table with named columns.
///
/// Row positions are always contiguous: removing rows renumbers the ones
/// that follow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows in order.
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append a row; its width must match the number of columns.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Cell at `row` in the named column.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// All cells of the named column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Return the position of `name`, appending it (filled with nulls) if absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Cell::Null);
        }
        self.columns.len() - 1
    }

    /// Set the `source` column of every row to `source_type`.
    ///
    /// An existing `source` column is overwritten.
    pub fn tag_source(&mut self, source_type: &str) {
        let idx = self.ensure_column(SOURCE_COLUMN);
        for row in &mut self.rows {
            row[idx] = Cell::Text(source_type.to_string());
        }
    }

    /// Append the rows of `other`, aligning columns by name.
    ///
    /// Columns unknown to `self` are appended in the order `other` declares
    /// them; cells missing on either side become [`Cell::Null`].
    pub fn append(&mut self, other: Table) {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }

        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|name| self.ensure_column(name))
            .collect();

        let width = self.columns.len();
        self.rows.reserve(other.rows.len());
        for row in other.rows {
            let mut aligned = vec![Cell::Null; width];
            for (cell, &target) in row.into_iter().zip(&mapping) {
                aligned[target] = cell;
            }
            self.rows.push(aligned);
        }
    }

    /// Concatenate tables in order.
    pub fn concat<I>(tables: I) -> Table
    where
        I: IntoIterator<Item = Table>,
    {
        tables.into_iter().fold(Table::empty(), |mut acc, t| {
            acc.append(t);
            acc
        })
    }

    /// Remove rows that echo the header line, returning how many were dropped.
    ///
    /// A row is an echo when every non-null cell outside the `source` column
    /// equals its own column name, and there is at least one such cell.
    pub fn remove_header_echoes(&mut self) -> usize {
        let before = self.rows.len();
        let columns = &self.columns;
        self.rows.retain(|row| !is_header_echo(columns, row));
        before - self.rows.len()
    }

    /// Replace `"true"` / `"false"` text cells with booleans.
    ///
    /// Returns the number of cells converted. Matching is exact.
    pub fn normalize_booleans(&mut self) -> usize {
        let mut converted = 0;
        for cell in self.rows.iter_mut().flatten() {
            let value = match cell.as_str() {
                Some("true") => true,
                Some("false") => false,
                _ => continue,
            };
            *cell = Cell::Bool(value);
            converted += 1;
        }
        converted
    }
}

fn is_header_echo(columns: &[String], row: &[Cell]) -> bool {
    let mut matched = 0;
    for (name, cell) in columns.iter().zip(row) {
        if name == SOURCE_COLUMN {
            continue;
        }
        match cell {
            Cell::Null => {}
            Cell::Text(text) if text == name => matched += 1,
            _ => return false,
        }
    }
    matched > 0
}

/// How fetched tables are reconciled before concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaPolicy {
    /// Union of all columns; missing cells are null
    #[default]
    Union,
    /// Every table of a source type must carry the column set of the first one
    Strict,
}

/// Column schema established from the first successful fetch of each source.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    policy: SchemaPolicy,
    by_source: HashMap<String, BTreeSet<String>>,
}

impl TableSchema {
    /// Create a schema tracker for the given policy.
    pub fn new(policy: SchemaPolicy) -> Self {
        Self {
            policy,
            by_source: HashMap::new(),
        }
    }

    /// Policy in force.
    pub fn policy(&self) -> SchemaPolicy {
        self.policy
    }

    /// Check `table` against the schema recorded for `source_type`,
    /// recording it if this is the first table of that source.
    pub fn conform(&mut self, source_type: &str, table: &Table) -> Result<(), TableError> {
        let actual: BTreeSet<String> = table.columns().iter().cloned().collect();
        match self.by_source.get(source_type) {
            None => {
                self.by_source.insert(source_type.to_string(), actual);
                Ok(())
            }
            Some(_) if self.policy == SchemaPolicy::Union => Ok(()),
            Some(expected) if *expected == actual => Ok(()),
            Some(expected) => Err(TableError::SchemaMismatch {
                source_type: source_type.to_string(),
                expected: expected.iter().cloned().collect(),
                actual: actual.into_iter().collect(),
            }),
        }
    }
}
