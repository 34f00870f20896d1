//! CSV decoding for export result files
//!
//! Stateless conversion of a downloaded body into a [`Table`]: UTF-8 decoding
//! with an optional byte-order mark, comma-delimited records with a header
//! line, empty fields as [`Cell::Null`].

use csv::ReaderBuilder;
use std::collections::HashSet;

use crate::fetcher::{FetcherError, FetcherResult};
use crate::table::{Cell, Table};

const UTF8_BOM: &str = "\u{feff}";

/// Stateless parser for export CSV files
pub struct CsvTableParser;

impl CsvTableParser {
    /// Decode a body as UTF-8, dropping a leading byte-order mark.
    ///
    /// # Errors
    /// Returns [`FetcherError::DecodeError`] if the bytes are not valid UTF-8
    pub fn decode(bytes: &[u8]) -> FetcherResult<&str> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| FetcherError::DecodeError(format!("body is not valid UTF-8: {e}")))?;
        Ok(text.strip_prefix(UTF8_BOM).unwrap_or(text))
    }

    /// Decode and parse a body in one step.
    pub fn parse_bytes(bytes: &[u8]) -> FetcherResult<Table> {
        Self::parse(Self::decode(bytes)?)
    }

    /// Parse comma-delimited text with a header line.
    ///
    /// Short records are padded with nulls; records longer than the header
    /// are rejected. Blank or duplicate header names are made unique
    /// (`Unnamed: 3`, `value.1`).
    ///
    /// # Errors
    /// Returns [`FetcherError::ParseError`] for malformed CSV
    pub fn parse(text: &str) -> FetcherResult<Table> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| FetcherError::ParseError(format!("failed to read header: {e}")))?
            .clone();
        let mut table = Table::new(unique_column_names(headers.iter()));
        let width = table.width();

        for (line, record) in reader.records().enumerate() {
            let record = record
                .map_err(|e| FetcherError::ParseError(format!("record {}: {e}", line + 1)))?;

            if record.len() > width {
                return Err(FetcherError::ParseError(format!(
                    "record {} has {} fields, header has {}",
                    line + 1,
                    record.len(),
                    width
                )));
            }

            let mut row: Vec<Cell> = record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        Cell::Null
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect();
            row.resize(width, Cell::Null);

            table
                .push_row(row)
                .map_err(|e| FetcherError::ParseError(e.to_string()))?;
        }

        Ok(table)
    }
}

fn unique_column_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for (idx, name) in names.enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {idx}")
        } else {
            name.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        columns.push(candidate);
    }

    columns
}
