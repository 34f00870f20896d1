//! CSV output writer for consolidated tables

use csv::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{OutputError, OutputResult, OutputWriter, TableWriter};
use crate::table::Table;

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// CSV writer for export tables.
///
/// Nulls are written as empty fields and booleans as `true` / `false`.
pub struct CsvTableWriter<W: Write = BufWriter<File>> {
    writer: Writer<W>,
    rows_written: u64,
}

impl CsvTableWriter<BufWriter<File>> {
    /// Create a writer for `path`, creating parent directories as needed.
    pub fn new<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        Self::new_with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Create a writer for `path` with a custom buffer size.
    pub fn new_with_buffer_size<P: AsRef<Path>>(path: P, buffer_size: usize) -> OutputResult<Self> {
        let path = path.as_ref();
        info!("Creating CSV writer: path={}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    OutputError::IoError(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {}", e)))?;

        Ok(Self::from_writer(BufWriter::with_capacity(buffer_size, file)))
    }
}

impl<W: Write> CsvTableWriter<W> {
    /// Wrap any writer, e.g. stdout.
    pub fn from_writer(inner: W) -> Self {
        Self {
            writer: Writer::from_writer(inner),
            rows_written: 0,
        }
    }

    /// Rows written so far.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush and return the inner writer.
    pub fn into_inner(self) -> OutputResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e.error())))
    }
}

impl<W: Write> TableWriter for CsvTableWriter<W> {
    fn write_table(&mut self, table: &Table) -> OutputResult<()> {
        if table.width() == 0 {
            debug!("Empty table, nothing to write");
            return Ok(());
        }

        self.writer
            .write_record(table.columns())
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {}", e)))?;

        for row in table.rows() {
            self.writer
                .write_record(row.iter().map(|cell| cell.render()))
                .map_err(|e| OutputError::CsvError(format!("Failed to write row: {}", e)))?;
            self.rows_written += 1;

            if self.rows_written % 1000 == 0 {
                self.flush()?;
                debug!("Progress: {} rows written", self.rows_written);
            }
        }

        Ok(())
    }
}

impl<W: Write> OutputWriter for CsvTableWriter<W> {
    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {}", e)))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()?;
        info!("CSV writer closed: {} rows written", self.rows_written);
        Ok(())
    }
}
