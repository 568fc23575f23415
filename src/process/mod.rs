// src/process/mod.rs
use anyhow::{Context, Result};
use arrow::{
    array::{Array, ArrayRef},
    compute::concat_batches,
    csv::ReaderBuilder,
    csv::reader::Format,
    record_batch::RecordBatch,
    util::display::{ArrayFormatter, FormatOptions},
};
use std::{
    io::{Cursor, Read},
    sync::Arc,
};
use tracing::{debug, trace};
use zip::ZipArchive;

use crate::error::IngestError;

pub mod encoding;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// One in-memory table, tagged with the name it will be written under.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub table_name: String,
    pub batch: RecordBatch,
}

impl Dataset {
    pub fn new(table_name: impl Into<String>, batch: RecordBatch) -> Self {
        Self {
            table_name: table_name.into(),
            batch,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Look up a column by exact name, reporting `MissingColumn` otherwise.
    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        let idx = self.batch.schema().index_of(name).map_err(|_| {
            IngestError::MissingColumn {
                table: self.table_name.clone(),
                column: name.to_string(),
            }
        })?;
        Ok(self.batch.column(idx))
    }
}

/// If `bytes` is a zip archive, return the contents of its first `.csv`
/// entry (in archive order); otherwise hand the bytes back untouched.
pub fn unwrap_archive(name: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
    if !bytes.starts_with(ZIP_MAGIC) {
        return Ok(bytes);
    }

    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .with_context(|| format!("Failed to read ZIP archive: {}", name))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to access ZIP entry #{} in {}", i, name))?;
        let entry_name = entry.name().to_string();

        if entry.is_file() && entry_name.to_lowercase().ends_with(".csv") {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut buf)
                .with_context(|| format!("Failed to read {} into memory", entry_name))?;
            debug!(archive = %name, entry = %entry_name, bytes = buf.len(), "extracted csv");
            return Ok(buf);
        }
        trace!(archive = %name, entry = %entry_name, "skipping non-csv entry");
    }

    Err(IngestError::EmptyArchive(name.to_string()).into())
}

/// Parse a UTF-8 CSV with a header row into a single `RecordBatch`.
///
/// Column types are inferred from every record (booleans, integers, floats,
/// dates, timestamps, otherwise text).
pub fn parse_csv(table_name: &str, bytes: Vec<u8>) -> Result<Dataset> {
    // 1) infer the schema over the whole payload
    let format = Format::default().with_header(true);
    let (schema, records) = format
        .infer_schema(Cursor::new(&bytes), None)
        .with_context(|| format!("inferring CSV schema for {}", table_name))?;
    let schema = Arc::new(schema);
    debug!(table = %table_name, columns = schema.fields().len(), records, "inferred schema");

    // 2) read every batch with that schema
    let reader = ReaderBuilder::new(schema.clone())
        .with_header(true)
        .build(Cursor::new(bytes))
        .with_context(|| format!("creating CSV reader for {}", table_name))?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("CSV parse error in {}", table_name))?;

    // 3) stitch them into one batch
    let batch = concat_batches(&schema, &batches)
        .with_context(|| format!("concatenating batches for {}", table_name))?;

    Ok(Dataset::new(table_name, batch))
}

/// Render each value of `array` as text; nulls stay `None`.
///
/// Dates come out as `YYYY-MM-DD`, timestamps as ISO-8601.
pub fn render_text(array: &dyn Array) -> Result<Vec<Option<String>>> {
    let options = FormatOptions::default();
    let formatter =
        ArrayFormatter::try_new(array, &options).context("building value formatter")?;

    Ok((0..array.len())
        .map(|i| {
            if array.is_null(i) {
                None
            } else {
                Some(formatter.value(i).to_string())
            }
        })
        .collect())
}
