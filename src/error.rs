// src/error.rs

use std::path::PathBuf;

/// Conditions callers need to tell apart. Everything else travels as a plain
/// `anyhow::Error` with context; these are recovered with
/// `err.downcast_ref::<IngestError>()`.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("data directory {0} does not exist")]
    MissingDataDir(PathBuf),

    #[error("no CSV files found in {0}")]
    NoCsvFiles(PathBuf),

    #[error("source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("zip archive {0} contains no CSV entry")]
    EmptyArchive(String),

    #[error("column {column} not found in {table}")]
    MissingColumn { table: String, column: String },

    #[error("no dataset named {0} was ingested")]
    UnknownTable(String),

    #[error("table {schema}.{table} already exists")]
    DuplicateTable { schema: String, table: String },

    #[error("invalid column {column:?} in {table}: {reason}")]
    InvalidColumn {
        table: String,
        column: String,
        reason: &'static str,
    },

    #[error("column {column} in {table} has unsupported type {data_type}")]
    UnsupportedType {
        table: String,
        column: String,
        data_type: String,
    },

    #[error("pivot label {label:?} collides with {other:?}")]
    PivotLabelCollision { label: String, other: String },
}

impl IngestError {
    /// True for missing-input conditions (absent directory, file or URL).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IngestError::MissingDataDir(_)
                | IngestError::NoCsvFiles(_)
                | IngestError::SourceNotFound(_)
                | IngestError::Fetch { .. }
        )
    }
}
