// src/duck/mod.rs
use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray},
    compute::cast,
    datatypes::{DataType, Float64Type, Int64Type},
    util::display::{ArrayFormatter, FormatOptions},
};
use duckdb::{appender_params_from_iter, params, types::Value, Connection};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

use crate::error::IngestError;
use crate::process::Dataset;
use crate::schema::{quote_ident, SqlType, TableSchema};

/// The single DuckDB connection of a run, plus the schema tables go into.
///
/// Dropping the handle releases the connection; `close` does the same but
/// reports close failures.
pub struct Warehouse {
    conn: Connection,
    schema: String,
    path: Option<PathBuf>,
}

impl Warehouse {
    /// Start from a fresh database file at `path`: create the parent
    /// directory, delete any previous file (and its WAL), open it and create
    /// `schema`.
    #[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
    pub fn create<P: AsRef<Path>>(path: P, schema: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        // If an old DB exists, remove it so we start fresh
        if path.exists() {
            info!("removing existing database file");
            fs::remove_file(&path)
                .with_context(|| format!("removing old database {}", path.display()))?;
        }
        let wal = wal_path(&path);
        if wal.exists() {
            fs::remove_file(&wal)
                .with_context(|| format!("removing old WAL {}", wal.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("opening DuckDB at {}", path.display()))?;
        Self::init(conn, schema, Some(path))
    }

    /// In-memory warehouse, used by tests.
    pub fn in_memory(schema: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, schema, None)
    }

    fn init(conn: Connection, schema: &str, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(&format!("CREATE SCHEMA {};", quote_ident(schema)))
            .with_context(|| format!("creating schema {}", schema))?;
        debug!(schema, "created schema");
        Ok(Self {
            conn,
            schema: schema.to_string(),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE lower(table_schema) = lower(?) AND lower(table_name) = lower(?);",
            params![self.schema, table],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    /// Write `dataset` as a new table in the run schema and return the number
    /// of rows appended.
    ///
    /// An existing table with the same name is an `IngestError::DuplicateTable`;
    /// nothing is overwritten or skipped silently.
    #[instrument(level = "info", skip(self, dataset), fields(table = %dataset.table_name))]
    pub fn load(&self, dataset: &Dataset) -> Result<usize> {
        let table_schema = TableSchema::from_dataset(dataset)?;

        if self.table_exists(&dataset.table_name)? {
            return Err(IngestError::DuplicateTable {
                schema: self.schema.clone(),
                table: dataset.table_name.clone(),
            }
            .into());
        }

        self.conn
            .execute_batch(&table_schema.create_table_sql(&self.schema))
            .with_context(|| format!("creating table {}.{}", self.schema, dataset.table_name))?;

        let rows = insert_rows(&self.conn, &self.schema, &table_schema, dataset)?;
        info!(table = %dataset.table_name, rows, "table written");
        Ok(rows)
    }

    /// Tables of the run schema, sorted by name.
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE lower(table_schema) = lower(?) ORDER BY table_name;",
        )?;
        let names = stmt
            .query_map(params![self.schema], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}.{};",
            quote_ident(&self.schema),
            quote_ident(table)
        );
        let n = self.conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(n)
    }

    /// Close the connection, surfacing any error DuckDB reports.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| anyhow!("closing DuckDB connection: {}", e))
    }
}

fn wal_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".wal");
    PathBuf::from(s)
}

/// Per-column access to the values of a batch, already in appendable form.
enum Cells<'a> {
    Bool(&'a BooleanArray),
    Int(&'a Int64Array),
    Float(&'a Float64Array),
    Text(&'a StringArray),
    // dates and timestamps go in as ISO text; DuckDB casts them on append
    Formatted(&'a dyn Array, ArrayFormatter<'a>),
}

impl Cells<'_> {
    fn value(&self, row: usize) -> Value {
        match self {
            Cells::Bool(a) if !a.is_null(row) => Value::Boolean(a.value(row)),
            Cells::Int(a) if !a.is_null(row) => Value::BigInt(a.value(row)),
            Cells::Float(a) if !a.is_null(row) => Value::Double(a.value(row)),
            Cells::Text(a) if !a.is_null(row) => Value::Text(a.value(row).to_string()),
            Cells::Formatted(a, f) if !a.is_null(row) => Value::Text(f.value(row).to_string()),
            _ => Value::Null,
        }
    }
}

/// Bring every column to the Arrow type its SQL type is appended from.
fn coerce_columns(table_schema: &TableSchema, dataset: &Dataset) -> Result<Vec<ArrayRef>> {
    table_schema
        .columns
        .iter()
        .zip(dataset.batch.columns())
        .map(|(col, arr)| {
            let target = match col.ty {
                SqlType::BigInt => DataType::Int64,
                SqlType::Double => DataType::Float64,
                SqlType::Varchar => DataType::Utf8,
                SqlType::Boolean | SqlType::Date | SqlType::Timestamp => {
                    return Ok(arr.clone())
                }
            };
            if arr.data_type() == &target {
                Ok(arr.clone())
            } else {
                cast(arr.as_ref(), &target)
                    .with_context(|| format!("casting column {} to {}", col.name, col.ty))
            }
        })
        .collect()
}

fn insert_rows(
    conn: &Connection,
    schema: &str,
    table_schema: &TableSchema,
    dataset: &Dataset,
) -> Result<usize> {
    let arrays = coerce_columns(table_schema, dataset)?;
    let options = FormatOptions::default();

    let mut cells = Vec::with_capacity(arrays.len());
    for (col, arr) in table_schema.columns.iter().zip(&arrays) {
        let c = match col.ty {
            SqlType::Boolean => Cells::Bool(arr.as_boolean()),
            SqlType::BigInt => Cells::Int(arr.as_primitive::<Int64Type>()),
            SqlType::Double => Cells::Float(arr.as_primitive::<Float64Type>()),
            SqlType::Varchar => Cells::Text(arr.as_string::<i32>()),
            SqlType::Date | SqlType::Timestamp => Cells::Formatted(
                arr.as_ref(),
                ArrayFormatter::try_new(arr.as_ref(), &options)
                    .with_context(|| format!("formatting column {}", col.name))?,
            ),
        };
        cells.push(c);
    }

    let rows = dataset.num_rows();
    let mut appender = conn
        .appender_to_db(&table_schema.table, schema)
        .with_context(|| format!("opening appender for {}.{}", schema, table_schema.table))?;
    for row in 0..rows {
        let values = cells.iter().map(|c| c.value(row));
        appender
            .append_row(appender_params_from_iter(values))
            .with_context(|| format!("appending row {} to {}", row, table_schema.table))?;
    }
    appender.flush()?;

    Ok(rows)
}
