// src/process/encoding.rs
use anyhow::Result;
use arrow::{
    array::{ArrayRef, AsArray, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::Dataset;
use crate::error::IngestError;

/// Undo UTF-8 text that was decoded as Latin-1 somewhere upstream
/// (`"SÃ£o"` → `"São"`).
///
/// The chars are taken as Latin-1 bytes and decoded as UTF-8. If a char is
/// outside Latin-1, or the bytes are not valid UTF-8, the input comes back
/// unchanged.
pub fn repair_double_encoding(s: &str) -> String {
    let mut bytes = Vec::with_capacity(s.len());
    for c in s.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(b) => bytes.push(b),
            Err(_) => return s.to_string(),
        }
    }
    String::from_utf8(bytes).unwrap_or_else(|_| s.to_string())
}

/// Repair the text in `correct_column` (if given) and uppercase every column
/// name.
///
/// Only Utf8 columns are repaired; any other type is passed through.
pub fn normalize(dataset: Dataset, correct_column: Option<&str>) -> Result<Dataset> {
    let Dataset { table_name, batch } = dataset;
    let schema = batch.schema();
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();

    if let Some(name) = correct_column {
        let idx = schema
            .index_of(name)
            .map_err(|_| IngestError::MissingColumn {
                table: table_name.clone(),
                column: name.to_string(),
            })?;

        if columns[idx].data_type() == &DataType::Utf8 {
            let sarr = columns[idx].as_string::<i32>();
            let mut changed = 0usize;
            let repaired: StringArray = sarr
                .iter()
                .map(|opt| {
                    opt.map(|v| {
                        let fixed = repair_double_encoding(v);
                        if fixed != v {
                            changed += 1;
                        }
                        fixed
                    })
                })
                .collect();
            debug!(table = %table_name, column = %name, changed, "repaired encoding");
            columns[idx] = Arc::new(repaired);
        } else {
            warn!(
                table = %table_name,
                column = %name,
                data_type = %columns[idx].data_type(),
                "correction column is not text, left as-is"
            );
        }
    }

    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| f.as_ref().clone().with_name(uppercase_name(f.name())))
        .collect();
    let upper = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));

    let batch = RecordBatch::try_new(upper, columns)?;
    Ok(Dataset::new(table_name, batch))
}

pub fn uppercase_name(name: &str) -> String {
    name.to_uppercase()
}
