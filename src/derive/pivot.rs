// src/derive/pivot.rs
use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};
use tracing::debug;

use crate::error::IngestError;
use crate::process::{render_text, Dataset};

/// Count co-occurrences of (`row_column`, `col_column`) and reshape them into
/// a matrix: one row per distinct `row_column` value, one BIGINT column per
/// distinct `col_column` value, both sorted; missing pairs are 0.
///
/// The first output column holds the row labels and is named `row_column`.
/// Rows where either label is null are not counted.
///
/// Column labels become column names, so a label that equals the row-label
/// column or another label ignoring case is rejected with
/// `IngestError::PivotLabelCollision`.
pub fn pivot_counts(
    dataset: &Dataset,
    row_column: &str,
    col_column: &str,
    table_name: &str,
) -> Result<Dataset> {
    let row_values = render_text(dataset.column(row_column)?.as_ref())?;
    let col_values = render_text(dataset.column(col_column)?.as_ref())?;

    // 1) group + count
    let mut counts: HashMap<(String, String), i64> = HashMap::new();
    let mut row_labels = BTreeSet::new();
    let mut col_labels = BTreeSet::new();
    for (r, c) in row_values.into_iter().zip(col_values) {
        if let (Some(r), Some(c)) = (r, c) {
            row_labels.insert(r.clone());
            col_labels.insert(c.clone());
            *counts.entry((r, c)).or_insert(0) += 1;
        }
    }

    check_labels(row_column, &col_labels)?;

    // 2) reshape
    let mut fields = Vec::with_capacity(col_labels.len() + 1);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(col_labels.len() + 1);
    fields.push(Field::new(row_column, DataType::Utf8, false));
    columns.push(Arc::new(StringArray::from_iter_values(row_labels.iter())));

    for c in &col_labels {
        let cells: Int64Array = row_labels
            .iter()
            .map(|r| counts.get(&(r.clone(), c.clone())).copied().unwrap_or(0))
            .collect::<Vec<i64>>()
            .into();
        fields.push(Field::new(c, DataType::Int64, false));
        columns.push(Arc::new(cells));
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .with_context(|| format!("building pivot {}", table_name))?;
    debug!(
        table = %table_name,
        rows = row_labels.len(),
        columns = col_labels.len(),
        "pivot"
    );
    Ok(Dataset::new(table_name, batch))
}

fn check_labels(row_column: &str, col_labels: &BTreeSet<String>) -> Result<()> {
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    seen.insert(row_column.to_lowercase(), row_column);
    for label in col_labels {
        if let Some(other) = seen.get(&label.to_lowercase()) {
            return Err(IngestError::PivotLabelCollision {
                label: label.clone(),
                other: other.to_string(),
            }
            .into());
        }
        seen.insert(label.to_lowercase(), label);
    }
    Ok(())
}
