// src/derive/partition.rs
use anyhow::{Context, Result};
use arrow::{array::BooleanArray, compute::filter_record_batch};
use tracing::debug;

use crate::process::{render_text, Dataset};

/// Year (chars 1-4) and month (chars 6-7) of a date string such as
/// `2022-07-15`. Short inputs give truncated or empty parts.
pub fn year_month(s: &str) -> (String, String) {
    let year: String = s.chars().take(4).collect();
    let month: String = s.chars().skip(5).take(2).collect();
    (year, month)
}

/// Split `dataset` into twelve month tables for `year`, named
/// `<prefix>01` .. `<prefix>12`.
///
/// Rows from other years, with a null date, or with a date too short to hold
/// a month land in no partition. Every month is returned, empty or not, and
/// rows keep their source order.
pub fn monthly_partitions(
    dataset: &Dataset,
    date_column: &str,
    year: &str,
    prefix: &str,
) -> Result<Vec<Dataset>> {
    let dates = render_text(dataset.column(date_column)?.as_ref())?;
    let months: Vec<Option<String>> = dates
        .iter()
        .map(|d| {
            d.as_deref().and_then(|d| {
                let (y, m) = year_month(d);
                (y == year).then_some(m)
            })
        })
        .collect();

    let mut partitions = Vec::with_capacity(12);
    for month in 1..=12 {
        let mm = format!("{:02}", month);
        let mask = BooleanArray::from(
            months
                .iter()
                .map(|m| m.as_deref() == Some(mm.as_str()))
                .collect::<Vec<bool>>(),
        );
        let batch = filter_record_batch(&dataset.batch, &mask)
            .with_context(|| format!("filtering {} for month {}", dataset.table_name, mm))?;
        let name = format!("{}{}", prefix, mm);
        debug!(table = %name, rows = batch.num_rows(), "partition");
        partitions.push(Dataset::new(name, batch));
    }

    Ok(partitions)
}
