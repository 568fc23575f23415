// src/derive/mod.rs
pub mod partition;
pub mod pivot;

use anyhow::Result;
use tracing::{info, instrument};

use crate::config::DerivedConfig;
use crate::process::Dataset;

pub use partition::{monthly_partitions, year_month};
pub use pivot::pivot_counts;

/// Twelve monthly partitions followed by the pivot table, all derived from
/// the (already normalized) faults dataset.
#[instrument(level = "info", skip(faults, cfg), fields(source = %faults.table_name))]
pub fn build_views(faults: &Dataset, cfg: &DerivedConfig) -> Result<Vec<Dataset>> {
    let mut views = monthly_partitions(faults, &cfg.date_column, &cfg.year, &cfg.partition_prefix)?;
    let in_year: usize = views.iter().map(Dataset::num_rows).sum();
    info!(year = %cfg.year, rows = in_year, "monthly partitions built");

    let pivot = pivot_counts(faults, &cfg.pivot_row, &cfg.pivot_column, &cfg.pivot_table)?;
    info!(
        table = %pivot.table_name,
        rows = pivot.num_rows(),
        columns = pivot.batch.num_columns(),
        "pivot built"
    );
    views.push(pivot);

    Ok(views)
}
