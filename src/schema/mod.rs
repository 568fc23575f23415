// src/schema/mod.rs
pub mod arrow;
pub mod types;

use anyhow::Result;
use std::collections::HashSet;

use crate::error::IngestError;
use crate::process::Dataset;

pub use self::arrow::map_from_arrow_type;
pub use types::{Column, SqlType};

/// Explicit, validated column list of one destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Derive and validate the schema of `dataset`:
    /// - at least one column,
    /// - names non-empty, without `"` or control characters,
    /// - names unique ignoring case (DuckDB identifiers are case-insensitive),
    /// - every Arrow type maps to a supported `SqlType`.
    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        let table = dataset.table_name.clone();
        let invalid = |column: &str, reason: &'static str| IngestError::InvalidColumn {
            table: table.clone(),
            column: column.to_string(),
            reason,
        };

        let schema = dataset.batch.schema();
        if schema.fields().is_empty() {
            return Err(invalid("", "table has no columns").into());
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut columns = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            let name = field.name().as_str();
            if name.trim().is_empty() {
                return Err(invalid(name, "empty column name").into());
            }
            if name.contains('"') || name.chars().any(char::is_control) {
                return Err(
                    invalid(name, "column name contains a quote or control character").into(),
                );
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(invalid(name, "duplicate column name").into());
            }

            let ty = map_from_arrow_type(field.data_type()).ok_or_else(|| {
                IngestError::UnsupportedType {
                    table: table.clone(),
                    column: name.to_string(),
                    data_type: field.data_type().to_string(),
                }
            })?;
            columns.push(Column {
                name: name.to_string(),
                ty,
            });
        }

        Ok(Self { table, columns })
    }

    /// `CREATE TABLE "<schema>"."<table>" (...)` with the explicit column types.
    pub fn create_table_sql(&self, schema: &str) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.ty))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE {}.{} ({});",
            quote_ident(schema),
            quote_ident(&self.table),
            cols
        )
    }
}

/// Double-quote an identifier, doubling any embedded quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::parse_csv;
    use anyhow::Result;

    #[test]
    fn builds_explicit_ddl() -> Result<()> {
        let ds = parse_csv(
            "FACT_FALTAS",
            b"DESCR_MAT_FALT,QTD,PRECO,DAT_LIMITE,ATIVO\nx,1,2.5,2022-07-15,true\n".to_vec(),
        )?;
        let schema = TableSchema::from_dataset(&ds)?;
        assert_eq!(
            schema.create_table_sql("RAW"),
            "CREATE TABLE \"RAW\".\"FACT_FALTAS\" (\"DESCR_MAT_FALT\" VARCHAR, \"QTD\" BIGINT, \
             \"PRECO\" DOUBLE, \"DAT_LIMITE\" DATE, \"ATIVO\" BOOLEAN);"
        );
        Ok(())
    }

    #[test]
    fn rejects_case_insensitive_duplicates() -> Result<()> {
        let ds = parse_csv("T", b"qtd,QTD\n1,2\n".to_vec())?;
        let err = TableSchema::from_dataset(&ds).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::InvalidColumn { reason: "duplicate column name", .. })
        ));
        Ok(())
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("RAW"), "\"RAW\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
