// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Full run configuration. Every field has a default, so an empty YAML
/// document (or no file at all) reproduces the local ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// DuckDB file; deleted and recreated on every run.
    pub database: PathBuf,
    /// Schema all tables are written under.
    pub schema: String,
    /// Prefix stripped from source file stems when naming tables.
    pub table_prefix: String,
    pub sources: Sources,
    /// Monthly partitions + pivot. Absent means raw tables only.
    pub derived: Option<DerivedConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Sources {
    /// Every `*.csv` in `data_dir`. `corrections` maps the derived table name
    /// to the column whose text gets its encoding repaired.
    Local {
        data_dir: PathBuf,
        #[serde(default)]
        corrections: BTreeMap<String, String>,
    },
    /// Explicit list of HTTP(S) locations, CSV or zip-wrapped CSV.
    Remote { urls: Vec<RemoteSource> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSource {
    pub url: String,
    #[serde(default)]
    pub correct_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedConfig {
    /// Table name of the dataset the views are built from.
    pub source_table: String,
    pub date_column: String,
    pub year: String,
    pub partition_prefix: String,
    pub pivot_row: String,
    pub pivot_column: String,
    pub pivot_table: String,
}

impl Default for Config {
    fn default() -> Self {
        let mut corrections = BTreeMap::new();
        corrections.insert(
            "FACT_TOP_MATERIAL".to_string(),
            "fTOP_DESCRICAO_ECODE".to_string(),
        );
        corrections.insert("FACT_FALTAS".to_string(), "DESCR_MAT_FALT".to_string());

        Self {
            database: PathBuf::from("../db/dev.duckdb"),
            schema: "RAW".to_string(),
            table_prefix: "Sample_".to_string(),
            sources: Sources::Local {
                data_dir: PathBuf::from("data"),
                corrections,
            },
            derived: Some(DerivedConfig::default()),
        }
    }
}

impl Default for DerivedConfig {
    fn default() -> Self {
        Self {
            source_table: "FACT_FALTAS".to_string(),
            date_column: "DAT_LIMITE".to_string(),
            year: "2022".to_string(),
            partition_prefix: "FALTAS_2022_".to_string(),
            pivot_row: "DESCR_MAT_FALT".to_string(),
            pivot_column: "CENTRO_FORNECEDOR".to_string(),
            pivot_table: "PIVOT_FALTAS_CENTRO".to_string(),
        }
    }
}

impl Config {
    /// Read and validate a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// `$INGESTAO_CONFIG`, else `./ingestao.yaml` when present, else defaults.
    pub fn discover() -> Result<Self> {
        if let Ok(path) = std::env::var("INGESTAO_CONFIG") {
            return Self::load(path);
        }
        let local = Path::new("ingestao.yaml");
        if local.exists() {
            return Self::load(local);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema.trim().is_empty() {
            bail!("config: schema must not be empty");
        }
        if let Sources::Remote { urls } = &self.sources {
            if urls.is_empty() {
                bail!("config: remote sources need at least one url");
            }
        }
        if let Some(d) = &self.derived {
            if d.year.chars().count() != 4 {
                bail!("config: derived.year must be 4 characters, got {:?}", d.year);
            }
            for (field, value) in [
                ("source_table", &d.source_table),
                ("date_column", &d.date_column),
                ("pivot_row", &d.pivot_row),
                ("pivot_column", &d.pivot_column),
                ("pivot_table", &d.pivot_table),
            ] {
                if value.trim().is_empty() {
                    bail!("config: derived.{} must not be empty", field);
                }
            }
        }
        Ok(())
    }
}
