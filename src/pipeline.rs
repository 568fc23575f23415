// src/pipeline.rs
use anyhow::Result;
use reqwest::Client;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

use crate::config::Config;
use crate::derive;
use crate::duck::Warehouse;
use crate::error::IngestError;
use crate::process::Dataset;
use crate::schema::TableSchema;
use crate::source;

/// What a run left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub database: PathBuf,
    /// `(table, rows)` in the order the tables were written.
    pub tables: Vec<(String, usize)>,
}

/// Resolve every source, build the derived views, then write everything into
/// a fresh database.
///
/// Nothing touches the database file until every dataset is in memory, so a
/// missing input, a fetch failure, a clashing table name or a column list
/// the loader would reject aborts with the previous file intact. Once writing
/// starts, the first failure aborts and leaves whatever was already written.
#[instrument(level = "info", skip(config, client), fields(database = %config.database.display()))]
pub async fn run(config: &Config, client: &Client) -> Result<RunSummary> {
    // 1) what to ingest
    let sources = source::plan(&config.sources, &config.table_prefix)?;
    ensure_unique(&config.schema, sources.iter().map(|s| s.table_name.as_str()))?;

    // 2) fetch + normalize, one source at a time
    let mut datasets = Vec::with_capacity(sources.len());
    for s in &sources {
        datasets.push(source::resolve(client, s).await?);
    }

    // 3) derived views from the faults dataset
    if let Some(cfg) = &config.derived {
        let faults = datasets
            .iter()
            .find(|d| d.table_name.eq_ignore_ascii_case(&cfg.source_table))
            .ok_or_else(|| IngestError::UnknownTable(cfg.source_table.clone()))?;
        let views = derive::build_views(faults, cfg)?;
        datasets.extend(views);
    }
    ensure_unique(&config.schema, datasets.iter().map(|d| d.table_name.as_str()))?;
    for ds in &datasets {
        TableSchema::from_dataset(ds)?;
    }

    // 4) write, off the async runtime
    let database = config.database.clone();
    let schema = config.schema.clone();
    let tables = tokio::task::spawn_blocking({
        let database = database.clone();
        move || write_all(&database, &schema, &datasets)
    })
    .await??;

    info!(tables = tables.len(), "run complete");
    Ok(RunSummary { database, tables })
}

/// Create the warehouse at `path` and load `datasets` in order.
pub fn write_all(path: &Path, schema: &str, datasets: &[Dataset]) -> Result<Vec<(String, usize)>> {
    let warehouse = Warehouse::create(path, schema)?;
    let mut written = Vec::with_capacity(datasets.len());
    for ds in datasets {
        let rows = warehouse.load(ds)?;
        written.push((ds.table_name.clone(), rows));
    }
    warehouse.close()?;
    Ok(written)
}

/// Table names are compared ignoring case, the way DuckDB resolves them.
fn ensure_unique<'a>(schema: &str, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.to_lowercase()) {
            return Err(IngestError::DuplicateTable {
                schema: schema.to_string(),
                table: name.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DerivedConfig, Sources};
    use anyhow::Result;
    use duckdb::Connection;
    use std::{collections::BTreeMap, fs};
    use tempfile::{tempdir, TempDir};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,ingestao=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    const TOP_MATERIAL: &str = "fTOP_DESCRICAO_ECODE,Qtd\n\
                                ManutenÃ§Ã£o preventiva,10\n\
                                Parafuso,4\n";

    const FALTAS: &str = "DESCR_MAT_FALT,CENTRO_FORNECEDOR,DAT_LIMITE\n\
                          Porca,C1,2022-07-15\n\
                          Porca,C2,2022-07-20\n\
                          ConexÃ£o,C1,2022-07-01\n\
                          Porca,C1,2021-07-15\n";

    fn fixture() -> Result<(TempDir, Config)> {
        let dir = tempdir()?;
        let data = dir.path().join("data");
        fs::create_dir_all(&data)?;
        fs::write(data.join("Sample_Fact_Top_Material.csv"), TOP_MATERIAL)?;
        fs::write(data.join("Sample_Fact_Faltas.csv"), FALTAS)?;

        let mut corrections = BTreeMap::new();
        corrections.insert(
            "FACT_TOP_MATERIAL".to_string(),
            "fTOP_DESCRICAO_ECODE".to_string(),
        );
        corrections.insert("FACT_FALTAS".to_string(), "DESCR_MAT_FALT".to_string());

        let config = Config {
            database: dir.path().join("db").join("dev.duckdb"),
            sources: Sources::Local {
                data_dir: data,
                corrections,
            },
            derived: Some(DerivedConfig::default()),
            ..Config::default()
        };
        Ok((dir, config))
    }

    #[tokio::test]
    async fn end_to_end_local_run() -> Result<()> {
        init_test_logging();
        let (_dir, config) = fixture()?;
        fs::create_dir_all(config.database.parent().unwrap())?;
        fs::write(&config.database, b"stale contents")?;

        let summary = run(&config, &Client::new()).await?;
        assert_eq!(summary.tables.len(), 2 + 12 + 1);
        assert_eq!(summary.tables[0], ("FACT_FALTAS".to_string(), 4));
        assert_eq!(summary.tables[1], ("FACT_TOP_MATERIAL".to_string(), 2));

        let non_empty: Vec<_> = summary
            .tables
            .iter()
            .filter(|(t, rows)| t.starts_with("FALTAS_2022_") && *rows > 0)
            .collect();
        assert_eq!(non_empty, vec![&("FALTAS_2022_07".to_string(), 3)]);

        let conn = Connection::open(&config.database)?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'RAW';",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(n, 15);

        let fixed: String = conn.query_row(
            "SELECT FTOP_DESCRICAO_ECODE FROM RAW.FACT_TOP_MATERIAL WHERE QTD = 10;",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(fixed, "Manutenção preventiva");

        let (c1, c2): (i64, i64) = conn.query_row(
            "SELECT C1, C2 FROM RAW.PIVOT_FALTAS_CENTRO WHERE DESCR_MAT_FALT = 'Porca';",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        assert_eq!((c1, c2), (2, 1));
        let (c1, c2): (i64, i64) = conn.query_row(
            "SELECT C1, C2 FROM RAW.PIVOT_FALTAS_CENTRO WHERE DESCR_MAT_FALT = 'Conexão';",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        assert_eq!((c1, c2), (1, 0));
        Ok(())
    }

    #[tokio::test]
    async fn raw_only_run_without_derived_section() -> Result<()> {
        let (_dir, mut config) = fixture()?;
        config.derived = None;

        let summary = run(&config, &Client::new()).await?;
        let names: Vec<_> = summary.tables.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(names, vec!["FACT_FALTAS", "FACT_TOP_MATERIAL"]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_input_aborts_before_any_write() -> Result<()> {
        let (dir, mut config) = fixture()?;
        fs::create_dir_all(config.database.parent().unwrap())?;
        fs::write(&config.database, b"previous run")?;
        config.sources = Sources::Local {
            data_dir: dir.path().join("absent"),
            corrections: BTreeMap::new(),
        };

        let err = run(&config, &Client::new()).await.unwrap_err();
        assert!(err
            .downcast_ref::<IngestError>()
            .map(IngestError::is_not_found)
            .unwrap_or(false));
        assert_eq!(fs::read(&config.database)?, b"previous run");
        Ok(())
    }

    #[tokio::test]
    async fn colliding_table_names_are_rejected() -> Result<()> {
        let (_dir, config) = fixture()?;
        if let Sources::Local { data_dir, .. } = &config.sources {
            // strips to the same name as Sample_Fact_Faltas.csv
            fs::write(data_dir.join("fact_faltas.csv"), "A\n1\n")?;
        }

        let err = run(&config, &Client::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::DuplicateTable { .. })
        ));
        assert!(!config.database.exists());
        Ok(())
    }

    #[tokio::test]
    async fn clashing_column_names_leave_previous_file_intact() -> Result<()> {
        let (_dir, config) = fixture()?;
        fs::create_dir_all(config.database.parent().unwrap())?;
        fs::write(&config.database, b"previous run")?;
        if let Sources::Local { data_dir, .. } = &config.sources {
            // same name once uppercased
            fs::write(data_dir.join("Sample_B.csv"), "qtd,QTD\n1,2\n")?;
        }

        let err = run(&config, &Client::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::InvalidColumn { .. })
        ));
        assert_eq!(fs::read(&config.database)?, b"previous run");
        Ok(())
    }

    #[tokio::test]
    async fn quoted_pivot_label_leaves_previous_file_intact() -> Result<()> {
        let (_dir, config) = fixture()?;
        fs::create_dir_all(config.database.parent().unwrap())?;
        fs::write(&config.database, b"previous run")?;
        if let Sources::Local { data_dir, .. } = &config.sources {
            fs::write(
                data_dir.join("Sample_Fact_Faltas.csv"),
                "DESCR_MAT_FALT,CENTRO_FORNECEDOR,DAT_LIMITE\nPorca,\"C\"\"1\",2022-07-15\n",
            )?;
        }

        let err = run(&config, &Client::new()).await.unwrap_err();
        match err.downcast_ref::<IngestError>() {
            Some(IngestError::InvalidColumn { table, column, .. }) => {
                assert_eq!(table, "PIVOT_FALTAS_CENTRO");
                assert_eq!(column, "C\"1");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(fs::read(&config.database)?, b"previous run");
        Ok(())
    }

    #[tokio::test]
    async fn unknown_faults_table_is_reported() -> Result<()> {
        let (_dir, mut config) = fixture()?;
        if let Some(d) = config.derived.as_mut() {
            d.source_table = "FACT_MISSING".into();
        }
        let err = run(&config, &Client::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::UnknownTable(_))
        ));
        Ok(())
    }
}
