// src/source/mod.rs
use anyhow::{Context, Result};
use glob::{glob_with, MatchOptions, Pattern};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::Sources;
use crate::error::IngestError;
use crate::fetch;
use crate::process::{self, encoding, Dataset};

static NON_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("identifier regex should be valid"));

/// Where a dataset comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Local(PathBuf),
    Remote(Url),
}

impl Location {
    /// `http(s)://` strings are remote, everything else is a local path.
    pub fn parse(s: &str) -> Self {
        match Url::parse(s) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Location::Remote(url),
            _ => Location::Local(PathBuf::from(s)),
        }
    }

    pub fn file_name(&self) -> Option<String> {
        match self {
            Location::Local(p) => p.file_name().map(|n| n.to_string_lossy().to_string()),
            Location::Remote(u) => fetch::file_name(u),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(p) => write!(f, "{}", p.display()),
            Location::Remote(u) => write!(f, "{}", u),
        }
    }
}

/// One dataset to ingest: its location, destination table and the column
/// whose text encoding gets repaired.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub location: Location,
    pub table_name: String,
    pub correct_column: Option<String>,
}

/// Table name for a source file: drop `.zip` and `.csv` extensions, strip
/// `prefix`, replace anything outside `[A-Za-z0-9_]` with `_`, uppercase.
///
/// `Sample_Fact_Top_Material.csv` → `FACT_TOP_MATERIAL`
pub fn table_name(file_name: &str, prefix: &str) -> String {
    let mut stem = file_name;
    for ext in [".zip", ".csv"] {
        if stem.len() > ext.len() && stem.to_ascii_lowercase().ends_with(ext) {
            stem = &stem[..stem.len() - ext.len()];
        }
    }
    let stem = if prefix.is_empty() {
        stem
    } else {
        stem.strip_prefix(prefix).unwrap_or(stem)
    };
    NON_IDENT.replace_all(stem, "_").to_uppercase()
}

/// All `*.csv` files (any case) directly inside `data_dir`, sorted by name.
pub fn discover_local<P: AsRef<Path>>(data_dir: P) -> Result<Vec<PathBuf>> {
    let data_dir = data_dir.as_ref();
    if !data_dir.is_dir() {
        return Err(IngestError::MissingDataDir(data_dir.to_path_buf()).into());
    }

    let pattern = format!(
        "{}/*.csv",
        Pattern::escape(&data_dir.to_string_lossy())
    );
    let options = MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };
    let mut files: Vec<PathBuf> = glob_with(&pattern, options)
        .with_context(|| format!("listing {}", data_dir.display()))?
        .filter_map(|entry| match entry {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(IngestError::NoCsvFiles(data_dir.to_path_buf()).into());
    }
    Ok(files)
}

/// Turn the configured sources into the concrete list of datasets to ingest.
pub fn plan(sources: &Sources, prefix: &str) -> Result<Vec<Source>> {
    let planned = match sources {
        Sources::Local {
            data_dir,
            corrections,
        } => {
            let files = discover_local(data_dir)?;
            info!(count = files.len(), "CSV files found");
            files
                .into_iter()
                .map(|path| {
                    let location = Location::Local(path);
                    let table = table_name(&location.file_name().unwrap_or_default(), prefix);
                    let correct_column = corrections
                        .iter()
                        .find(|(t, _)| t.eq_ignore_ascii_case(&table))
                        .map(|(_, c)| c.clone());
                    info!(file = %location, table = %table, "discovered");
                    Source {
                        location,
                        table_name: table,
                        correct_column,
                    }
                })
                .collect()
        }
        Sources::Remote { urls } => urls
            .iter()
            .map(|remote| {
                let location = Location::parse(&remote.url);
                let file = location
                    .file_name()
                    .with_context(|| format!("no file name in source {}", remote.url))?;
                Ok(Source {
                    table_name: table_name(&file, prefix),
                    location,
                    correct_column: remote.correct_column.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?,
    };
    Ok(planned)
}

/// Read a local file into memory; a missing file is `SourceNotFound`.
pub fn read_local(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            IngestError::SourceNotFound(path.to_path_buf()).into()
        } else {
            anyhow::Error::new(e).context(format!("reading {}", path.display()))
        }
    })
}

/// Fetch, parse and normalize one source.
#[instrument(level = "info", skip(client, source), fields(source = %source.location))]
pub async fn resolve(client: &Client, source: &Source) -> Result<Dataset> {
    let name = source.location.to_string();
    let bytes = match &source.location {
        Location::Local(path) => read_local(path)?,
        Location::Remote(url) => fetch::download(client, url).await?,
    };

    let csv = process::unwrap_archive(&name, bytes)?;
    let raw = process::parse_csv(&source.table_name, csv)?;
    if source.correct_column.is_none() {
        warn!(table = %source.table_name, "no correction column configured");
    }
    let dataset = encoding::normalize(raw, source.correct_column.as_deref())?;
    info!(
        table = %dataset.table_name,
        rows = dataset.num_rows(),
        columns = dataset.batch.num_columns(),
        "resolved"
    );
    Ok(dataset)
}
