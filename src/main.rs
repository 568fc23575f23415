use anyhow::Result;
use ingestao::{pipeline, Config};
use reqwest::Client;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let config = Config::discover()?;
    info!(
        database = %config.database.display(),
        schema = %config.schema,
        derived = config.derived.is_some(),
        "configured"
    );

    // ─── 3) ingest ───────────────────────────────────────────────────
    let client = Client::new();
    match pipeline::run(&config, &client).await {
        Ok(summary) => {
            for (table, rows) in &summary.tables {
                info!(table = %table, rows, "written");
            }
            info!(
                database = %summary.database.display(),
                tables = summary.tables.len(),
                "all done"
            );
            Ok(())
        }
        Err(e) => {
            error!("ingestion failed: {:#}", e);
            Err(e)
        }
    }
}
