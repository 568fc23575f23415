// src/fetch/mod.rs
use anyhow::Result;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::error::IngestError;

/// Download `url` into memory. Transport errors and non-2xx statuses both
/// come back as `IngestError::Fetch`; there is no retry.
pub async fn download(client: &Client, url: &Url) -> Result<Vec<u8>> {
    let fetch_err = |source: reqwest::Error| IngestError::Fetch {
        url: url.to_string(),
        source,
    };

    debug!(url = %url, "GET");
    let resp = client
        .get(url.as_str())
        .send()
        .await
        .map_err(fetch_err)?
        .error_for_status()
        .map_err(fetch_err)?;
    let bytes = resp.bytes().await.map_err(fetch_err)?;
    info!(url = %url, bytes = bytes.len(), "downloaded");

    Ok(bytes.to_vec())
}

/// Last non-empty path segment of `url`, i.e. the remote file name.
pub fn file_name(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn file_name_is_last_segment() -> Result<()> {
        let url = Url::parse("https://example.org/dados/Sample_Fact_Faltas.csv.zip?raw=1")?;
        assert_eq!(file_name(&url).as_deref(), Some("Sample_Fact_Faltas.csv.zip"));

        let trailing = Url::parse("https://example.org/dados/Sample_Fact_Faltas.csv/")?;
        assert_eq!(file_name(&trailing).as_deref(), Some("Sample_Fact_Faltas.csv"));

        let root = Url::parse("https://example.org/")?;
        assert_eq!(file_name(&root), None);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_host_is_a_fetch_error() -> Result<()> {
        // grab a free port, then close it so the connection is refused
        let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
        let url = Url::parse(&format!("http://127.0.0.1:{}/Sample_Fact_Faltas.csv", port))?;
        let err = download(&Client::new(), &url).await.unwrap_err();
        let ingest = err.downcast_ref::<IngestError>().expect("typed error");
        assert!(matches!(ingest, IngestError::Fetch { .. }));
        assert!(ingest.is_not_found());
        Ok(())
    }
}
