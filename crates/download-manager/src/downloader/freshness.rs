//! Remote freshness checks
//!
//! Compares a server's `Last-Modified` header against the modification time
//! of a local copy, so callers can skip re-downloading files such as a
//! catalog that has not changed.

use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::header::LAST_MODIFIED;
use std::io;
use std::path::Path;
use tracing::debug;
use url::Url;

use crate::downloader::core::error::error_chain;
use crate::downloader::core::{DownloadError, FileOperation, Result};

/// How a local file relates to its remote source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No local copy exists
    Missing,
    /// The server copy is newer
    Stale,
    /// The local copy is at least as new as the server's
    UpToDate,
    /// The server did not send a usable `Last-Modified`
    Unknown,
}

impl Freshness {
    /// Only an up-to-date copy can be kept as is
    pub fn needs_download(self) -> bool {
        !matches!(self, Freshness::UpToDate)
    }
}

/// Issue a HEAD request for `url` and compare against `local_path`
///
/// A missing local file short-circuits to [`Freshness::Missing`] without
/// touching the network.
pub async fn check_freshness(client: &Client, url: &Url, local_path: &Path) -> Result<Freshness> {
    let local_modified = match tokio::fs::metadata(local_path).await {
        Ok(metadata) => metadata
            .modified()
            .map_err(|e| DownloadError::file_system(local_path, FileOperation::Metadata, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} does not exist locally", local_path.display());
            return Ok(Freshness::Missing);
        }
        Err(e) => return Err(DownloadError::file_system(local_path, FileOperation::Metadata, e)),
    };

    let response = client
        .head(url.clone())
        .send()
        .await
        .map_err(|e| DownloadError::Network {
            url: url.to_string(),
            reason: error_chain(&e),
        })?;

    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(DownloadError::Http {
            url: url.to_string(),
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
        });
    }

    let Some(remote_modified) = response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
    else {
        debug!("No usable Last-Modified for {}", url);
        return Ok(Freshness::Unknown);
    };

    let local_modified = DateTime::<Utc>::from(local_modified);
    let remote_modified = remote_modified.with_timezone(&Utc);
    debug!(
        "{}: remote modified {}, local modified {}",
        url, remote_modified, local_modified
    );

    if remote_modified > local_modified {
        Ok(Freshness::Stale)
    } else {
        Ok(Freshness::UpToDate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with(template: ResponseTemplate, expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/master.json"))
            .respond_with(template)
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    fn catalog_url(server: &MockServer) -> Url {
        Url::parse(&format!("{}/master.json", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_missing_local_file_skips_request() {
        let server = server_with(ResponseTemplate::new(200), 0).await;
        let dir = tempdir().unwrap();

        let freshness = check_freshness(&Client::new(), &catalog_url(&server), &dir.path().join("master.json"))
            .await
            .unwrap();

        assert_eq!(freshness, Freshness::Missing);
        assert!(freshness.needs_download());
    }

    #[tokio::test]
    async fn test_newer_remote_is_stale() {
        let template = ResponseTemplate::new(200).insert_header("Last-Modified", "Fri, 01 Jan 2100 00:00:00 GMT");
        let server = server_with(template, 1).await;
        let dir = tempdir().unwrap();
        let local = dir.path().join("master.json");
        std::fs::write(&local, b"{}").unwrap();

        let freshness = check_freshness(&Client::new(), &catalog_url(&server), &local).await.unwrap();

        assert_eq!(freshness, Freshness::Stale);
    }

    #[tokio::test]
    async fn test_older_remote_is_up_to_date() {
        let template = ResponseTemplate::new(200).insert_header("Last-Modified", "Mon, 01 Jan 2001 00:00:00 GMT");
        let server = server_with(template, 1).await;
        let dir = tempdir().unwrap();
        let local = dir.path().join("master.json");
        std::fs::write(&local, b"{}").unwrap();

        let freshness = check_freshness(&Client::new(), &catalog_url(&server), &local).await.unwrap();

        assert_eq!(freshness, Freshness::UpToDate);
        assert!(!freshness.needs_download());
    }

    #[tokio::test]
    async fn test_missing_or_garbled_header_is_unknown() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("master.json");
        std::fs::write(&local, b"{}").unwrap();

        for template in [
            ResponseTemplate::new(200),
            ResponseTemplate::new(200).insert_header("Last-Modified", "yesterday-ish"),
        ] {
            let server = server_with(template, 1).await;
            let freshness = check_freshness(&Client::new(), &catalog_url(&server), &local).await.unwrap();
            assert_eq!(freshness, Freshness::Unknown);
        }
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = server_with(ResponseTemplate::new(503), 1).await;
        let dir = tempdir().unwrap();
        let local = dir.path().join("master.json");
        std::fs::write(&local, b"{}").unwrap();

        let error = check_freshness(&Client::new(), &catalog_url(&server), &local).await.unwrap_err();

        assert!(matches!(error, DownloadError::Http { status: 503, .. }));
    }
}
