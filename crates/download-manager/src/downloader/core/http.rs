//! HTTP transport
//!
//! The [`Transport`] trait is the seam between scheduling and the network:
//! one call performs one GET and reports a [`TransferOutcome`]. Timeouts and
//! cancellation are applied around it by the transfer worker, so transports
//! only deal with the request itself.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::error::error_chain;
use crate::downloader::core::{DownloadError, Result, TransferOutcome};

/// Progress callback handed to a transport: `(received, total)`
pub type ProgressFn<'a> = dyn FnMut(u64, Option<u64>) + Send + 'a;

/// Largest body we pre-allocate for from Content-Length alone
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Executes a single GET
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url`, calling `progress` as body bytes arrive
    ///
    /// Must resolve to `Success`, `HttpError` or `NetworkError`; the caller
    /// decides about timeouts and cancellation.
    async fn fetch(&self, url: &Url, progress: &mut ProgressFn<'_>) -> TransferOutcome;
}

/// Fixed header set mimicking a desktop Firefox navigation
///
/// Accept-Encoding is left to reqwest so that gzip and brotli bodies are
/// negotiated and decoded transparently.
pub fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
    headers.insert("Sec-Fetch-User", HeaderValue::from_static("?1"));
    headers
}

/// Build the shared client from configuration
pub fn build_client(config: &DownloadConfig) -> Result<Client> {
    if config.accept_invalid_certs {
        warn!("TLS certificate validation is DISABLED; downloads can be intercepted");
    }

    Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(browser_headers())
        .connect_timeout(config.request_timeout)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
        .map_err(|e| DownloadError::Configuration {
            message: format!("failed to create HTTP client: {}", error_chain(&e)),
            field: None,
        })
}

/// [`Transport`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        Ok(Self::new(build_client(config)?))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url, progress: &mut ProgressFn<'_>) -> TransferOutcome {
        debug!("GET {}", url);

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return TransferOutcome::NetworkError(error_chain(&e)),
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            return TransferOutcome::HttpError {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown Status").to_string(),
            };
        }

        let declared_len = response.content_length();
        debug!("Response {} for {}, content length {:?}", status, url, declared_len);

        let capacity = declared_len.unwrap_or(0).min(MAX_PREALLOCATION) as usize;
        let mut body = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        progress(0, declared_len);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    body.extend_from_slice(&chunk);
                    progress(body.len() as u64, declared_len);
                }
                Err(e) => return TransferOutcome::NetworkError(error_chain(&e)),
            }
        }

        TransferOutcome::Success { body, declared_len }
    }
}
