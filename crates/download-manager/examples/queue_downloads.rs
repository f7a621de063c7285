//! Example: queue a handful of files and watch them complete
//!
//! Run this example with:
//! ```
//! cargo run --example queue_downloads -- https://example.com/a.zip https://example.com/b.zip
//! ```
//!
//! Files land in a temporary directory named from each URL's last path
//! segment. With no arguments a couple of public test URLs are used.

use anyhow::Context;
use download_manager::logging::{self, LevelFilter};
use download_manager::{DownloadConfigBuilder, DownloadEvent, DownloadManager};
use std::time::Duration;
use tempfile::tempdir;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(None, LevelFilter::INFO)?;

    let dir = tempdir().context("creating download directory")?;
    println!("Download directory: {}", dir.path().display());

    let config = DownloadConfigBuilder::new()
        .max_concurrent(2)
        .request_timeout(Duration::from_secs(30))
        .default_destination_dir(dir.path())
        .build()?;
    let (manager, mut events) = DownloadManager::with_channel(config)?;

    let mut urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        urls = vec![
            "https://httpbin.org/bytes/4096".to_string(),
            "https://httpbin.org/status/404".to_string(),
        ];
    }

    let mut queued = 0;
    for url in &urls {
        // Empty destination: derived from the URL under the default directory
        match manager.add_download(url, "") {
            Ok(()) => queued += 1,
            Err(e) => eprintln!("Skipping {url}: {e}"),
        }
    }

    if queued > 0 {
        while let Some(event) = events.recv().await {
            match event {
                DownloadEvent::Progress { path, received, total: Some(total) } if total > 0 => {
                    println!("{:>6.1}%  {}", received as f64 * 100.0 / total as f64, path.display());
                }
                DownloadEvent::Progress { .. } => {}
                DownloadEvent::Finished { path } => println!("done    {}", path.display()),
                DownloadEvent::Failed { path, reason } => println!("failed  {}: {}", path.display(), reason),
                DownloadEvent::AllDrained => break,
            }
        }
    }

    let metrics = manager.metrics();
    println!(
        "{} completed, {} failed, {} retries, {} bytes written",
        metrics.completed, metrics.failed, metrics.retries, metrics.bytes_written
    );

    manager.shutdown().await;
    Ok(())
}
