//! Streaming image downloads with progress reporting.
//!
//! Response bytes are piped chunk-by-chunk to the destination file; the whole
//! image is never buffered in memory. A failed write may leave a truncated
//! file behind -- callers must not assume atomicity.

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::{CatalogEntry, CatalogError};
use crate::logging::LogThrottle;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The request could not be sent, or the response body broke mid-stream.
    #[error("download failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("download failed with status {0}")]
    Status(reqwest::StatusCode),

    /// Local file creation or a chunk write failed.
    #[error("failed to write `{path}`: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Download an entry's image into `dest_dir`, overwriting any previous file
/// of the same name. Returns the path written.
pub async fn download(
    client: &Client,
    entry: &CatalogEntry,
    dest_dir: &Path,
) -> Result<PathBuf, DownloadError> {
    let file_name = entry.file_name()?;
    let dest = dest_dir.join(file_name);

    info!(name = %entry.name, url = %entry.url, "Starting download");

    let response = client.get(&entry.url).send().await?;
    if !response.status().is_success() {
        return Err(DownloadError::Status(response.status()));
    }

    // A missing Content-Length is not an error; the bar degrades to a spinner.
    let total = response.content_length();
    let bar = match total {
        Some(len) => byte_progress_bar(len),
        None => download_spinner(file_name),
    };

    let mut file = File::create(&dest).map_err(|e| DownloadError::Write {
        path: dest.display().to_string(),
        source: e,
    })?;

    let throttle = LogThrottle::new(Duration::from_secs(2));
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).map_err(|e| DownloadError::Write {
            path: dest.display().to_string(),
            source: e,
        })?;

        downloaded += chunk.len() as u64;
        bar.inc(chunk.len() as u64);

        if throttle.should_log() {
            debug!(
                bytes = downloaded,
                total = total.unwrap_or(0),
                "Download progress"
            );
        }
    }

    bar.finish_and_clear();
    info!(path = %dest.display(), bytes = downloaded, "Download complete");

    Ok(dest)
}

fn byte_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                 {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar
}

fn download_spinner(file_name: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(format!("Downloading {file_name}"));
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}
