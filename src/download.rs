//! Saving resolved images to disk.
//!
//! Pages are written as `<NNN>.<ext>` inside the output directory. A page
//! whose file already exists (under any known image extension) is skipped
//! without touching the network, and existing files are never overwritten.

use crate::error::{ResolveError, SaveError};
use crate::events::{DownloadEvent, EventSender};
use crate::http::{FetchRequest, Transport};
use reqwest::header::HeaderMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Image extensions recognised on disk and in URLs.
pub const KNOWN_EXTENSIONS: [&str; 4] = [".jpg", ".webp", ".png", ".jpeg"];

/// Zero-padded page filename, e.g. `007.webp`.
pub fn page_filename(index: usize, extension: &str) -> String {
    format!("{:03}{}", index, extension)
}

/// Existing file for page `index` under any of `extensions`.
pub fn existing_page<S: AsRef<str>>(dir: &Path, index: usize, extensions: &[S]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| dir.join(page_filename(index, ext.as_ref())))
        .find(|path| path.exists())
}

/// Extension to save `url` under: its own when recognised, else `.jpg`.
pub fn extension_for(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    KNOWN_EXTENSIONS
        .into_iter()
        .find(|ext| path.ends_with(ext))
        .unwrap_or(".jpg")
}

/// Creates the output directory (recursively).
pub async fn ensure_output_dir(dir: &Path) -> Result<(), ResolveError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ResolveError::DirectoryUnavailable {
            path: dir.to_path_buf(),
            source,
        })
}

/// Creates the output directory, reporting failure as an `error` event.
pub async fn prepare_output_dir(dir: &Path, events: &EventSender) -> bool {
    match ensure_output_dir(dir).await {
        Ok(()) => true,
        Err(e) => {
            events.emit(DownloadEvent::error(e.to_string()));
            false
        }
    }
}

/// Fetches one image and writes it to `path`, which must not exist yet.
pub async fn save_image(
    transport: &dyn Transport,
    request: &FetchRequest,
    path: &Path,
) -> Result<(), SaveError> {
    let body = transport.get(request).await?;

    let write_err = |source| SaveError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(write_err)?;

    // A partial file would be taken as a finished page on the next run
    if let Err(source) = write_body(&mut file, &body).await {
        drop(file);
        let _ = tokio::fs::remove_file(path).await;
        return Err(write_err(source));
    }
    Ok(())
}

/// Writes and flushes `body`. Errors from either step are returned.
async fn write_body<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> io::Result<()> {
    writer.write_all(body).await?;
    writer.flush().await
}

/// Downloads a known list of image URLs in order.
pub struct ImageDownloader<'a> {
    transport: &'a dyn Transport,
    headers: HeaderMap,
    timeout: Duration,
}

impl<'a> ImageDownloader<'a> {
    pub fn new(transport: &'a dyn Transport, headers: HeaderMap, timeout: Duration) -> Self {
        Self {
            transport,
            headers,
            timeout,
        }
    }

    /// Downloads every URL into `dir` (which must exist), emitting a
    /// `start` event, one event per image and a final `complete` event.
    ///
    /// Returns the number of newly saved images. Individual failures are
    /// reported and do not stop the loop.
    pub async fn download_all(&self, urls: &[String], dir: &Path, events: &EventSender) -> usize {
        let total = urls.len();
        events.emit(DownloadEvent::start(format!("Found {} images", total), total));

        let mut saved = 0;
        for (i, url) in urls.iter().enumerate() {
            if events.is_closed() {
                debug!("Event receiver dropped, stopping after {} images", i);
                break;
            }
            let index = i + 1;

            if existing_page(dir, index, &KNOWN_EXTENSIONS).is_some() {
                events.emit(DownloadEvent::skip(format!("Skipping existing {}", index), index));
                continue;
            }

            let path = dir.join(page_filename(index, extension_for(url)));
            let request = FetchRequest::new(url, self.headers.clone(), self.timeout);
            match save_image(self.transport, &request, &path).await {
                Ok(()) => {
                    saved += 1;
                    events.emit(DownloadEvent::progress(
                        format!("Downloaded image {}", index),
                        index,
                        &path,
                    ));
                }
                Err(e) => {
                    debug!("Image {} failed: {}", index, e);
                    events.emit(DownloadEvent::error(format!(
                        "Failed to download image {}",
                        index
                    )));
                }
            }
        }

        events.emit(DownloadEvent::complete(
            format!("Download complete. {}/{} images saved.", saved, total),
            saved,
            total,
        ));
        saved
    }
}
