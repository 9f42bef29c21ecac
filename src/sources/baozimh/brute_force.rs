//! Sequential image guessing against the CDN.
//!
//! When no page lists the images, they can still be reached directly:
//! pages live at `<cdn>/<comicId>/0/<chapterId>/<index><ext>`. Indices are
//! tried in order and each found image is saved immediately. A long run of
//! misses is taken to mean the chapter has ended.

use crate::config::{BaozimhConfig, BruteForceConfig};
use crate::download::{existing_page, page_filename, prepare_output_dir, save_image};
use crate::events::{DownloadEvent, EventSender};
use crate::http::{FetchRequest, Transport, browser_headers};
use std::path::Path;
use tracing::debug;

/// Inclusive range of page indices to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of indices in the range.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl From<&BruteForceConfig> for PageRange {
    fn from(config: &BruteForceConfig) -> Self {
        Self::new(config.start_index, config.end_index)
    }
}

/// Builds the CDN URL for one candidate page.
pub fn candidate_url(
    cdn_base: &str,
    comic_id: &str,
    chapter_id: &str,
    index: u32,
    extension: &str,
) -> String {
    format!(
        "{}/{}/0/{}/{}{}",
        cdn_base.trim_end_matches('/'),
        comic_id,
        chapter_id,
        index,
        extension
    )
}

/// Guesses and downloads a chapter's images straight from the CDN.
pub struct BruteForceResolver<'a> {
    transport: &'a dyn Transport,
    site: &'a BaozimhConfig,
    settings: &'a BruteForceConfig,
}

impl<'a> BruteForceResolver<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        site: &'a BaozimhConfig,
        settings: &'a BruteForceConfig,
    ) -> Self {
        Self {
            transport,
            site,
            settings,
        }
    }

    /// Runs the guessing loop over `range`, saving into `dir`.
    ///
    /// Always ends with a `complete` event carrying the number of newly
    /// saved images, including when stopped by the failure streak. The only
    /// exception is an unusable output directory, which ends with `error`.
    pub async fn resolve(
        &self,
        comic_id: &str,
        chapter_id: &str,
        dir: &Path,
        range: PageRange,
        events: &EventSender,
    ) -> usize {
        if !prepare_output_dir(dir, events).await {
            return 0;
        }

        events.emit(DownloadEvent::start(
            format!("Brute-forcing images for chapter {}", chapter_id),
            range.len(),
        ));

        let headers = browser_headers(&self.site.base_url);
        let max_failures = self.settings.max_consecutive_failures;
        let mut saved = 0;
        let mut consecutive_failures = 0;

        for index in range.start..=range.end {
            if consecutive_failures >= max_failures {
                events.emit(DownloadEvent::message(format!(
                    "Stopping after {} consecutive failures.",
                    max_failures
                )));
                break;
            }
            if events.is_closed() {
                debug!("Event receiver dropped, stopping at index {}", index);
                break;
            }
            let page = index as usize;

            if existing_page(dir, page, &self.settings.extensions).is_some() {
                consecutive_failures = 0;
                events.emit(DownloadEvent::skip(format!("Skipping existing {}", index), page));
                continue;
            }

            let mut found = false;
            for extension in &self.settings.extensions {
                let url = candidate_url(
                    &self.site.brute_force_cdn,
                    comic_id,
                    chapter_id,
                    index,
                    extension,
                );
                let path = dir.join(page_filename(page, extension));
                let request = FetchRequest::new(&url, headers.clone(), self.site.image_timeout());

                match save_image(self.transport, &request, &path).await {
                    Ok(()) => {
                        saved += 1;
                        consecutive_failures = 0;
                        found = true;
                        events.emit(DownloadEvent::progress(
                            format!("Downloaded image {}", index),
                            page,
                            &path,
                        ));
                        break;
                    }
                    Err(e) => debug!("No page at {}: {}", url, e),
                }
            }

            if !found {
                consecutive_failures += 1;
            }
        }

        events.emit(DownloadEvent::complete(
            format!("Brute-force download complete. {} images saved.", saved),
            saved,
            saved,
        ));
        saved
    }
}
