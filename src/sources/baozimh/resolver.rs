//! Chapter resolution: finds a chapter's real page images and downloads them.
//!
//! The public chapter page often serves a handful of placeholder images
//! for gated chapters, so resolution falls back through progressively
//! blunter strategies:
//!
//! | state                | outcome                                   | next                 |
//! |----------------------|-------------------------------------------|----------------------|
//! | `PrimaryScrape`      | more than `threshold` images              | `Done`               |
//! | `PrimaryScrape`      | empty or at most `threshold` images       | `AppEndpointAttempt` |
//! | `AppEndpointAttempt` | comic id + slot known, images returned    | `Done`               |
//! | `AppEndpointAttempt` | unresolved identity, or no images         | chapter id lookup    |
//! | chapter id lookup    | comic id + chapter id known               | `BruteForceAttempt`  |
//! | chapter id lookup    | either id missing                         | `Failed`             |
//! | `BruteForceAttempt`  | guessing loop finished                    | (terminal)           |
//! | `Done`               | image list downloaded                     | (terminal)           |
//! | `Failed`             | `error` event emitted                     | (terminal)           |

use super::app_endpoint::resolve_via_app_endpoint;
use super::brute_force::{BruteForceResolver, PageRange};
use super::identity::extract_identity;
use super::parser;
use crate::config::{BaozimhConfig, BruteForceConfig};
use crate::download::{ImageDownloader, prepare_output_dir};
use crate::error::{FetchFailed, ParseFailure, ResolveError};
use crate::events::{DownloadEvent, EventSender};
use crate::http::{FetchRequest, Transport, browser_headers};
use crate::models::ImageCandidateList;
use scraper::Html;
use std::path::Path;
use tracing::{debug, info};

/// Images from a scraping stage, with the placeholder verdict attached.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scraped {
    images: Vec<String>,
    placeholder: bool,
}

impl Scraped {
    fn classify(images: Vec<String>, threshold: usize) -> Self {
        let placeholder = images.len() <= threshold;
        Self {
            images,
            placeholder,
        }
    }

    fn needs_fallback(&self) -> bool {
        self.images.is_empty() || self.placeholder
    }
}

/// Resolution states.
#[derive(Debug)]
enum State {
    PrimaryScrape,
    AppEndpointAttempt(Scraped),
    BruteForceAttempt {
        comic_id: String,
        chapter_id: String,
    },
    Done(Vec<String>),
    Failed(ResolveError),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::PrimaryScrape => "PrimaryScrape",
            State::AppEndpointAttempt(_) => "AppEndpointAttempt",
            State::BruteForceAttempt { .. } => "BruteForceAttempt",
            State::Done(_) => "Done",
            State::Failed(_) => "Failed",
        }
    }
}

/// Transition out of `PrimaryScrape`.
fn after_primary(scraped: Scraped) -> State {
    if scraped.needs_fallback() {
        State::AppEndpointAttempt(scraped)
    } else {
        State::Done(scraped.images)
    }
}

/// How a chapter download ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// A resolved image list was downloaded.
    Downloaded { saved: usize, total: usize },
    /// Images were guessed from the CDN.
    BruteForced { saved: usize },
    /// No image source could be resolved, or the directory was unusable.
    Failed,
}

/// Parses chapter images out of a public chapter page body.
pub fn scrape_chapter_images(body: &str, default_cdn: &str) -> Result<Vec<String>, ParseFailure> {
    let doc = Html::parse_document(body);
    let images = parser::extract_chapter_images(&doc)?;
    let absolute: ImageCandidateList = images
        .iter()
        .map(|src| parser::absolutize_image_url(src, default_cdn))
        .collect();
    Ok(absolute.into_vec())
}

/// Runs the fallback chain for one chapter.
pub struct ChapterResolver<'a> {
    transport: &'a dyn Transport,
    site: &'a BaozimhConfig,
    brute_force: &'a BruteForceConfig,
}

impl<'a> ChapterResolver<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        site: &'a BaozimhConfig,
        brute_force: &'a BruteForceConfig,
    ) -> Self {
        Self {
            transport,
            site,
            brute_force,
        }
    }

    async fn fetch_page(&self, url: &str) -> Result<String, FetchFailed> {
        let request = FetchRequest::new(
            url,
            browser_headers(&self.site.base_url),
            self.site.page_timeout(),
        );
        self.transport.get_text(&request).await
    }

    /// Resolves and downloads `chapter_url` into `dir`.
    ///
    /// Progress, fallback decisions and failures are reported through
    /// `events`. A directory that cannot be created aborts before any
    /// network activity.
    pub async fn download_chapter(
        &self,
        chapter_url: &str,
        dir: &Path,
        events: &EventSender,
    ) -> ResolutionOutcome {
        if !prepare_output_dir(dir, events).await {
            return ResolutionOutcome::Failed;
        }

        let mut page_body: Option<String> = None;
        let mut state = State::PrimaryScrape;

        loop {
            debug!("Chapter {} in state {}", chapter_url, state.name());
            state = match state {
                State::PrimaryScrape => {
                    let scraped = self.primary_scrape(chapter_url, &mut page_body).await;
                    after_primary(scraped)
                }
                State::AppEndpointAttempt(scraped) => {
                    events.emit(DownloadEvent::message(format!(
                        "Standard scraping returned {} images (likely placeholders). Attempting app endpoint...",
                        scraped.images.len()
                    )));
                    match self.app_endpoint_attempt(chapter_url, events).await {
                        Some(images) => State::Done(images),
                        None => self.brute_force_entry(chapter_url, &mut page_body, events).await,
                    }
                }
                State::BruteForceAttempt {
                    comic_id,
                    chapter_id,
                } => {
                    let saved = BruteForceResolver::new(self.transport, self.site, self.brute_force)
                        .resolve(
                            &comic_id,
                            &chapter_id,
                            dir,
                            PageRange::from(self.brute_force),
                            events,
                        )
                        .await;
                    return ResolutionOutcome::BruteForced { saved };
                }
                State::Done(images) => {
                    let downloader = ImageDownloader::new(
                        self.transport,
                        browser_headers(&self.site.base_url),
                        self.site.image_timeout(),
                    );
                    let saved = downloader.download_all(&images, dir, events).await;
                    return ResolutionOutcome::Downloaded {
                        saved,
                        total: images.len(),
                    };
                }
                State::Failed(e) => {
                    events.emit(DownloadEvent::error(e.to_string()));
                    return ResolutionOutcome::Failed;
                }
            };
        }
    }

    async fn primary_scrape(&self, chapter_url: &str, page_body: &mut Option<String>) -> Scraped {
        let images = match self.fetch_page(chapter_url).await {
            Ok(body) => {
                let images = scrape_chapter_images(&body, &self.site.default_cdn)
                    .unwrap_or_else(|e| {
                        debug!("Primary scrape of {}: {}", chapter_url, e);
                        Vec::new()
                    });
                *page_body = Some(body);
                images
            }
            Err(e) => {
                debug!("Primary scrape fetch failed: {}", e);
                Vec::new()
            }
        };
        Scraped::classify(images, self.site.placeholder_threshold)
    }

    /// Returns the app endpoint's images, or `None` to fall through.
    async fn app_endpoint_attempt(
        &self,
        chapter_url: &str,
        events: &EventSender,
    ) -> Option<Vec<String>> {
        let identity = extract_identity(chapter_url, None);
        let Some((comic_id, slot)) = identity.app_endpoint_key() else {
            events.emit(DownloadEvent::message(format!(
                "Skipping app endpoint: {}",
                ResolveError::IdentityUnresolved("comic id and chapter slot")
            )));
            return None;
        };

        let images = resolve_via_app_endpoint(self.transport, self.site, comic_id, slot).await;
        if images.is_empty() {
            events.emit(DownloadEvent::message(
                "App endpoint failed or returned no images.",
            ));
            return None;
        }

        info!("App endpoint resolved {} images", images.len());
        events.emit(DownloadEvent::message(format!(
            "Successfully fetched {} images from app endpoint!",
            images.len()
        )));
        Some(images)
    }

    /// Looks up the ids brute force needs and picks the next state.
    async fn brute_force_entry(
        &self,
        chapter_url: &str,
        page_body: &mut Option<String>,
        events: &EventSender,
    ) -> State {
        events.emit(DownloadEvent::message(
            "Still failing. Attempting brute-force ID fallback...",
        ));

        if page_body.is_none() {
            match self.fetch_page(chapter_url).await {
                Ok(body) => *page_body = Some(body),
                Err(e) => debug!("Chapter id lookup fetch failed: {}", e),
            }
        }

        let identity = extract_identity(chapter_url, page_body.as_deref());
        match identity.cdn_key() {
            Some((comic_id, chapter_id)) => {
                info!("Brute-forcing {} chapter {}", comic_id, chapter_id);
                State::BruteForceAttempt {
                    comic_id: comic_id.to_string(),
                    chapter_id: chapter_id.to_string(),
                }
            }
            None => {
                let missing = if identity.comic_id.is_none() {
                    "comic id"
                } else {
                    "chapter id"
                };
                events.emit(DownloadEvent::message(format!(
                    "Could not extract {} for fallback.",
                    missing
                )));
                State::Failed(ResolveError::NoImages(chapter_url.to_string()))
            }
        }
    }
}
