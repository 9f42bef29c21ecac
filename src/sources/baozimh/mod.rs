//! Baozimh (baozimh.com) client.
//!
//! Search, chapter listing and chapter download for the HTML site. Chapter
//! download goes through [`ChapterResolver`], which falls back from the
//! public reader page to the app endpoint and finally to CDN guessing.

mod app_endpoint;
mod brute_force;
mod identity;
mod parser;
mod resolver;

pub use app_endpoint::{app_chapter_url, resolve_via_app_endpoint};
pub use brute_force::{BruteForceResolver, PageRange, candidate_url};
pub use identity::{chapter_id_from_page, extract_identity};
pub use parser::{
    absolutize_image_url, extract_app_images, extract_chapter_images, extract_chapter_list,
    extract_comic_detail, extract_search_results,
};
pub use resolver::{ChapterResolver, ResolutionOutcome, scrape_chapter_images};

use crate::config::{BaozimhConfig, BruteForceConfig, Config};
use crate::error::FetchFailed;
use crate::events::EventSender;
use crate::http::{FetchRequest, Transport, browser_headers};
use crate::models::{ChapterReference, ComicReference, trailing_segment};
use scraper::Html;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Client for the Baozimh HTML site.
pub struct BaozimhClient {
    transport: Arc<dyn Transport>,
    site: BaozimhConfig,
    brute_force: BruteForceConfig,
}

impl BaozimhClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        site: BaozimhConfig,
        brute_force: BruteForceConfig,
    ) -> Self {
        Self {
            transport,
            site,
            brute_force,
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self::new(transport, config.baozimh.clone(), config.brute_force.clone())
    }

    fn base_url(&self) -> Option<Url> {
        match Url::parse(&self.site.base_url) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Invalid base URL {}: {}", self.site.base_url, e);
                None
            }
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

    /// True if `input` points at this site.
    pub fn is_site_url(&self, input: &str) -> bool {
        let Some(base) = self.base_url() else {
            return false;
        };
        Url::parse(input)
            .map(|url| parser::same_site(&url, &base))
            .unwrap_or(false)
    }

    /// Detail page URL for a comic id.
    pub fn comic_url(&self, comic_id: &str) -> String {
        format!("{}/comic/{}", self.site.base_url.trim_end_matches('/'), comic_id)
    }

    /// Reader URL addressing a chapter by slot, for chapters missing from
    /// the listing.
    pub fn page_direct_url(&self, comic_id: &str, slot: u32) -> String {
        format!(
            "{}/user/page_direct?comic_id={}&section_slot=0&chapter_slot={}",
            self.site.base_url.trim_end_matches('/'),
            comic_id,
            slot
        )
    }

    /// Searches comics by keyword. Failures yield an empty list.
    pub async fn search(&self, query: &str) -> Vec<ComicReference> {
        let Some(base) = self.base_url() else {
            return Vec::new();
        };
        let mut url = match base.join("search") {
            Ok(url) => url,
            Err(e) => {
                warn!("Could not build search URL: {}", e);
                return Vec::new();
            }
        };
        url.query_pairs_mut().append_pair("q", query);

        let body = match self.fetch_page(url.as_str()).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Search failed: {}", e);
                return Vec::new();
            }
        };

        let doc = Html::parse_document(&body);
        parser::extract_search_results(&doc, &base).unwrap_or_else(|e| {
            debug!("Search for {:?}: {}", query, e);
            Vec::new()
        })
    }

    /// Looks a comic up by its detail page URL.
    ///
    /// Falls back to the id as title when the page cannot be read.
    pub async fn comic_from_url(&self, comic_url: &str) -> ComicReference {
        let fallback = || {
            ComicReference::new(
                trailing_segment(comic_url),
                comic_url.to_string(),
                String::new(),
            )
        };

        let body = match self.fetch_page(comic_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Comic page unavailable: {}", e);
                return fallback();
            }
        };

        let doc = Html::parse_document(&body);
        parser::extract_comic_detail(&doc, comic_url).unwrap_or_else(|e| {
            debug!("Comic detail for {}: {}", comic_url, e);
            fallback()
        })
    }

    /// Lists a comic's chapters, ordered by slot when slots are known.
    pub async fn chapters(&self, comic_url: &str) -> Vec<ChapterReference> {
        let Some(base) = self.base_url() else {
            return Vec::new();
        };
        let body = match self.fetch_page(comic_url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to get chapter list: {}", e);
                return Vec::new();
            }
        };

        let doc = Html::parse_document(&body);
        parser::extract_chapter_list(&doc, &base).unwrap_or_else(|e| {
            debug!("Chapter list for {}: {}", comic_url, e);
            Vec::new()
        })
    }

    /// Image URLs listed on the public reader page.
    pub async fn chapter_images(&self, chapter_url: &str) -> Vec<String> {
        match self.fetch_page(chapter_url).await {
            Ok(body) => scrape_chapter_images(&body, &self.site.default_cdn).unwrap_or_else(|e| {
                debug!("Chapter images for {}: {}", chapter_url, e);
                Vec::new()
            }),
            Err(e) => {
                warn!("Failed to get chapter images: {}", e);
                Vec::new()
            }
        }
    }

    /// Resolves and downloads a chapter, reporting through `events`.
    pub async fn download_chapter(
        &self,
        chapter_url: &str,
        dir: &Path,
        events: &EventSender,
    ) -> ResolutionOutcome {
        ChapterResolver::new(self.transport.as_ref(), &self.site, &self.brute_force)
            .download_chapter(chapter_url, dir, events)
            .await
    }

    /// Downloads a chapter by guessing CDN URLs for a known chapter id.
    pub async fn download_by_id(
        &self,
        comic_id: &str,
        chapter_id: &str,
        dir: &Path,
        range: PageRange,
        events: &EventSender,
    ) -> usize {
        BruteForceResolver::new(self.transport.as_ref(), &self.site, &self.brute_force)
            .resolve(comic_id, chapter_id, dir, range, events)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{self, EventKind};
    use crate::http::mock::MockTransport;
    use tempfile::TempDir;

    fn client(transport: MockTransport) -> (BaozimhClient, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let client = BaozimhClient::new(
            transport.clone(),
            BaozimhConfig::default(),
            BruteForceConfig::default(),
        );
        (client, transport)
    }

    #[test]
    fn test_urls() {
        let (client, _) = client(MockTransport::new());
        assert_eq!(
            client.page_direct_url("abc", 4),
            "https://www.baozimh.com/user/page_direct?comic_id=abc&section_slot=0&chapter_slot=4"
        );
        assert_eq!(client.comic_url("abc"), "https://www.baozimh.com/comic/abc");
        assert!(client.is_site_url("https://www.baozimh.com/comic/abc"));
        assert!(client.is_site_url("https://cn.baozimh.com/comic/abc"));
        assert!(!client.is_site_url("https://mangadex.org/title/abc"));
        assert!(!client.is_site_url("妖神记"));
        assert!(!client.is_site_url("https://evilbaozimh.com/comic/abc"));
        assert!(client.is_site_url("https://baozimh.com/comic/abc"));
    }

    #[tokio::test]
    async fn test_search_encodes_query() {
        let (client, transport) = client(MockTransport::new().with(
            "https://www.baozimh.com/search?q=%E5%A6%96+%E7%A5%9E",
            r#"<div class="comics-card"><a class="comics-card__poster" href="/comic/ysj" title="妖神记"></a></div>"#,
        ));

        let results = client.search("妖 神").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "ysj");
        assert_eq!(transport.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_search_failure_is_empty() {
        let (client, _) = client(MockTransport::new());
        assert!(client.search("missing").await.is_empty());
    }

    #[tokio::test]
    async fn test_comic_from_url_fallback() {
        let (client, _) = client(MockTransport::new());
        let comic = client
            .comic_from_url("https://www.baozimh.com/comic/yaoshenji")
            .await;
        assert_eq!(comic.id, "yaoshenji");
        assert_eq!(comic.display_title, "yaoshenji");
        assert!(comic.cover_url.is_empty());
    }

    #[tokio::test]
    async fn test_chapters() {
        let comic_url = "https://www.baozimh.com/comic/abc";
        let (client, _) = client(MockTransport::new().with(
            comic_url,
            r#"
            <div class="comics-chapters"><a href="/comic/chapter/abc/0_1.html">第2话</a></div>
            <div class="comics-chapters"><a href="/comic/chapter/abc/0_0.html">第1话</a></div>
            "#,
        ));

        let chapters = client.chapters(comic_url).await;
        let titles: Vec<_> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["第1话", "第2话"]);
    }

    #[tokio::test]
    async fn test_download_by_id() {
        let (client, _) = client(MockTransport::new().with(
            "https://s2.baozicdn.com/w640/scomic/abc/0/96-9w0i/1.jpg",
            "one",
        ));
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("Chapter ID 96-9w0i");
        let (tx, mut rx) = events::channel();

        let saved = client
            .download_by_id("abc", "96-9w0i", &out, PageRange::new(1, 2), &tx)
            .await;
        drop(tx);

        assert_eq!(saved, 1);
        assert!(out.join("001.jpg").exists());
        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Start);
        assert_eq!(first.total, Some(2));
    }
}
