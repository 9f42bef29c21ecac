//! Chapter images via the mobile-app host.
//!
//! The app host serves the same chapter URL shape as the public site but,
//! when asked with app client headers, returns real page images for
//! chapters the public page only shows placeholders for.

use super::parser;
use crate::config::BaozimhConfig;
use crate::http::{FetchRequest, Transport, app_headers};
use scraper::Html;
use tracing::{debug, info, warn};

/// Builds the app-endpoint URL for a chapter.
pub fn app_chapter_url(config: &BaozimhConfig, comic_id: &str, slot: u32) -> String {
    format!(
        "{}/comic/chapter/{}/0_{}.html",
        config.app_endpoint_base.trim_end_matches('/'),
        comic_id,
        slot
    )
}

/// Fetches a chapter through the app endpoint.
///
/// Never fails: fetch and parse problems are logged and yield an empty list.
pub async fn resolve_via_app_endpoint(
    transport: &dyn Transport,
    config: &BaozimhConfig,
    comic_id: &str,
    slot: u32,
) -> Vec<String> {
    let url = app_chapter_url(config, comic_id, slot);
    info!("Attempting to fetch images from app endpoint: {}", url);

    let request = FetchRequest::new(&url, app_headers(&config.app_referer), config.app_timeout());
    let body = match transport.get_text(&request).await {
        Ok(body) => body,
        Err(e) => {
            warn!("App endpoint unavailable: {}", e);
            return Vec::new();
        }
    };

    let doc = Html::parse_document(&body);
    match parser::extract_app_images(&doc, &config.default_cdn) {
        Ok(images) => images,
        Err(e) => {
            debug!("App endpoint page for {} had no images: {}", url, e);
            Vec::new()
        }
    }
}
