//! Manga sources.
//!
//! Two very different sources live here: the Baozimh HTML site, which needs
//! scraping with fallbacks, and the MangaDex JSON API, which is exposed
//! through the [`MangaCatalog`] capability trait.

pub mod baozimh;
mod mangadex;

pub use baozimh::{BaozimhClient, ResolutionOutcome};
pub use mangadex::MangaDexClient;

use crate::error::CatalogError;
use async_trait::async_trait;
use serde::Serialize;

/// A title returned by a catalog search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleSummary {
    pub id: String,
    pub title: String,
    pub status: Option<String>,
    pub description: String,
    /// Cover file name, resolved with the catalog's cover URL helper.
    pub cover_file: Option<String>,
    pub available_languages: Vec<String>,
}

/// A chapter listed by a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogChapter {
    pub id: String,
    /// Chapter number as published (may be fractional or empty).
    pub chapter: String,
    pub title: String,
    pub volume: String,
    pub language: String,
    pub publish_at: Option<String>,
    pub groups: Vec<String>,
}

impl CatalogChapter {
    /// Human-readable label such as `Vol.2 Ch.10 - Title`.
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if !self.volume.is_empty() {
            parts.push(format!("Vol.{}", self.volume));
        }
        if !self.chapter.is_empty() {
            parts.push(format!("Ch.{}", self.chapter));
        }
        let mut label = if parts.is_empty() {
            "Oneshot".to_string()
        } else {
            parts.join(" ")
        };
        if !self.title.is_empty() {
            label.push_str(" - ");
            label.push_str(&self.title);
        }
        label
    }
}

/// A structured catalog of titles, chapters and page images.
#[async_trait]
pub trait MangaCatalog: Send + Sync {
    /// Returns the human-readable name of this catalog.
    fn name(&self) -> &'static str;

    /// Searches titles by text (or by a direct title URL).
    async fn search_titles(&self, query: &str) -> Result<Vec<TitleSummary>, CatalogError>;

    /// Lists a title's chapters, optionally filtered by language codes.
    async fn list_chapters(
        &self,
        title_id: &str,
        languages: &[String],
    ) -> Result<Vec<CatalogChapter>, CatalogError>;

    /// Resolves a chapter's page image URLs.
    async fn resolve_chapter_images(
        &self,
        chapter_id: &str,
        low_bandwidth: bool,
    ) -> Result<Vec<String>, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(volume: &str, number: &str, title: &str) -> CatalogChapter {
        CatalogChapter {
            id: "id".to_string(),
            chapter: number.to_string(),
            title: title.to_string(),
            volume: volume.to_string(),
            language: "en".to_string(),
            publish_at: None,
            groups: Vec::new(),
        }
    }

    #[test]
    fn test_chapter_label() {
        assert_eq!(chapter("2", "10", "Departure").label(), "Vol.2 Ch.10 - Departure");
        assert_eq!(chapter("", "10.5", "").label(), "Ch.10.5");
        assert_eq!(chapter("", "", "Extra").label(), "Oneshot - Extra");
    }
}
