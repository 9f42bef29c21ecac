//! Data types shared by the scraping and download pipeline.

use serde::Serialize;

/// A comic found on the HTML site.
///
/// Identity is the canonical URL; `id` is its trailing path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComicReference {
    pub id: String,
    pub display_title: String,
    pub canonical_url: String,
    pub cover_url: String,
}

impl ComicReference {
    /// Builds a reference, deriving the id from the URL's last path segment.
    pub fn new(display_title: String, canonical_url: String, cover_url: String) -> Self {
        let id = trailing_segment(&canonical_url);
        Self {
            id,
            display_title,
            canonical_url,
            cover_url,
        }
    }
}

/// A chapter entry from a comic's detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterReference {
    pub url: String,
    pub title: String,
    /// Ordering position, used only for display sort. `None` sorts last.
    pub ordering_slot: Option<u32>,
}

/// Identity derived from a chapter URL (and optionally its page body).
///
/// `comic_id` and `chapter_id` are opaque site tokens. `chapter_id` is only
/// needed by the brute-force resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedChapterIdentity {
    pub comic_id: Option<String>,
    pub chapter_id: Option<String>,
    pub ordering_slot: Option<u32>,
}

impl ResolvedChapterIdentity {
    /// Comic id and slot, when both are known.
    pub fn app_endpoint_key(&self) -> Option<(&str, u32)> {
        Some((self.comic_id.as_deref()?, self.ordering_slot?))
    }

    /// Comic id and chapter id, when both are known.
    pub fn cdn_key(&self) -> Option<(&str, &str)> {
        Some((self.comic_id.as_deref()?, self.chapter_id.as_deref()?))
    }
}

/// Ordered, duplicate-free image URLs for one chapter.
///
/// An empty list is a valid outcome ("no images found").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageCandidateList(Vec<String>);

impl ImageCandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `url` unless it is already present.
    pub fn push(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !self.0.contains(&url) {
            self.0.push(url);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<S: Into<String>> FromIterator<S> for ImageCandidateList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        for url in iter {
            list.push(url);
        }
        list
    }
}

/// Returns the last non-empty path segment of a URL, ignoring query/fragment.
pub fn trailing_segment(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
