//! Comic id, chapter slot and chapter id extraction.
//!
//! Chapter URLs come in several shapes (`page_direct` query links,
//! `/comic/chapter/<id>/0_<slot>.html` paths, and variants of both), so
//! extraction tries each shape in turn. Failing to resolve is a normal
//! outcome, not an error.

use crate::models::ResolvedChapterIdentity;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use url::Url;

/// `.../chapter/<comicId>/0_<slot>`
static CHAPTER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/chapter/([^/?#]+)/0_(\d+)").unwrap());

/// `/scomic/<comicId>/0/<chapterId>/` inside any image URL on the page.
static CONTENT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/scomic/[^/]+/0/([^/]+)/").unwrap());

/// Derives the identity of a chapter from its URL and, when given, the
/// chapter page body (needed only for the chapter id).
pub fn extract_identity(chapter_url: &str, page_html: Option<&str>) -> ResolvedChapterIdentity {
    let parsed = Url::parse(chapter_url).ok();

    let resolved = parsed
        .as_ref()
        .and_then(from_query)
        .or_else(|| from_chapter_path(chapter_url))
        .or_else(|| parsed.as_ref().and_then(from_path_segments))
        .or_else(|| {
            parsed
                .as_ref()
                .and_then(|url| query_value(url, "comic_id"))
                .map(|id| (id, None))
        });

    let Some((comic_id, ordering_slot)) = resolved else {
        return ResolvedChapterIdentity::default();
    };

    ResolvedChapterIdentity {
        comic_id: Some(comic_id),
        chapter_id: page_html.and_then(chapter_id_from_page),
        ordering_slot,
    }
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `?comic_id=<id>&chapter_slot=<n>`, both required.
fn from_query(url: &Url) -> Option<(String, Option<u32>)> {
    let comic_id = query_value(url, "comic_id")?;
    let slot = query_value(url, "chapter_slot")?.parse().ok()?;
    Some((comic_id, Some(slot)))
}

fn from_chapter_path(chapter_url: &str) -> Option<(String, Option<u32>)> {
    let caps = CHAPTER_PATH.captures(chapter_url)?;
    let slot = caps[2].parse().ok()?;
    Some((caps[1].to_string(), Some(slot)))
}

/// Positional inference: the segment after `chapter` is the comic id and
/// the one after that may carry `<section>_<slot>[.html]`.
fn from_path_segments(url: &Url) -> Option<(String, Option<u32>)> {
    let segments: Vec<&str> = url.path_segments()?.collect();
    let idx = segments.iter().position(|s| *s == "chapter")?;
    let comic_id = segments.get(idx + 1).filter(|s| !s.is_empty())?;

    let slot = segments.get(idx + 2).and_then(|part| {
        let (_, rest) = part.split_once('_')?;
        rest.split(['.', '_']).next()?.parse().ok()
    });

    Some((comic_id.to_string(), slot))
}

/// Majority vote over every `/scomic/<comic>/0/<chapter>/` URL on the page.
///
/// Ties go to the token seen first. A page whose recommendation thumbnails
/// outnumber the current chapter's images will yield the wrong id; that
/// case is not corrected here.
pub fn chapter_id_from_page(html: &str) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (order, caps) in CONTENT_PATH.captures_iter(html).enumerate() {
        let token = caps.get(1)?.as_str();
        counts.entry(token).or_insert((0, order)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(token, _)| token.to_string())
}
