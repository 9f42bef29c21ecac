//! HTML extraction for Baozimh pages.
//!
//! Each extractor runs a cascade of selector strategies over one parsed
//! document and reports which strategies it tried when nothing matched.

use crate::error::{PageKind, ParseFailure};
use crate::models::{ChapterReference, ComicReference, ImageCandidateList};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;
use url::Url;

/// `.../0_<slot>.html` chapter URLs.
static SLOT_IN_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"0_(\d+)\.html").unwrap());

/// Path fragments that identify chapter links in the broad fallback scan.
const CHAPTER_MARKERS: [&str; 3] = ["/chapter/", "comic/chapter", "page_direct"];

/// Fragments that identify real page images (as opposed to ads or icons).
const CONTENT_MARKERS: [&str; 3] = ["/scomic/", "bzcdn", "baozicdn"];

/// CSS selectors used for parsing.
struct Selectors {
    /// Search result card.
    card: Selector,
    /// Poster anchor inside a card.
    card_poster: Selector,
    /// Any image-like tag (`<img>` or AMP's `<amp-img>`).
    image_like: Selector,
    /// Comic title on the detail page.
    detail_title: Selector,
    /// Plain heading fallback for the detail title.
    heading: Selector,
    /// Poster on the detail page.
    detail_cover: Selector,
    /// Chapter list container.
    chapter_container: Selector,
    /// First anchor inside a container.
    anchor: Selector,
    /// Every anchor with an href.
    any_link: Selector,
    /// Reader image class used by the legacy layout.
    legacy_image: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            card: Selector::parse("div.comics-card").unwrap(),
            card_poster: Selector::parse("a.comics-card__poster").unwrap(),
            image_like: Selector::parse("amp-img, img").unwrap(),
            detail_title: Selector::parse(".comics-detail__title").unwrap(),
            heading: Selector::parse("h1").unwrap(),
            detail_cover: Selector::parse(
                "amp-img.comics-detail__poster, .comics-detail__poster amp-img",
            )
            .unwrap(),
            chapter_container: Selector::parse("div.comics-chapters").unwrap(),
            anchor: Selector::parse("a").unwrap(),
            any_link: Selector::parse("a[href]").unwrap(),
            legacy_image: Selector::parse("img.comic-contain_ui-Image_img").unwrap(),
        }
    }
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(Selectors::new);

fn element_text(elem: ElementRef<'_>) -> String {
    elem.text().collect::<String>().trim().to_string()
}

/// Non-empty attribute value.
fn attr<'a>(elem: ElementRef<'a>, name: &str) -> Option<&'a str> {
    elem.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Image source preferring the lazy-load attribute.
fn lazy_src<'a>(elem: ElementRef<'a>) -> Option<&'a str> {
    attr(elem, "data-src").or_else(|| attr(elem, "src"))
}

fn is_content_image(src: &str) -> bool {
    CONTENT_MARKERS.iter().any(|m| src.contains(m))
}

/// Turns protocol-relative and root-relative image URLs into absolute ones.
pub fn absolutize_image_url(src: &str, default_cdn: &str) -> String {
    if src.starts_with("//") {
        format!("https:{}", src)
    } else if src.starts_with('/') {
        match Url::parse(default_cdn).and_then(|base| base.join(src)) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", default_cdn.trim_end_matches('/'), src),
        }
    } else {
        src.to_string()
    }
}

/// Extracts comic cards from a search results page.
///
/// Cards lacking a titled poster anchor with an href are skipped.
pub fn extract_search_results(
    doc: &Html,
    base: &Url,
) -> Result<Vec<ComicReference>, ParseFailure> {
    let s = &*SELECTORS;
    let mut results: Vec<ComicReference> = Vec::new();

    for card in doc.select(&s.card) {
        let Some(link) = card.select(&s.card_poster).next() else {
            continue;
        };
        let Some(href) = attr(link, "href") else {
            continue;
        };
        let title = attr(link, "title")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(link));
        if title.is_empty() {
            continue;
        }
        let Ok(url) = base.join(href) else {
            continue;
        };

        let cover_url = link
            .select(&s.image_like)
            .next()
            .and_then(|img| attr(img, "src").or_else(|| attr(img, "data-src")))
            .unwrap_or_default()
            .to_string();

        let url = url.to_string();
        if results.iter().all(|r| r.canonical_url != url) {
            results.push(ComicReference::new(title, url, cover_url));
        }
    }

    if results.is_empty() {
        return Err(ParseFailure::new(
            PageKind::SearchResults,
            &["comics-card poster"],
        ));
    }
    Ok(results)
}

/// Extracts title and cover from a comic's detail page.
pub fn extract_comic_detail(
    doc: &Html,
    canonical_url: &str,
) -> Result<ComicReference, ParseFailure> {
    let s = &*SELECTORS;
    let title = doc
        .select(&s.detail_title)
        .chain(doc.select(&s.heading))
        .map(element_text)
        .find(|t| !t.is_empty())
        .ok_or_else(|| ParseFailure::new(PageKind::ComicDetail, &["detail title", "h1"]))?;

    let cover_url = doc
        .select(&s.detail_cover)
        .find_map(|img| attr(img, "src").or_else(|| attr(img, "data-src")))
        .unwrap_or_default()
        .to_string();

    Ok(ComicReference::new(
        title,
        canonical_url.to_string(),
        cover_url,
    ))
}

/// Derives a chapter's ordering slot from its resolved URL or container.
///
/// Priority: `chapter_slot` query parameter, then a `0_<N>.html` path,
/// then the container's `data-index`.
fn ordering_slot(resolved: &Url, data_index: Option<&str>) -> Option<u32> {
    let from_query = resolved
        .query_pairs()
        .find(|(k, _)| k == "chapter_slot")
        .and_then(|(_, v)| v.parse().ok());

    from_query
        .or_else(|| {
            SLOT_IN_PATH
                .captures(resolved.as_str())
                .and_then(|caps| caps[1].parse().ok())
        })
        .or_else(|| data_index.and_then(|v| v.parse().ok()))
}

/// True when `url` lives on the same site as `base` (ignoring `www.`).
pub(crate) fn same_site(url: &Url, base: &Url) -> bool {
    let site = base.host_str().unwrap_or_default().trim_start_matches("www.");
    url.host_str()
        .map(|host| host == site || host.ends_with(&format!(".{}", site)))
        .unwrap_or(false)
}

/// Extracts the chapter list from a comic's detail page.
pub fn extract_chapter_list(
    doc: &Html,
    base: &Url,
) -> Result<Vec<ChapterReference>, ParseFailure> {
    let s = &*SELECTORS;
    let mut chapters = Vec::new();
    let mut containers = doc.select(&s.chapter_container).peekable();

    if containers.peek().is_some() {
        for container in containers {
            let Some(link) = container.select(&s.anchor).next() else {
                continue;
            };
            let Some(href) = attr(link, "href") else {
                continue;
            };
            let Ok(url) = base.join(href) else {
                continue;
            };

            chapters.push(ChapterReference {
                title: element_text(link),
                ordering_slot: ordering_slot(&url, attr(container, "data-index")),
                url: url.to_string(),
            });
        }
    } else {
        for link in doc.select(&s.any_link) {
            let Some(href) = attr(link, "href") else {
                continue;
            };
            let Ok(url) = base.join(href) else {
                continue;
            };
            if !same_site(&url, base) || !CHAPTER_MARKERS.iter().any(|m| href.contains(m)) {
                continue;
            }

            chapters.push(ChapterReference {
                title: element_text(link),
                url: url.to_string(),
                ordering_slot: None,
            });
        }
    }

    if chapters.is_empty() {
        return Err(ParseFailure::new(
            PageKind::ChapterList,
            &["comics-chapters containers", "chapter link scan"],
        ));
    }
    Ok(dedupe_and_sort(chapters))
}

/// Removes duplicate URLs and orders by slot when any slot is known.
///
/// A later duplicate replaces an earlier one only if it brings a slot the
/// earlier one lacked; the entry keeps its first-seen position. Unresolved
/// slots sort after all resolved ones.
pub(crate) fn dedupe_and_sort(chapters: Vec<ChapterReference>) -> Vec<ChapterReference> {
    let mut unique: Vec<ChapterReference> = Vec::with_capacity(chapters.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for chapter in chapters {
        match positions.get(&chapter.url) {
            Some(&idx) => {
                if unique[idx].ordering_slot.is_none() && chapter.ordering_slot.is_some() {
                    unique[idx] = chapter;
                }
            }
            None => {
                positions.insert(chapter.url.clone(), unique.len());
                unique.push(chapter);
            }
        }
    }

    if unique.iter().any(|c| c.ordering_slot.is_some()) {
        unique.sort_by_key(|c| (c.ordering_slot.is_none(), c.ordering_slot));
    }
    unique
}

/// Extracts page image URLs from a public chapter page.
///
/// Uses the legacy reader class when present, otherwise any image-like tag
/// whose source looks like CDN content.
pub fn extract_chapter_images(doc: &Html) -> Result<Vec<String>, ParseFailure> {
    let s = &*SELECTORS;
    let mut images: ImageCandidateList = doc.select(&s.legacy_image).filter_map(lazy_src).collect();

    if images.is_empty() {
        images = doc
            .select(&s.image_like)
            .filter_map(lazy_src)
            .filter(|src| is_content_image(src))
            .collect();
    }

    if images.is_empty() {
        return Err(ParseFailure::new(
            PageKind::ChapterImages,
            &["legacy reader class", "cdn image scan"],
        ));
    }
    Ok(images.into_vec())
}

/// Extracts page images from an app-endpoint chapter page.
pub fn extract_app_images(doc: &Html, default_cdn: &str) -> Result<Vec<String>, ParseFailure> {
    let s = &*SELECTORS;
    let images: ImageCandidateList = doc
        .select(&s.image_like)
        .filter_map(lazy_src)
        .filter(|src| src.contains("/scomic/"))
        .map(|src| absolutize_image_url(src, default_cdn))
        .collect();

    if images.is_empty() {
        return Err(ParseFailure::new(PageKind::AppChapter, &["scomic image scan"]));
    }
    Ok(images.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://www.baozimh.com").unwrap()
    }

    fn chapter(url: &str, slot: Option<u32>) -> ChapterReference {
        ChapterReference {
            url: url.to_string(),
            title: url.to_string(),
            ordering_slot: slot,
        }
    }

    #[test]
    fn test_search_results() {
        let html = r#"
            <div class="comics-card">
              <a class="comics-card__poster" href="/comic/yaoshenji" title="妖神记">
                <amp-img src="https://static.baozimh.com/cover/yaoshenji.jpg"></amp-img>
              </a>
            </div>
            <div class="comics-card">
              <a class="comics-card__poster" href="/comic/wudong"><span>武动乾坤</span></a>
            </div>
            <div class="comics-card">
              <a class="comics-card__poster" title="No href"></a>
            </div>
            <div class="comics-card">
              <a class="comics-card__poster" href="/comic/yaoshenji" title="dup"></a>
            </div>
            <div class="comics-card"><span>no poster</span></div>
        "#;
        let doc = Html::parse_document(html);
        let results = extract_search_results(&doc, &base()).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "yaoshenji");
        assert_eq!(results[0].display_title, "妖神记");
        assert_eq!(results[0].canonical_url, "https://www.baozimh.com/comic/yaoshenji");
        assert_eq!(results[0].cover_url, "https://static.baozimh.com/cover/yaoshenji.jpg");
        assert_eq!(results[1].display_title, "武动乾坤");
        assert_eq!(results[1].cover_url, "");
    }

    #[test]
    fn test_search_results_empty() {
        let doc = Html::parse_document("<html><body><p>nothing</p></body></html>");
        let err = extract_search_results(&doc, &base()).unwrap_err();
        assert_eq!(err.page, PageKind::SearchResults);
    }

    #[test]
    fn test_comic_detail() {
        let html = r#"
            <h1 class="comics-detail__title">妖神记</h1>
            <amp-img class="comics-detail__poster" data-src="https://static.baozimh.com/c.jpg"></amp-img>
        "#;
        let doc = Html::parse_document(html);
        let comic =
            extract_comic_detail(&doc, "https://www.baozimh.com/comic/yaoshenji").unwrap();
        assert_eq!(comic.display_title, "妖神记");
        assert_eq!(comic.cover_url, "https://static.baozimh.com/c.jpg");
        assert_eq!(comic.id, "yaoshenji");
    }

    #[test]
    fn test_chapter_list_slot_priority() {
        let html = r#"
            <div class="comics-chapters" data-index="9">
              <a href="/user/page_direct?comic_id=abc&section_slot=0&chapter_slot=2">第2话</a>
            </div>
            <div class="comics-chapters">
              <a href="/comic/chapter/abc/0_0.html">序章</a>
            </div>
            <div class="comics-chapters" data-index="1">
              <a href="/comic/chapter/abc/extra">第1话</a>
            </div>
            <div class="comics-chapters"><a href="/somewhere">未知</a></div>
        "#;
        let doc = Html::parse_document(html);
        let chapters = extract_chapter_list(&doc, &base()).unwrap();

        let slots: Vec<_> = chapters.iter().map(|c| c.ordering_slot).collect();
        assert_eq!(slots, vec![Some(0), Some(1), Some(2), None]);
        assert_eq!(chapters[0].title, "序章");
        assert_eq!(
            chapters[0].url,
            "https://www.baozimh.com/comic/chapter/abc/0_0.html"
        );
    }

    #[test]
    fn test_chapter_list_fallback_scan() {
        let html = r#"
            <a href="/comic/chapter/abc/0_5.html">第5话</a>
            <a href="https://ads.example.com/comic/chapter/x">广告</a>
            <a href="/about">关于</a>
            <a href="https://www.baozimh.com/comic/chapter/abc/0_1.html">第1话</a>
        "#;
        let doc = Html::parse_document(html);
        let chapters = extract_chapter_list(&doc, &base()).unwrap();

        assert_eq!(chapters.len(), 2);
        assert!(chapters.iter().all(|c| c.ordering_slot.is_none()));
        assert_eq!(chapters[0].title, "第5话");
        assert_eq!(chapters[1].title, "第1话");
    }

    #[test]
    fn test_chapter_sort_unresolved_last() {
        let sorted = dedupe_and_sort(vec![
            chapter("https://a/2", Some(2)),
            chapter("https://a/x", None),
            chapter("https://a/1", Some(1)),
        ]);
        let slots: Vec<_> = sorted.iter().map(|c| c.ordering_slot).collect();
        assert_eq!(slots, vec![Some(1), Some(2), None]);
    }

    #[test]
    fn test_chapter_sort_all_unresolved_keeps_order() {
        let sorted = dedupe_and_sort(vec![
            chapter("https://a/c", None),
            chapter("https://a/a", None),
            chapter("https://a/b", None),
        ]);
        let urls: Vec<_> = sorted.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a/c", "https://a/a", "https://a/b"]);
    }

    #[test]
    fn test_chapter_dedupe_prefers_resolved_slot() {
        let deduped = dedupe_and_sort(vec![
            chapter("https://a/1", None),
            chapter("https://a/2", Some(2)),
            chapter("https://a/1", Some(1)),
            chapter("https://a/2", None),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].url, "https://a/1");
        assert_eq!(deduped[0].ordering_slot, Some(1));
        assert_eq!(deduped[1].ordering_slot, Some(2));
    }

    #[test]
    fn test_chapter_images_legacy_class() {
        let html = r#"
            <img class="comic-contain_ui-Image_img" data-src="https://s1.bzcdn.net/scomic/a/0/b/1.jpg">
            <img class="comic-contain_ui-Image_img" src="https://s1.bzcdn.net/scomic/a/0/b/2.jpg">
            <img class="comic-contain_ui-Image_img" data-src="https://s1.bzcdn.net/scomic/a/0/b/1.jpg">
            <img src="https://s1.bzcdn.net/scomic/a/0/b/ignored.jpg">
        "#;
        let doc = Html::parse_document(html);
        let images = extract_chapter_images(&doc).unwrap();
        assert_eq!(
            images,
            vec![
                "https://s1.bzcdn.net/scomic/a/0/b/1.jpg",
                "https://s1.bzcdn.net/scomic/a/0/b/2.jpg",
            ]
        );
    }

    #[test]
    fn test_chapter_images_cdn_fallback_is_idempotent() {
        let html = r#"
            <amp-img src="https://s2.baozicdn.com/scomic/a/0/b/1.jpg"></amp-img>
            <img src="/static/logo.png">
            <img data-src="https://s1.bzcdn.net/other/2.jpg">
            <amp-img src="https://s2.baozicdn.com/scomic/a/0/b/1.jpg"></amp-img>
        "#;
        let doc = Html::parse_document(html);
        let first = extract_chapter_images(&doc).unwrap();
        let second = extract_chapter_images(&doc).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                "https://s2.baozicdn.com/scomic/a/0/b/1.jpg",
                "https://s1.bzcdn.net/other/2.jpg",
            ]
        );
    }

    #[test]
    fn test_chapter_images_none() {
        let doc = Html::parse_document(r#"<img src="/static/logo.png">"#);
        let err = extract_chapter_images(&doc).unwrap_err();
        assert_eq!(err.strategies, vec!["legacy reader class", "cdn image scan"]);
    }

    #[test]
    fn test_app_images_absolutized() {
        let html = r#"
            <amp-img src="//s1.bzcdn.net/scomic/a/0/b/1.jpg"></amp-img>
            <img data-src="/scomic/a/0/b/2.jpg">
            <img src="https://s2.baozicdn.com/scomic/a/0/b/3.jpg">
            <img src="https://s2.baozicdn.com/ads/banner.jpg">
        "#;
        let doc = Html::parse_document(html);
        let images = extract_app_images(&doc, "https://s2.baozicdn.com").unwrap();
        assert_eq!(
            images,
            vec![
                "https://s1.bzcdn.net/scomic/a/0/b/1.jpg",
                "https://s2.baozicdn.com/scomic/a/0/b/2.jpg",
                "https://s2.baozicdn.com/scomic/a/0/b/3.jpg",
            ]
        );
    }
}
