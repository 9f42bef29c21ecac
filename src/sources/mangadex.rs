//! MangaDex (api.mangadex.org) catalog client.

use super::{CatalogChapter, MangaCatalog, TitleSummary};
use crate::config::MangaDexConfig;
use crate::error::CatalogError;
use crate::http::{FetchRequest, Transport, json_headers};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};
use url::Url;

/// Regex for direct title URLs.
static TITLE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"mangadex\.org/title/([a-fA-F0-9\-]+)").unwrap());

/// Result envelope shared by entity and collection responses.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Option<JsonValue>,
}

impl Relationship {
    fn attribute(&self, key: &str) -> Option<String> {
        self.attributes
            .as_ref()?
            .get(key)?
            .as_str()
            .map(str::to_string)
    }
}

#[derive(Debug, Deserialize)]
struct MangaData {
    id: String,
    attributes: MangaAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

/// Localized maps are `{}` objects, but arrive as `[]` when empty, so they
/// are kept as raw JSON.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: JsonValue,
    #[serde(default)]
    alt_titles: Vec<JsonValue>,
    #[serde(default)]
    description: JsonValue,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    available_translated_languages: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    id: String,
    attributes: ChapterAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    chapter: Option<String>,
    title: Option<String>,
    volume: Option<String>,
    translated_language: Option<String>,
    publish_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeResponse {
    result: String,
    base_url: String,
    chapter: AtHomeChapter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AtHomeChapter {
    #[serde(default)]
    hash: String,
    #[serde(default)]
    data: Vec<String>,
    #[serde(default)]
    data_saver: Vec<String>,
}

/// Picks the English entry of a localized map, else any entry.
fn localized(value: &JsonValue) -> Option<String> {
    let map = value.as_object()?;
    map.get("en")
        .and_then(JsonValue::as_str)
        .or_else(|| map.values().find_map(JsonValue::as_str))
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

impl From<MangaData> for TitleSummary {
    fn from(manga: MangaData) -> Self {
        let attrs = &manga.attributes;
        let title = localized(&attrs.title)
            .or_else(|| attrs.alt_titles.iter().find_map(localized))
            .unwrap_or_else(|| "Unknown".to_string());
        let cover_file = manga
            .relationships
            .iter()
            .find(|rel| rel.kind == "cover_art")
            .and_then(|rel| rel.attribute("fileName"));

        TitleSummary {
            title,
            status: attrs.status.clone(),
            description: localized(&attrs.description).unwrap_or_default(),
            cover_file,
            available_languages: attrs
                .available_translated_languages
                .iter()
                .flatten()
                .cloned()
                .collect(),
            id: manga.id,
        }
    }
}

impl From<ChapterData> for CatalogChapter {
    fn from(chapter: ChapterData) -> Self {
        let mut groups: Vec<String> = Vec::new();
        for rel in chapter
            .relationships
            .iter()
            .filter(|rel| rel.kind == "scanlation_group")
        {
            let name = rel.attribute("name").unwrap_or_else(|| rel.id.clone());
            if !name.is_empty() && !groups.contains(&name) {
                groups.push(name);
            }
        }

        let attrs = chapter.attributes;
        CatalogChapter {
            id: chapter.id,
            chapter: attrs.chapter.unwrap_or_default(),
            title: attrs.title.unwrap_or_default(),
            volume: attrs.volume.unwrap_or_default(),
            language: attrs.translated_language.unwrap_or_default(),
            publish_at: attrs.publish_at,
            groups,
        }
    }
}

/// Builds page URLs from an at-home server answer.
fn craft_image_urls(base_url: &str, chapter: &AtHomeChapter, low_bandwidth: bool) -> Vec<String> {
    let (mode, files) = if low_bandwidth {
        ("data-saver", &chapter.data_saver)
    } else {
        ("data", &chapter.data)
    };
    if chapter.hash.is_empty() || files.is_empty() {
        return Vec::new();
    }

    let base = base_url.trim_end_matches('/');
    files
        .iter()
        .map(|file| format!("{}/{}/{}/{}", base, mode, chapter.hash, file))
        .collect()
}

/// MangaDex API client.
pub struct MangaDexClient {
    transport: Arc<dyn Transport>,
    config: MangaDexConfig,
}

impl MangaDexClient {
    pub fn new(transport: Arc<dyn Transport>, config: MangaDexConfig) -> Self {
        Self { transport, config }
    }

    fn endpoint(&self, path: &str) -> Result<Url, CatalogError> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.config.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))?)
    }

    /// Cover image URL, optionally one of the 256/512px thumbnails.
    pub fn cover_url(&self, manga_id: &str, file_name: &str, size: Option<u32>) -> String {
        let base = format!(
            "{}/covers/{}/{}",
            self.config.uploads_base.trim_end_matches('/'),
            manga_id,
            file_name
        );
        match size {
            Some(size @ (256 | 512)) => format!("{}.{}.jpg", base, size),
            _ => base,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, CatalogError> {
        debug!("MangaDex GET {}", url);
        let request = FetchRequest::new(url.as_str(), json_headers(), self.config.timeout());
        let body = self.transport.get(&request).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_data<T: DeserializeOwned>(&self, url: &Url) -> Result<T, CatalogError> {
        let response: ApiResponse<T> = self.get_json(url).await?;
        if response.result != "ok" {
            let details: Vec<String> = response
                .errors
                .iter()
                .map(|e| match &e.detail {
                    Some(detail) => format!("{}: {}", e.title, detail),
                    None => e.title.clone(),
                })
                .collect();
            return Err(CatalogError::Api(details.join("; ")));
        }
        response
            .data
            .ok_or_else(|| CatalogError::Api("response missing data".to_string()))
    }
}

#[async_trait]
impl MangaCatalog for MangaDexClient {
    fn name(&self) -> &'static str {
        "MangaDex"
    }

    async fn search_titles(&self, query: &str) -> Result<Vec<TitleSummary>, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<MangaData> = if let Some(caps) = TITLE_URL.captures(query) {
            let mut url = self.endpoint(&format!("manga/{}", &caps[1]))?;
            url.query_pairs_mut().append_pair("includes[]", "cover_art");
            vec![self.get_data(&url).await?]
        } else {
            let mut url = self.endpoint("manga")?;
            url.query_pairs_mut()
                .append_pair("title", query)
                .append_pair("limit", &self.config.page_limit.to_string())
                .append_pair("includes[]", "cover_art");
            self.get_data(&url).await?
        };

        let mut results: Vec<TitleSummary> = Vec::new();
        for manga in raw {
            if results.iter().all(|r| r.id != manga.id) {
                results.push(manga.into());
            }
        }
        Ok(results)
    }

    async fn list_chapters(
        &self,
        title_id: &str,
        languages: &[String],
    ) -> Result<Vec<CatalogChapter>, CatalogError> {
        let limit = self.config.page_limit;
        let mut chapters: Vec<CatalogChapter> = Vec::new();
        let mut offset = 0u32;

        loop {
            let mut url = self.endpoint("chapter")?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("manga", title_id)
                    .append_pair("limit", &limit.to_string())
                    .append_pair("offset", &offset.to_string())
                    .append_pair("order[chapter]", "asc")
                    .append_pair("includes[]", "scanlation_group");
                for lang in languages {
                    query.append_pair("translatedLanguage[]", lang);
                }
            }

            let page: Vec<ChapterData> = match self.get_data(&url).await {
                Ok(page) => page,
                Err(e) => {
                    // Keep what earlier pages returned
                    if !chapters.is_empty() {
                        warn!("Failed to fetch chapters page at offset {}: {}", offset, e);
                        break;
                    }
                    return Err(e);
                }
            };

            let count = page.len() as u32;
            chapters.extend(page.into_iter().map(CatalogChapter::from));
            offset += count;

            if count < limit || offset >= self.config.max_offset {
                break;
            }
        }

        Ok(chapters)
    }

    async fn resolve_chapter_images(
        &self,
        chapter_id: &str,
        low_bandwidth: bool,
    ) -> Result<Vec<String>, CatalogError> {
        let url = self.endpoint(&format!("at-home/server/{}", chapter_id))?;
        let response: AtHomeResponse = self.get_json(&url).await?;
        if response.result != "ok" {
            return Err(CatalogError::Api(format!(
                "at-home server lookup for {} returned {}",
                chapter_id, response.result
            )));
        }
        Ok(craft_image_urls(
            &response.base_url,
            &response.chapter,
            low_bandwidth,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockTransport;

    const API: &str = "https://api.mangadex.org";

    fn client(transport: MockTransport) -> MangaDexClient {
        MangaDexClient::new(Arc::new(transport), MangaDexConfig::default())
    }

    fn manga_json(id: &str, title: &str) -> String {
        format!(
            r#"{{"id":"{id}","type":"manga","attributes":{{
                "title":{{"ja-ro":"{title} (romaji)","en":"{title}"}},
                "altTitles":[],
                "description":[],
                "status":"ongoing",
                "availableTranslatedLanguages":["en",null,"fr"]}},
              "relationships":[{{"id":"c1","type":"cover_art","attributes":{{"fileName":"cover.png"}}}}]}}"#
        )
    }

    #[tokio::test]
    async fn test_search_titles() {
        let body = format!(
            r#"{{"result":"ok","response":"collection","data":[{},{}]}}"#,
            manga_json("m1", "Frieren"),
            manga_json("m1", "Frieren"),
        );
        let catalog = client(MockTransport::new().with(
            &format!("{}/manga?title=frieren&limit=100&includes%5B%5D=cover_art", API),
            body,
        ));

        let results = catalog.search_titles("frieren").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Frieren");
        assert_eq!(results[0].description, "");
        assert_eq!(results[0].cover_file.as_deref(), Some("cover.png"));
        assert_eq!(results[0].available_languages, vec!["en", "fr"]);
    }

    #[tokio::test]
    async fn test_search_by_title_url() {
        let id = "a1c7c817-4e59-43b7-9365-09675a149a6f";
        let body = format!(
            r#"{{"result":"ok","response":"entity","data":{}}}"#,
            manga_json(id, "One Piece")
        );
        let catalog = client(MockTransport::new().with(
            &format!("{}/manga/{}?includes%5B%5D=cover_art", API, id),
            body,
        ));

        let results = catalog
            .search_titles(&format!("https://mangadex.org/title/{}/one-piece", id))
            .await
            .unwrap();
        assert_eq!(results[0].id, id);
    }

    #[tokio::test]
    async fn test_api_error() {
        let catalog = client(MockTransport::new().with(
            &format!("{}/manga?title=x&limit=100&includes%5B%5D=cover_art", API),
            r#"{"result":"error","errors":[{"title":"Bad Request","detail":"limit too high"}]}"#,
        ));
        let err = catalog.search_titles("x").await.unwrap_err();
        assert_eq!(err.to_string(), "API error: Bad Request: limit too high");
    }

    fn chapter_json(id: &str, number: &str) -> String {
        format!(
            r#"{{"id":"{id}","type":"chapter","attributes":{{
                "chapter":"{number}","title":null,"volume":"1",
                "translatedLanguage":"en","publishAt":"2024-01-01T00:00:00+00:00"}},
              "relationships":[
                {{"id":"g1","type":"scanlation_group","attributes":{{"name":"Group A"}}}},
                {{"id":"g1","type":"scanlation_group","attributes":{{"name":"Group A"}}}},
                {{"id":"g2","type":"scanlation_group"}}]}}"#
        )
    }

    fn chapter_page(ids: std::ops::Range<u32>) -> String {
        let items: Vec<String> = ids
            .map(|i| chapter_json(&format!("c{}", i), &i.to_string()))
            .collect();
        format!(r#"{{"result":"ok","data":[{}]}}"#, items.join(","))
    }

    fn chapter_url(offset: u32, limit: u32) -> String {
        format!(
            "{}/chapter?manga=m1&limit={}&offset={}&order%5Bchapter%5D=asc&includes%5B%5D=scanlation_group&translatedLanguage%5B%5D=en",
            API, limit, offset
        )
    }

    #[tokio::test]
    async fn test_list_chapters_paginates() {
        let config = MangaDexConfig {
            page_limit: 2,
            ..MangaDexConfig::default()
        };
        let transport = Arc::new(
            MockTransport::new()
                .with(&chapter_url(0, 2), chapter_page(1..3))
                .with(&chapter_url(2, 2), chapter_page(3..5))
                .with(&chapter_url(4, 2), chapter_page(5..6)),
        );
        let catalog = MangaDexClient::new(transport.clone(), config);

        let chapters = catalog
            .list_chapters("m1", &["en".to_string()])
            .await
            .unwrap();

        assert_eq!(chapters.len(), 5);
        assert_eq!(chapters[0].chapter, "1");
        assert_eq!(chapters[0].groups, vec!["Group A", "g2"]);
        assert_eq!(chapters[0].label(), "Vol.1 Ch.1");
        assert_eq!(transport.requested().len(), 3);
    }

    #[tokio::test]
    async fn test_list_chapters_respects_max_offset() {
        let config = MangaDexConfig {
            page_limit: 2,
            max_offset: 2,
            ..MangaDexConfig::default()
        };
        let transport = Arc::new(MockTransport::new().with(&chapter_url(0, 2), chapter_page(1..3)));
        let catalog = MangaDexClient::new(transport.clone(), config);

        let chapters = catalog
            .list_chapters("m1", &["en".to_string()])
            .await
            .unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(transport.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_list_chapters_keeps_partial_results() {
        let config = MangaDexConfig {
            page_limit: 2,
            ..MangaDexConfig::default()
        };
        let catalog = MangaDexClient::new(
            Arc::new(MockTransport::new().with(&chapter_url(0, 2), chapter_page(1..3))),
            config.clone(),
        );
        let chapters = catalog.list_chapters("m1", &["en".to_string()]).await.unwrap();
        assert_eq!(chapters.len(), 2);

        let catalog = MangaDexClient::new(Arc::new(MockTransport::new()), config);
        assert!(catalog.list_chapters("m1", &["en".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_chapter_images() {
        let catalog = client(MockTransport::new().with(
            &format!("{}/at-home/server/ch1", API),
            r#"{"result":"ok","baseUrl":"https://uploads.mangadex.org/","chapter":{
                "hash":"abc","data":["1.png","2.png"],"dataSaver":["1.jpg","2.jpg"]}}"#,
        ));

        let saver = catalog.resolve_chapter_images("ch1", true).await.unwrap();
        assert_eq!(
            saver,
            vec![
                "https://uploads.mangadex.org/data-saver/abc/1.jpg",
                "https://uploads.mangadex.org/data-saver/abc/2.jpg",
            ]
        );
        let full = catalog.resolve_chapter_images("ch1", false).await.unwrap();
        assert_eq!(full[1], "https://uploads.mangadex.org/data/abc/2.png");
    }

    #[test]
    fn test_cover_url() {
        let catalog = client(MockTransport::new());
        assert_eq!(catalog.name(), "MangaDex");
        assert_eq!(
            catalog.cover_url("m1", "c.jpg", Some(256)),
            "https://uploads.mangadex.org/covers/m1/c.jpg.256.jpg"
        );
        assert_eq!(
            catalog.cover_url("m1", "c.jpg", Some(300)),
            "https://uploads.mangadex.org/covers/m1/c.jpg"
        );
    }

    #[test]
    fn test_craft_urls_without_hash() {
        let chapter = AtHomeChapter {
            hash: String::new(),
            data: vec!["1.png".to_string()],
            data_saver: Vec::new(),
        };
        assert!(craft_image_urls("https://x", &chapter, false).is_empty());
    }
}
