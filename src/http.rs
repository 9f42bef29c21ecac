//! HTTP transport used by every network-facing component.
//!
//! Client facades own an `Arc<dyn Transport>` and lend `&dyn Transport` to
//! the resolvers and downloaders, so tests can swap in an in-memory
//! transport.

use crate::error::FetchFailed;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// Desktop browser user agent sent to the public site.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// User agent of the mobile app client.
pub const APP_USER_AGENT: &str = "baozimh_android/1.0.31/gb/adset";

/// A single GET request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, headers: HeaderMap, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers,
            timeout,
        }
    }
}

/// Issues one GET and returns the body. No retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &FetchRequest) -> Result<Vec<u8>, FetchFailed>;

    /// Convenience wrapper decoding the body as (lossy) UTF-8.
    async fn get_text(&self, request: &FetchRequest) -> Result<String, FetchFailed> {
        let body = self.get(request).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Transport backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &FetchRequest) -> Result<Vec<u8>, FetchFailed> {
        let response = self
            .client
            .get(&request.url)
            .headers(request.headers.clone())
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| FetchFailed::new(&request.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailed::new(&request.url, format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchFailed::new(&request.url, e))?;
        Ok(body.to_vec())
    }
}

/// Headers the public site expects from a desktop browser.
pub fn browser_headers(referer: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(BROWSER_USER_AGENT),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(reqwest::header::REFERER, value);
    }
    headers
}

/// Headers impersonating the Android app client.
pub fn app_headers(referer: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(APP_USER_AGENT),
    );
    for (name, value) in [
        ("app-id", "cn.sts.xiaoyun.ordermeals"),
        ("app-version", "1.0.31"),
        ("device-code", "8ff8b26a65d018060e5936206fc2a3e8"),
        ("device-id", "TQ3A.230901.001"),
    ] {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(reqwest::header::REFERER, value);
    }
    headers
}

/// Plain JSON API headers.
pub fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(concat!("mangafetch/", env!("CARGO_PKG_VERSION"))),
    );
    headers
}
