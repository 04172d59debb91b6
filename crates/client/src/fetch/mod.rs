//! HTTP fetch path with response classification and caching.
//!
//! ### Flow
//! - Cache key from the canonical URL plus the canonical request headers.
//!   A hit rebuilds the [`Document`] from stored metadata with no network call.
//! - One GET per miss; no retries.
//! - `404` → `not_found`; `401`/`403`/`429` → `blocked`; anything else proceeds.
//! - Byte budget enforced after download, before any cache write.
//! - Content type taken from the header, sniffed when missing or generic.
//! - Textual bodies scanned for needs-render and bot-wall phrases.
//! - Successful bodies persisted with a fixed header subset.

pub mod detect;
pub mod robots;
pub mod sniff;
pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::{Client, Url, header};

pub use self::robots::{RobotsCheck, RobotsGuard, apply_stance};
pub use self::url::{UrlError, canonicalize, robots_url};

use pagefetch_core::cache::compute_cache_key;
use pagefetch_core::headers::build_request_headers;
use pagefetch_core::{
    AppConfig, ArtifactInfo, CacheHit, ContentCache, Document, EntryMeta, Error, ErrorCode, ErrorDetails, FetchMethod,
    HttpInfo,
};

/// Response headers kept in cache metadata and `HttpInfo`.
pub const HEADER_SUBSET: [&str; 4] = ["content-type", "content-language", "last-modified", "etag"];

/// Redirect hops followed when redirects are enabled.
const MAX_REDIRECTS: usize = 10;

pub const DEFAULT_USER_AGENT: &str = "pagefetch/0.1";

/// Per-request HTTP behaviour.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub proxy: Option<String>,
    /// Complete outgoing header set, lower-cased names. Part of the cache key.
    pub headers: BTreeMap<String, String>,
    pub max_bytes: u64,
    pub follow_redirects: bool,
    pub detect_blocks: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(15_000),
            proxy: None,
            headers: build_request_headers(DEFAULT_USER_AGENT, &BTreeMap::new()).unwrap_or_default(),
            max_bytes: 5 * 1024 * 1024,
            follow_redirects: true,
            detect_blocks: true,
        }
    }
}

impl FetchSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Ok(Self {
            timeout: config.timeout(),
            proxy: config.proxy.clone(),
            headers: build_request_headers(&config.user_agent, &config.headers)?,
            max_bytes: config.max_bytes,
            follow_redirects: config.follow_redirects,
            detect_blocks: config.detect_blocks,
        })
    }

    pub fn user_agent(&self) -> &str {
        self.headers.get("user-agent").map(String::as_str).unwrap_or(DEFAULT_USER_AGENT)
    }
}

/// A retrieved body and its document.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub document: Document,
    pub body: Bytes,
    /// Set when the body came from the cache.
    pub cache_hit: Option<CacheHit>,
}

/// HTTP fetcher backed by the content cache.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: Client,
    settings: FetchSettings,
    cache: ContentCache,
}

impl Fetcher {
    /// Create a fetcher with the given settings.
    pub fn new(settings: FetchSettings, cache: ContentCache) -> Result<Self, Error> {
        let redirect = if settings.follow_redirects {
            reqwest::redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = Client::builder()
            .timeout(settings.timeout)
            .redirect(redirect)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);
        if let Some(proxy) = &settings.proxy {
            let proxy =
                reqwest::Proxy::all(proxy).map_err(|e| Error::invalid_usage(format!("invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| Error::new(ErrorCode::NetworkError, format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, settings, cache })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn cache_key(&self, url: &Url) -> String {
        compute_cache_key(url.as_str(), &self.settings.headers)
    }

    /// Fetch a canonical URL, serving from the cache when possible.
    pub async fn fetch(&self, url: &Url) -> Result<FetchOutcome, Error> {
        let key = self.cache_key(url);
        if let Some(hit) = self.cache.get(&key) {
            match std::fs::read(&hit.body_path) {
                Ok(body) => {
                    tracing::debug!(url = %url, key = %key, "serving from cache");
                    return Ok(FetchOutcome { document: document_from_hit(url, &hit), body: body.into(), cache_hit: Some(hit) });
                }
                Err(e) => {
                    tracing::debug!(key = %key, "cached body unreadable, refetching: {e}");
                    self.cache.invalidate(&key);
                }
            }
        }

        let start = Instant::now();
        let mut request = self.http.get(url.as_str());
        for (name, value) in &self.settings.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| self.transport_error(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();

        if let Some(err) = detect::classify_status(url.as_str(), &final_url, status, false) {
            return Err(err);
        }

        let max_bytes = self.settings.max_bytes;
        if let Some(len) = response.content_length()
            && len > max_bytes
        {
            return Err(too_large(url.as_str(), len, max_bytes));
        }

        let headers = header_subset(response.headers());
        let declared = response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);

        let body = response.bytes().await.map_err(|e| self.transport_error(url, e))?;
        if body.len() as u64 > max_bytes {
            return Err(too_large(url.as_str(), body.len() as u64, max_bytes));
        }

        let content_type = sniff::resolve_content_type(declared.as_deref(), &body);

        if self.settings.detect_blocks
            && sniff::is_textual(content_type.as_deref())
            && let Some(detection) = detect::classify(&detect::scan_prefix(&body))
        {
            tracing::debug!(url = %url, verdict = ?detection.verdict, pattern = %detection.pattern, "content heuristic matched");
            return Err(detection.into_error(url.as_str(), &final_url, status, false));
        }

        let entry = EntryMeta {
            status,
            final_url: final_url.clone(),
            headers: headers.clone(),
            content_type: content_type.clone(),
            bytes: body.len() as u64,
        };
        let body_path = match self.cache.put(&key, entry, &body) {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                tracing::warn!(url = %url, "cache write failed, continuing without a stored body: {e}");
                None
            }
        };

        tracing::debug!(
            "fetched {} -> {} in {}ms ({} bytes)",
            url,
            final_url,
            start.elapsed().as_millis(),
            body.len()
        );

        let document = Document::new(&final_url, FetchMethod::Http)
            .with_http(HttpInfo { status, final_url: final_url.clone(), headers })
            .with_artifact(ArtifactInfo { body_path, content_type, bytes: Some(body.len() as u64) });

        Ok(FetchOutcome { document, body, cache_hit: None })
    }

    fn transport_error(&self, url: &Url, e: reqwest::Error) -> Error {
        let details = ErrorDetails { error: Some(e.to_string()), ..ErrorDetails::for_url(url.as_str()) };
        if e.is_timeout() {
            Error::new(ErrorCode::Timeout, format!("request timed out after {}ms", self.settings.timeout.as_millis()))
                .with_details(details)
        } else {
            Error::new(ErrorCode::NetworkError, format!("network error: {e}")).with_details(details)
        }
    }
}

fn too_large(url: &str, bytes: u64, max_bytes: u64) -> Error {
    Error::new(ErrorCode::TooLarge, format!("response exceeded max_bytes ({max_bytes})")).with_details(ErrorDetails {
        bytes: Some(bytes),
        max_bytes: Some(max_bytes),
        ..ErrorDetails::for_url(url)
    })
}

/// Keep only [`HEADER_SUBSET`] from a response header map.
pub fn header_subset(headers: &header::HeaderMap) -> BTreeMap<String, String> {
    HEADER_SUBSET
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

fn document_from_hit(url: &Url, hit: &CacheHit) -> Document {
    let entry = &hit.meta.entry;
    let final_url = if entry.final_url.is_empty() { url.to_string() } else { entry.final_url.clone() };
    Document::new(&final_url, FetchMethod::Http)
        .with_http(HttpInfo { status: entry.status, final_url: final_url.clone(), headers: entry.headers.clone() })
        .with_artifact(ArtifactInfo {
            body_path: Some(hit.body_path.display().to_string()),
            content_type: entry.content_type.clone(),
            bytes: Some(entry.bytes),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagefetch_core::CacheSettings;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(dir: &std::path::Path, settings: FetchSettings) -> Fetcher {
        Fetcher::new(settings, ContentCache::new(CacheSettings::new(dir))).unwrap()
    }

    fn url_for(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{p}", server.uri())).unwrap()
    }

    const PAGE: &str = "<!doctype html><html><head><title>Docs</title></head><body><h1>Hello</h1></body></html>";

    #[test]
    fn test_settings_from_config() {
        let config = AppConfig {
            user_agent: "custom/2".into(),
            headers: BTreeMap::from([("X-Trace".to_string(), "1".to_string())]),
            follow_redirects: false,
            ..Default::default()
        };
        let settings = FetchSettings::from_config(&config).unwrap();
        assert_eq!(settings.user_agent(), "custom/2");
        assert_eq!(settings.headers["x-trace"], "1");
        assert!(!settings.follow_redirects);
        assert_eq!(settings.timeout, Duration::from_millis(15_000));
    }

    #[tokio::test]
    async fn test_fetch_then_cache_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .insert_header("etag", "\"v1\"")
                    .insert_header("x-request-id", "abc")
                    .set_body_string(PAGE),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(dir.path(), FetchSettings::default());
        let url = url_for(&server, "/page");

        let first = fetcher.fetch(&url).await.unwrap();
        assert!(first.cache_hit.is_none());
        assert_eq!(first.body.as_ref(), PAGE.as_bytes());
        let http = first.document.http.as_ref().unwrap();
        assert_eq!(http.status, 200);
        assert_eq!(http.headers.get("etag").map(String::as_str), Some("\"v1\""));
        assert!(!http.headers.contains_key("x-request-id"));
        let artifact = first.document.artifact.as_ref().unwrap();
        assert_eq!(artifact.content_type.as_deref(), Some("text/html; charset=utf-8"));
        assert_eq!(artifact.bytes, Some(PAGE.len() as u64));
        assert!(artifact.body_path.is_some());

        let second = fetcher.fetch(&url).await.unwrap();
        assert!(second.cache_hit.is_some());
        assert_eq!(second.body, first.body);
        assert_eq!(second.document.http, first.document.http);
        assert_eq!(second.document.artifact, first.document.artifact);
    }

    #[tokio::test]
    async fn test_fresh_mode_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(CacheSettings { fresh: true, ..CacheSettings::new(dir.path()) });
        let fetcher = Fetcher::new(FetchSettings::default(), cache).unwrap();
        let url = url_for(&server, "/page");

        assert!(fetcher.fetch(&url).await.unwrap().cache_hit.is_none());
        assert!(fetcher.fetch(&url).await.unwrap().cache_hit.is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(dir.path(), FetchSettings::default());

        let err = fetcher.fetch(&url_for(&server, "/missing")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.exit_code(), 3);
        assert!(!dir.path().join("items").exists());
    }

    #[tokio::test]
    async fn test_blocked_statuses() {
        let server = MockServer::start().await;
        for status in [401u16, 403, 429] {
            Mock::given(method("GET"))
                .and(path(format!("/s{status}")))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let fetcher = fetcher(dir.path(), FetchSettings::default());
        for status in [401u16, 403, 429] {
            let err = fetcher.fetch(&url_for(&server, &format!("/s{status}"))).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::Blocked);
            assert_eq!(err.details.status, Some(status));
            assert_eq!(err.details.reason.as_deref(), Some("http_status"));
            assert!(!err.details.next_steps.is_empty());
        }
    }

    #[tokio::test]
    async fn test_server_error_proceeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let outcome = fetcher(dir.path(), FetchSettings::default()).fetch(&url_for(&server, "/x")).await.unwrap();
        assert_eq!(outcome.document.http.unwrap().status, 500);
    }

    #[tokio::test]
    async fn test_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(100)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let settings = FetchSettings { max_bytes: 10, ..Default::default() };
        let err = fetcher(dir.path(), settings).fetch(&url_for(&server, "/big")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TooLarge);
        assert_eq!(err.details.bytes, Some(100));
        assert_eq!(err.details.max_bytes, Some(10));
        assert!(!dir.path().join("items").exists());
    }

    #[tokio::test]
    async fn test_needs_render_before_block_wall() {
        let server = MockServer::start().await;
        let html = "<html><body>Please verify you are human. You need to enable JavaScript to run this app.</body></html>";
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html").set_body_string(html))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(dir.path(), FetchSettings::default()).fetch(&url_for(&server, "/app")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NeedsRender);
        assert_eq!(err.exit_code(), 5);
        assert!(err.details.pattern.is_some());
    }

    #[tokio::test]
    async fn test_detection_can_be_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<h1>Access Denied</h1>"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = url_for(&server, "/wall");
        let err = fetcher(dir.path(), FetchSettings::default()).fetch(&url).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Blocked);
        assert_eq!(err.details.reason.as_deref(), Some("bot_wall"));

        let settings = FetchSettings { detect_blocks: false, ..Default::default() };
        assert!(fetcher(dir.path(), settings).fetch(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_binary_bodies_are_not_scanned() {
        let server = MockServer::start().await;
        let mut pdf = b"%PDF-1.7\n".to_vec();
        pdf.extend_from_slice(b"access denied");
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).insert_header("content-type", "application/octet-stream").set_body_bytes(pdf),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let outcome = fetcher(dir.path(), FetchSettings::default()).fetch(&url_for(&server, "/doc")).await.unwrap();
        let artifact = outcome.document.artifact.unwrap();
        assert_eq!(artifact.content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn test_redirect_records_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let outcome = fetcher(dir.path(), FetchSettings::default()).fetch(&url_for(&server, "/old")).await.unwrap();
        let http = outcome.document.http.unwrap();
        assert_eq!(http.final_url, format!("{}/new", server.uri()));
        assert_eq!(outcome.document.url, http.final_url);
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let settings = FetchSettings { timeout: Duration::from_millis(200), ..Default::default() };
        let err = fetcher(dir.path(), settings).fetch(&url_for(&server, "/slow")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_headers_reach_server_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(wiremock::matchers::header("user-agent", "pagefetch/0.1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let default = fetcher(dir.path(), FetchSettings::default());
        let url = url_for(&server, "/h");
        default.fetch(&url).await.unwrap();

        let mut headers = FetchSettings::default().headers;
        headers.insert("accept-language".into(), "de".into());
        let german = fetcher(dir.path(), FetchSettings { headers, ..Default::default() });
        assert_ne!(default.cache_key(&url), german.cache_key(&url));
    }
}
