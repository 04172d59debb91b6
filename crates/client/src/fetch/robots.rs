//! robots.txt evaluation under a warn / respect / ignore stance.
//!
//! The guard fails open: a network error, a non-200 response, or an oversized
//! robots.txt counts as "allowed". Nothing is cached between calls.

use std::time::Duration;

use robotstxt_rs::RobotsTxt;
use url::{Position, Url};

use pagefetch_core::{Error, ErrorCode, ErrorDetails, RobotsStance};

use super::url::robots_url;

/// Upper bound on the robots.txt request timeout.
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum size of robots.txt to evaluate (1MB).
const MAX_ROBOTS_SIZE: usize = 1024 * 1024;

/// Result of evaluating robots.txt for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotsCheck {
    pub url: String,
    pub robots_url: Option<String>,
    pub allowed: bool,
    /// HTTP status of the robots.txt response, if one arrived.
    pub status: Option<u16>,
}

impl RobotsCheck {
    fn allowed(url: &Url, robots_url: Option<String>, status: Option<u16>) -> Self {
        Self { url: url.to_string(), robots_url, allowed: true, status }
    }
}

/// Apply a stance to a check.
///
/// Returns a warning for a disallowed URL under `warn`, and `robots_disallowed`
/// under `respect`.
pub fn apply_stance(check: &RobotsCheck, stance: RobotsStance) -> Result<Option<String>, Error> {
    if check.allowed || stance == RobotsStance::Ignore {
        return Ok(None);
    }
    let robots_url = check.robots_url.clone().unwrap_or_default();
    match stance {
        RobotsStance::Respect => Err(Error::new(ErrorCode::RobotsDisallowed, "robots.txt disallows this URL")
            .with_details(ErrorDetails {
                robots_url: Some(robots_url),
                next_steps: vec!["set robots=warn or robots=ignore to proceed anyway".into()],
                ..ErrorDetails::for_url(&check.url)
            })),
        _ => Ok(Some(format!("robots.txt disallows {} ({robots_url}); proceeding under robots=warn", check.url))),
    }
}

/// Fetches and evaluates robots.txt for a target URL.
#[derive(Debug, Clone)]
pub struct RobotsGuard {
    http: reqwest::Client,
    user_agent: String,
}

impl RobotsGuard {
    /// Build a guard whose requests use `min(timeout, 10s)` and the given proxy.
    pub fn new(user_agent: impl Into<String>, timeout: Duration, proxy: Option<&str>) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout.min(ROBOTS_TIMEOUT))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::invalid_usage(format!("invalid proxy URL: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| Error::new(ErrorCode::NetworkError, format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, user_agent: user_agent.into() })
    }

    /// Check `url` under `stance`, returning an optional warning.
    ///
    /// `ignore` never touches the network.
    pub async fn check(&self, url: &Url, stance: RobotsStance) -> Result<Option<String>, Error> {
        if stance == RobotsStance::Ignore {
            return Ok(None);
        }
        let check = self.evaluate(url).await;
        tracing::debug!(url = %url, allowed = check.allowed, status = ?check.status, "robots.txt evaluated");
        let warning = apply_stance(&check, stance)?;
        if let Some(warning) = &warning {
            tracing::warn!("{warning}");
        }
        Ok(warning)
    }

    /// Fetch and evaluate robots.txt for `url`, failing open.
    pub async fn evaluate(&self, url: &Url) -> RobotsCheck {
        let Some(robots_url) = robots_url(url) else {
            return RobotsCheck::allowed(url, None, None);
        };

        let response = match self
            .http
            .get(&robots_url)
            .header("user-agent", &self.user_agent)
            .header("accept", "text/plain,*/*")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("robots.txt fetch failed for {robots_url}, allowing: {e}");
                return RobotsCheck::allowed(url, Some(robots_url), None);
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            return RobotsCheck::allowed(url, Some(robots_url), Some(status));
        }
        if response.content_length().is_some_and(|len| len as usize > MAX_ROBOTS_SIZE) {
            return RobotsCheck::allowed(url, Some(robots_url), Some(status));
        }

        let bytes = match response.bytes().await {
            Ok(bytes) if bytes.len() <= MAX_ROBOTS_SIZE => bytes,
            _ => return RobotsCheck::allowed(url, Some(robots_url), Some(status)),
        };

        let content = String::from_utf8_lossy(&bytes);
        let robots = RobotsTxt::parse(&content);
        // Rules match against the path and query, never the absolute URL.
        let allowed = robots.can_fetch(&self.user_agent, &url[Position::BeforePath..]);

        RobotsCheck { url: url.to_string(), robots_url: Some(robots_url), allowed, status: Some(status) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn guard() -> RobotsGuard {
        RobotsGuard::new("pagefetch-test/0.1", Duration::from_secs(5), None).unwrap()
    }

    fn disallowed() -> RobotsCheck {
        RobotsCheck {
            url: "https://example.com/private".into(),
            robots_url: Some("https://example.com/robots.txt".into()),
            allowed: false,
            status: Some(200),
        }
    }

    #[test]
    fn test_apply_stance() {
        let check = disallowed();

        let warning = apply_stance(&check, RobotsStance::Warn).unwrap().unwrap();
        assert!(warning.contains("https://example.com/private"));

        let err = apply_stance(&check, RobotsStance::Respect).unwrap_err();
        assert_eq!(err.code, ErrorCode::RobotsDisallowed);
        assert_eq!(err.exit_code(), 4);
        assert_eq!(err.details.robots_url.as_deref(), Some("https://example.com/robots.txt"));

        assert_eq!(apply_stance(&check, RobotsStance::Ignore).unwrap(), None);

        let allowed = RobotsCheck { allowed: true, ..check };
        assert_eq!(apply_stance(&allowed, RobotsStance::Respect).unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_error_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/private/page", server.uri())).unwrap();
        let check = guard().evaluate(&url).await;
        assert!(check.allowed);
        assert_eq!(check.status, Some(500));
        assert!(guard().check(&url, RobotsStance::Respect).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_robots_allows() {
        let server = MockServer::start().await;
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let check = guard().evaluate(&url).await;
        assert!(check.allowed);
        assert_eq!(check.status, Some(404));
        assert_eq!(check.robots_url, Some(format!("{}/robots.txt", server.uri())));
    }

    #[tokio::test]
    async fn test_unreachable_host_allows() {
        let server = MockServer::start().await;
        let uri = server.uri();
        drop(server);

        let url = Url::parse(&format!("{uri}/page")).unwrap();
        let check = guard().evaluate(&url).await;
        assert!(check.allowed);
        assert_eq!(check.status, None);
    }

    #[tokio::test]
    async fn test_allow_all_robots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/docs", server.uri())).unwrap();
        assert!(guard().check(&url, RobotsStance::Respect).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ignore_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        assert!(guard().check(&url, RobotsStance::Ignore).await.unwrap().is_none());
    }

    async fn serve_robots(server: &MockServer, body: &str) {
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_disallow_rule_applies_to_path() {
        let server = MockServer::start().await;
        serve_robots(&server, "User-agent: *\nDisallow: /private").await;

        let blocked = Url::parse(&format!("{}/private/page?q=1", server.uri())).unwrap();
        let check = guard().evaluate(&blocked).await;
        assert!(!check.allowed);
        assert_eq!(check.status, Some(200));

        let open = Url::parse(&format!("{}/public", server.uri())).unwrap();
        assert!(guard().evaluate(&open).await.allowed);
    }

    #[tokio::test]
    async fn test_respect_raises_robots_disallowed() {
        let server = MockServer::start().await;
        serve_robots(&server, "User-agent: *\nDisallow: /private").await;

        let url = Url::parse(&format!("{}/private/page", server.uri())).unwrap();
        let err = guard().check(&url, RobotsStance::Respect).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RobotsDisallowed);
        assert_eq!(err.details.robots_url, Some(format!("{}/robots.txt", server.uri())));
        assert_eq!(err.details.url.as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn test_warn_returns_warning() {
        let server = MockServer::start().await;
        serve_robots(&server, "User-agent: *\nDisallow: /private").await;

        let url = Url::parse(&format!("{}/private/page", server.uri())).unwrap();
        let warning = guard().check(&url, RobotsStance::Warn).await.unwrap().unwrap();
        assert!(warning.contains("/private/page"));
        assert!(warning.contains("robots=warn"));
    }
}
