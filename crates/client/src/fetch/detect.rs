//! Bot-wall and needs-render heuristics over response bodies.
//!
//! Needs-render patterns are checked before block-wall patterns: a page asking
//! the reader to enable JavaScript should escalate to a browser rather than be
//! reported as a wall.

use std::sync::LazyLock;

use regex::Regex;

use pagefetch_core::{Error, ErrorCode, ErrorDetails};

/// Bytes of body decoded for scanning.
pub const SCAN_LIMIT: usize = 200_000;

const NEEDS_RENDER_SOURCES: &[&str] = &[
    r"(?i)enable javascript",
    r"(?i)requires javascript",
    r"(?i)javascript is (?:required|disabled)",
    r"(?is)<noscript[^>]*>[^<]{0,500}javascript",
];

const BLOCK_SOURCES: &[&str] = &[
    r"(?i)checking your browser",
    r"(?i)verify you are (?:a )?human",
    r"(?i)access denied",
    r"(?i)unusual traffic",
    r"(?i)are you a robot",
];

static NEEDS_RENDER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(NEEDS_RENDER_SOURCES));
static BLOCK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(BLOCK_SOURCES));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).expect("invalid pattern")).collect()
}

/// Which heuristic fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    NeedsRender,
    BlockWall,
}

/// A heuristic hit: the verdict and the pattern source that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub verdict: Verdict,
    pub pattern: String,
}

/// Decode the scanned prefix of a body, dropping invalid UTF-8.
pub fn scan_prefix(body: &[u8]) -> String {
    String::from_utf8_lossy(&body[..body.len().min(SCAN_LIMIT)]).replace('\u{FFFD}', "")
}

fn first_match(text: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find(|p| p.is_match(text)).map(|p| p.as_str().to_string())
}

/// Classify text, needs-render first.
pub fn classify(text: &str) -> Option<Detection> {
    if let Some(pattern) = first_match(text, &NEEDS_RENDER_PATTERNS) {
        return Some(Detection { verdict: Verdict::NeedsRender, pattern });
    }
    detect_block_wall(text)
}

/// Only the block-wall set, for DOM that was already rendered.
pub fn detect_block_wall(text: &str) -> Option<Detection> {
    first_match(text, &BLOCK_PATTERNS).map(|pattern| Detection { verdict: Verdict::BlockWall, pattern })
}

/// Suggestions attached to blocked and needs-render errors.
pub fn next_steps(verdict: Verdict, rendered: bool) -> Vec<String> {
    match (verdict, rendered) {
        (Verdict::NeedsRender, _) => vec![
            "retry with method=browser to render the page".into(),
            "or use method=auto under the permissive policy to escalate automatically".into(),
        ],
        (Verdict::BlockWall, false) => vec![
            "retry with method=browser; some walls only challenge plain HTTP clients".into(),
            "reuse a browser profile that has already passed the challenge".into(),
        ],
        (Verdict::BlockWall, true) => vec![
            "reuse a browser profile that has already passed the challenge".into(),
            "retry in headful mode to complete the challenge manually".into(),
        ],
    }
}

/// Error for a status code in {401, 403, 429}.
pub fn blocked_status(url: &str, final_url: &str, status: u16, rendered: bool) -> Error {
    Error::new(ErrorCode::Blocked, format!("URL blocked or access denied (HTTP {status})")).with_details(ErrorDetails {
        final_url: Some(final_url.to_string()),
        status: Some(status),
        reason: Some("http_status".into()),
        next_steps: next_steps(Verdict::BlockWall, rendered),
        ..ErrorDetails::for_url(url)
    })
}

pub fn not_found(url: &str, final_url: &str) -> Error {
    Error::new(ErrorCode::NotFound, "URL returned 404 (not found)").with_details(ErrorDetails {
        final_url: Some(final_url.to_string()),
        status: Some(404),
        ..ErrorDetails::for_url(url)
    })
}

/// Map a status code to `not_found` / `blocked`, or `None` to proceed.
pub fn classify_status(url: &str, final_url: &str, status: u16, rendered: bool) -> Option<Error> {
    match status {
        404 => Some(not_found(url, final_url)),
        401 | 403 | 429 => Some(blocked_status(url, final_url, status, rendered)),
        _ => None,
    }
}

impl Detection {
    /// Turn a heuristic hit into the structured error callers see.
    pub fn into_error(self, url: &str, final_url: &str, status: u16, rendered: bool) -> Error {
        let (code, message, reason) = match self.verdict {
            Verdict::NeedsRender => {
                (ErrorCode::NeedsRender, "page appears to require JavaScript rendering", "needs_render")
            }
            Verdict::BlockWall if rendered => (ErrorCode::Blocked, "blocked/bot wall detected in rendered DOM", "bot_wall"),
            Verdict::BlockWall => (ErrorCode::Blocked, "blocked/bot wall detected in HTML", "bot_wall"),
        };
        Error::new(code, message).with_details(ErrorDetails {
            final_url: Some(final_url.to_string()),
            status: Some(status),
            reason: Some(reason.into()),
            pattern: Some(self.pattern),
            next_steps: next_steps(self.verdict, rendered),
            ..ErrorDetails::for_url(url)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_pattern_compiles() {
        assert_eq!(NEEDS_RENDER_PATTERNS.len(), NEEDS_RENDER_SOURCES.len());
        assert_eq!(BLOCK_PATTERNS.len(), BLOCK_SOURCES.len());
    }

    #[test]
    fn test_needs_render_wins_over_block() {
        let html = "<html><body><p>Please verify you are human</p><p>You need to enable JavaScript to run this app.</p></body></html>";
        let detection = classify(html).unwrap();
        assert_eq!(detection.verdict, Verdict::NeedsRender);
        assert!(detection.pattern.contains("enable javascript"));
    }

    #[test]
    fn test_block_wall() {
        let detection = classify("<title>Just a moment...</title> Checking your browser before accessing").unwrap();
        assert_eq!(detection.verdict, Verdict::BlockWall);
        assert!(classify("<h1>Access Denied</h1>").is_some());
        assert!(classify("Our systems have detected unusual traffic").is_some());
    }

    #[test]
    fn test_plain_page_passes() {
        let html = "<html><head><title>Docs</title></head><body><h1>Install</h1><p>Run cargo.</p></body></html>";
        assert_eq!(classify(html), None);
    }

    #[test]
    fn test_noscript_needs_javascript_mention() {
        assert_eq!(classify("<noscript><img src=\"pixel.gif\"></noscript>"), None);
        let detection = classify("<noscript>This site works best with JavaScript turned on</noscript>").unwrap();
        assert_eq!(detection.verdict, Verdict::NeedsRender);
    }

    #[test]
    fn test_rendered_dom_ignores_needs_render_set() {
        assert_eq!(detect_block_wall("please enable javascript"), None);
        assert!(detect_block_wall("are you a robot?").is_some());
    }

    #[test]
    fn test_scan_prefix_bounds() {
        let body = vec![b'a'; SCAN_LIMIT + 10];
        assert_eq!(scan_prefix(&body).len(), SCAN_LIMIT);
        assert_eq!(scan_prefix(&[b'o', 0xff, b'k']), "ok");
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status("u", "f", 404, false).unwrap().code, ErrorCode::NotFound);
        for status in [401, 403, 429] {
            let err = classify_status("u", "f", status, false).unwrap();
            assert_eq!(err.code, ErrorCode::Blocked);
            assert_eq!(err.details.reason.as_deref(), Some("http_status"));
            assert_eq!(err.details.status, Some(status));
        }
        assert!(classify_status("u", "f", 500, false).is_none());
        assert!(classify_status("u", "f", 200, false).is_none());
    }

    #[test]
    fn test_detection_error_details() {
        let err = classify("You need to enable JavaScript").unwrap().into_error(
            "https://example.com/app",
            "https://example.com/app/",
            200,
            false,
        );
        assert_eq!(err.code, ErrorCode::NeedsRender);
        assert_eq!(err.details.url.as_deref(), Some("https://example.com/app"));
        assert_eq!(err.details.final_url.as_deref(), Some("https://example.com/app/"));
        assert_eq!(err.details.status, Some(200));
        assert!(err.details.pattern.is_some());
        assert!(!err.details.next_steps.is_empty());
    }
}
