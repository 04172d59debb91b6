//! Retrieval orchestration: policy, robots, fetch, and browser escalation.
//!
//! Every retrieval walks a small state machine:
//!
//! ```text
//! pending ─┬─ http ──────▶ http_attempted ──ok──▶ resolved
//!          │                    │ needs_render (auto only)
//!          │                    ▼
//!          └─ browser ───▶ browser_attempted ──ok──▶ resolved
//! ```
//!
//! Any other error from either attempt moves to `failed` and is returned
//! unchanged. Policy and robots checks run once, before any network call to
//! the target.

use std::sync::Arc;

use bytes::Bytes;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use pagefetch_core::{AppConfig, CacheHit, ContentCache, Document, Error, ErrorCode, PolicyGate, RobotsStance};

use crate::fetch::{FetchOutcome, FetchSettings, Fetcher, RobotsGuard, canonicalize};
use crate::render::{BrowserEngine, PageRenderer, RenderOutcome, RenderSettings};

/// How a caller wants the page retrieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    /// Plain HTTP only.
    #[default]
    Http,
    /// Browser rendering only.
    Browser,
    /// HTTP first, escalating to the browser on `needs_render`. Permissive policy only.
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalState {
    Pending,
    HttpAttempted,
    BrowserAttempted,
    Resolved,
    Failed,
}

/// Result of the most recent step, fed into [`next_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Start,
    Succeeded,
    Failed(ErrorCode),
}

/// Pure transition function of the escalation state machine.
pub fn next_state(method: RetrievalMethod, state: RetrievalState, outcome: Outcome) -> RetrievalState {
    use RetrievalState::*;
    match (state, outcome) {
        (Pending, _) if method == RetrievalMethod::Browser => BrowserAttempted,
        (Pending, _) => HttpAttempted,
        (HttpAttempted | BrowserAttempted, Outcome::Succeeded) => Resolved,
        (HttpAttempted, Outcome::Failed(ErrorCode::NeedsRender)) if method == RetrievalMethod::Auto => BrowserAttempted,
        (HttpAttempted | BrowserAttempted, Outcome::Failed(_)) => Failed,
        (HttpAttempted | BrowserAttempted, Outcome::Start) | (Resolved | Failed, _) => state,
    }
}

/// A successful retrieval.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub document: Document,
    pub body: Bytes,
    pub cache_hit: Option<CacheHit>,
    /// Non-fatal notices: robots warn-mode, escalation, profile reuse, headful mode.
    pub warnings: Vec<String>,
    /// States visited, `pending` first.
    pub trail: Vec<RetrievalState>,
}

struct Attempt {
    document: Document,
    body: Bytes,
    cache_hit: Option<CacheHit>,
    warnings: Vec<String>,
}

impl From<FetchOutcome> for Attempt {
    fn from(outcome: FetchOutcome) -> Self {
        Self { document: outcome.document, body: outcome.body, cache_hit: outcome.cache_hit, warnings: Vec::new() }
    }
}

impl From<RenderOutcome> for Attempt {
    fn from(outcome: RenderOutcome) -> Self {
        Self { document: outcome.document, body: Bytes::from(outcome.html), cache_hit: None, warnings: outcome.warnings }
    }
}

/// Composes the policy gate, robots guard, fetcher, and renderer.
#[derive(Debug, Clone)]
pub struct Retriever {
    gate: PolicyGate,
    robots: RobotsGuard,
    robots_stance: RobotsStance,
    fetcher: Fetcher,
    renderer: PageRenderer,
}

impl Retriever {
    pub fn new(
        gate: PolicyGate, robots_stance: RobotsStance, fetcher: Fetcher, renderer: PageRenderer,
    ) -> Result<Self, Error> {
        let settings = fetcher.settings();
        let robots = RobotsGuard::new(settings.user_agent(), settings.timeout, settings.proxy.as_deref())?;
        Ok(Self { gate, robots, robots_stance, fetcher, renderer })
    }

    /// Wire every component from configuration.
    pub fn from_config(config: &AppConfig, engine: Option<Arc<dyn BrowserEngine>>) -> Result<Self, Error> {
        let cache_settings = config.cache_settings().map_err(|e| Error::invalid_usage(e.to_string()))?;
        let fetcher = Fetcher::new(FetchSettings::from_config(config)?, ContentCache::new(cache_settings))?;
        let renderer = PageRenderer::new(engine, RenderSettings::from_config(config));
        Self::new(config.policy_gate(), config.robots, fetcher, renderer)
    }

    pub fn cache(&self) -> &ContentCache {
        self.fetcher.cache()
    }

    pub fn renderer(&self) -> &PageRenderer {
        &self.renderer
    }

    /// Retrieve `input` with the requested method.
    pub async fn retrieve(&self, input: &str, method: RetrievalMethod) -> Result<Retrieval, Error> {
        let url = canonicalize(input).map_err(|e| e.into_error(input))?;

        if method == RetrievalMethod::Auto {
            self.gate.check_escalation()?;
        }
        let operation = if method == RetrievalMethod::Browser { "render" } else { "fetch" };
        self.gate.check_url(url.as_str(), operation)?;
        if method != RetrievalMethod::Http {
            self.gate.check_profile(self.renderer.settings().uses_profile())?;
        }

        let mut warnings = Vec::new();
        if let Some(warning) = self.robots.check(&url, self.robots_stance).await? {
            warnings.push(warning);
        }

        let mut state = next_state(method, RetrievalState::Pending, Outcome::Start);
        let mut trail = vec![RetrievalState::Pending, state];

        let attempt = loop {
            let result = match state {
                RetrievalState::HttpAttempted => self.fetcher.fetch(&url).await.map(Attempt::from),
                _ => self.renderer.render(&url).await.map(Attempt::from),
            };

            match result {
                Ok(attempt) => {
                    trail.push(next_state(method, state, Outcome::Succeeded));
                    break attempt;
                }
                Err(err) => {
                    let next = next_state(method, state, Outcome::Failed(err.code));
                    trail.push(next);
                    if next != RetrievalState::BrowserAttempted {
                        tracing::debug!(url = %url, code = %err.code, ?trail, "retrieval failed");
                        return Err(err);
                    }
                    tracing::info!(url = %url, "HTTP fetch needs rendering, escalating to browser");
                    warnings.push(format!("escalated to browser rendering: {}", err.message));
                    state = next;
                }
            }
        };

        warnings.extend(attempt.warnings);
        Ok(Retrieval { document: attempt.document, body: attempt.body, cache_hit: attempt.cache_hit, warnings, trail })
    }
}
