//! Browser rendering for pages that need script execution.
//!
//! [`PageRenderer`] drives a [`BrowserEngine`] capability and turns the
//! rendered page into a [`Document`] shaped exactly like a fetched one. The DOM
//! snapshot (and optional screenshot) land in an evidence directory that is an
//! audit trail: nothing there expires or is evicted.
//!
//! The engine is optional. Without one, rendering fails with
//! `missing_dependency` and the HTTP path keeps working.

#[cfg(feature = "render")]
pub mod chromium;
#[cfg(test)]
pub(crate) mod mock;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use pagefetch_core::cache::hash::short_digest;
use pagefetch_core::{
    AppConfig, ArtifactInfo, Document, Error, ErrorCode, ErrorDetails, FetchMethod, HttpInfo, RenderInfo,
};

use crate::fetch::detect;

#[cfg(feature = "render")]
pub use chromium::ChromiumEngine;

/// Errors that can occur during page rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Failed to get page content.
    #[error("content retrieval failed: {0}")]
    ContentRetrieval(String),

    /// Screenshot capture failed.
    #[error("screenshot failed: {0}")]
    Screenshot(String),

    /// Timeout waiting for page to load.
    #[error("render timeout after {0}ms")]
    Timeout(u64),

    /// Wait selector not found.
    #[error("wait_for selector not found: {0}")]
    SelectorNotFound(String),
}

impl RenderError {
    pub fn into_error(self, url: &Url) -> Error {
        let code = match self {
            RenderError::Timeout(_) => ErrorCode::Timeout,
            _ => ErrorCode::RenderFailed,
        };
        let message = match code {
            ErrorCode::Timeout => "render timed out",
            _ => "browser render failed",
        };
        Error::new(code, message)
            .with_details(ErrorDetails { error: Some(self.to_string()), ..ErrorDetails::for_url(url.as_str()) })
    }
}

/// What to wait for after the initial load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    Selector(String),
    NetworkIdle,
}

impl WaitCondition {
    /// `network-idle` or a CSS selector; blank input means no condition.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "" => None,
            "network-idle" => Some(WaitCondition::NetworkIdle),
            selector => Some(WaitCondition::Selector(selector.to_string())),
        }
    }
}

/// Per-navigation options handed to a [`BrowserEngine`].
#[derive(Debug, Clone)]
pub struct NavigateOptions {
    pub timeout_ms: u64,
    pub wait_for: Option<WaitCondition>,
    /// Fixed pause after load and wait condition.
    pub wait_ms: u64,
    /// Capture a full-page screenshot here when set.
    pub screenshot_path: Option<PathBuf>,
    pub headful: bool,
    pub profile_dir: Option<PathBuf>,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    pub viewport: (u32, u32),
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            wait_for: None,
            wait_ms: 0,
            screenshot_path: None,
            headful: false,
            profile_dir: None,
            proxy: None,
            user_agent: None,
            viewport: (1280, 720),
        }
    }
}

/// Result of rendering a page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Rendered HTML content.
    pub html: String,

    /// Final URL after redirects.
    pub final_url: Url,

    /// Status of the main navigation response, when the engine saw one.
    pub status: Option<u16>,

    /// Navigation response headers, lower-cased names.
    pub headers: BTreeMap<String, String>,

    /// Time taken to render in milliseconds.
    pub render_time_ms: u64,
}

/// Headless browser capability.
#[async_trait::async_trait]
pub trait BrowserEngine: Send + Sync + Debug {
    /// Engine label recorded in `RenderInfo.engine`.
    fn name(&self) -> &str;

    /// Load `url`, honour the wait options, and return the final DOM.
    ///
    /// Implementations must release every browser resource before returning,
    /// on success, error, and timeout alike.
    async fn navigate(&self, url: &Url, opts: &NavigateOptions) -> Result<RenderedPage, RenderError>;
}

/// A browser profile to reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserProfile {
    Custom(PathBuf),
    System(PathBuf),
}

impl BrowserProfile {
    pub fn label(&self) -> &'static str {
        match self {
            BrowserProfile::Custom(_) => "custom",
            BrowserProfile::System(_) => "system",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            BrowserProfile::Custom(path) | BrowserProfile::System(path) => path,
        }
    }
}

/// Default Chrome, Chromium, and Edge profile roots for this platform.
pub fn system_profile_candidates() -> Vec<PathBuf> {
    let names = if cfg!(target_os = "windows") {
        ["Google/Chrome/User Data", "Chromium/User Data", "Microsoft/Edge/User Data"]
    } else if cfg!(target_os = "macos") {
        ["Google/Chrome", "Chromium", "Microsoft Edge"]
    } else {
        ["google-chrome", "chromium", "microsoft-edge"]
    };
    let base = if cfg!(target_os = "windows") { dirs::data_local_dir() } else { dirs::config_dir() };
    base.map(|base| names.iter().map(|name| base.join(name)).collect()).unwrap_or_default()
}

/// First existing directory among `candidates`.
pub fn find_profile(candidates: &[PathBuf]) -> Result<PathBuf, Error> {
    candidates.iter().find(|path| path.is_dir()).cloned().ok_or_else(|| {
        let searched = candidates.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ");
        Error::new(ErrorCode::ProfileNotFound, "system browser profile not found").with_details(ErrorDetails {
            error: Some(format!("searched: {searched}")),
            next_steps: vec!["pass an explicit profile_dir instead".into()],
            ..Default::default()
        })
    })
}

/// Renderer options.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub timeout: Duration,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    pub wait_ms: u64,
    pub wait_for: Option<WaitCondition>,
    pub headful: bool,
    pub screenshot: bool,
    pub evidence_dir: PathBuf,
    pub profile_dir: Option<PathBuf>,
    pub use_system_profile: bool,
}

impl RenderSettings {
    pub fn new(evidence_dir: impl Into<PathBuf>) -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            proxy: None,
            user_agent: None,
            wait_ms: 0,
            wait_for: None,
            headful: false,
            screenshot: false,
            evidence_dir: evidence_dir.into(),
            profile_dir: None,
            use_system_profile: false,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let render = &config.render;
        Self {
            timeout: config.timeout(),
            proxy: config.proxy.clone(),
            user_agent: Some(config.user_agent.clone()),
            wait_ms: render.wait_ms,
            wait_for: render.wait_for.as_deref().and_then(WaitCondition::parse),
            headful: render.headful,
            screenshot: render.screenshot,
            evidence_dir: config.evidence_dir(),
            profile_dir: render.profile_dir.clone(),
            use_system_profile: render.use_system_profile,
        }
    }

    pub fn uses_profile(&self) -> bool {
        self.profile_dir.is_some() || self.use_system_profile
    }

    /// Resolve the configured profile. A custom directory is created on demand.
    pub fn resolve_profile(&self) -> Result<Option<BrowserProfile>, Error> {
        if let Some(dir) = &self.profile_dir {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::new(ErrorCode::RenderFailed, format!("cannot create profile directory: {e}"))
                    .with_details(ErrorDetails { error: Some(dir.display().to_string()), ..Default::default() })
            })?;
            return Ok(Some(BrowserProfile::Custom(dir.clone())));
        }
        if self.use_system_profile {
            return find_profile(&system_profile_candidates()).map(|path| Some(BrowserProfile::System(path)));
        }
        Ok(None)
    }
}

/// The browser engine this build can offer, if rendering is enabled.
pub fn engine_from_config(config: &AppConfig) -> Option<Arc<dyn BrowserEngine>> {
    if !config.render_enabled {
        return None;
    }
    #[cfg(feature = "render")]
    {
        Some(Arc::new(ChromiumEngine::new()))
    }
    #[cfg(not(feature = "render"))]
    {
        tracing::warn!("render_enabled is set but this build has no browser engine");
        None
    }
}

/// A rendered document plus the DOM it was built from.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub document: Document,
    pub html: String,
    pub warnings: Vec<String>,
}

/// Renders pages through an optional browser engine.
#[derive(Debug, Clone)]
pub struct PageRenderer {
    engine: Option<Arc<dyn BrowserEngine>>,
    settings: RenderSettings,
}

impl PageRenderer {
    pub fn new(engine: Option<Arc<dyn BrowserEngine>>, settings: RenderSettings) -> Self {
        Self { engine, settings }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    /// Render `url` and write evidence.
    ///
    /// Status codes and bot-wall phrases are classified after the DOM snapshot
    /// is written, so errors carry `dom_path` for inspection.
    pub async fn render(&self, url: &Url) -> Result<RenderOutcome, Error> {
        let Some(engine) = &self.engine else {
            return Err(Error::new(ErrorCode::MissingDependency, "a browser engine is required for rendering")
                .with_details(ErrorDetails {
                    next_steps: vec![
                        "set render_enabled = true".into(),
                        "build with the `render` feature and install Chrome or Chromium".into(),
                    ],
                    ..ErrorDetails::for_url(url.as_str())
                }));
        };

        let settings = &self.settings;
        let profile = settings.resolve_profile()?;
        let mut warnings = Vec::new();
        if let Some(profile) = &profile {
            warnings.push(format!(
                "reusing {} browser profile at {}; cookies and sessions are visible to the page",
                profile.label(),
                profile.path().display()
            ));
        }
        if settings.headful {
            warnings.push("rendering in headful mode; a browser window will open".to_string());
        }

        std::fs::create_dir_all(&settings.evidence_dir).map_err(|e| {
            Error::new(ErrorCode::RenderFailed, format!("cannot create evidence directory: {e}"))
                .with_details(ErrorDetails::for_url(url.as_str()))
        })?;
        let (dom_path, screenshot_path) = evidence_paths(&settings.evidence_dir, url.as_str());

        let opts = NavigateOptions {
            timeout_ms: settings.timeout.as_millis() as u64,
            wait_for: settings.wait_for.clone(),
            wait_ms: settings.wait_ms,
            screenshot_path: settings.screenshot.then(|| screenshot_path.clone()),
            headful: settings.headful,
            profile_dir: profile.as_ref().map(|p| p.path().to_path_buf()),
            proxy: settings.proxy.clone(),
            user_agent: settings.user_agent.clone(),
            ..Default::default()
        };

        tracing::info!(url = %url, engine = engine.name(), "rendering page");
        let page = engine.navigate(url, &opts).await.map_err(|e| e.into_error(url))?;

        std::fs::write(&dom_path, page.html.as_bytes()).map_err(|e| {
            Error::new(ErrorCode::RenderFailed, format!("cannot write DOM snapshot: {e}"))
                .with_details(ErrorDetails::for_url(url.as_str()))
        })?;
        let dom = dom_path.display().to_string();

        let final_url = page.final_url.to_string();
        let status = page.status.unwrap_or(0);
        let classified = detect::classify_status(url.as_str(), &final_url, status, true).or_else(|| {
            detect::detect_block_wall(&detect::scan_prefix(page.html.as_bytes()))
                .map(|d| d.into_error(url.as_str(), &final_url, status, true))
        });
        if let Some(mut err) = classified {
            err.details.dom_path = Some(dom);
            return Err(err);
        }

        let headers = subset(&page.headers);
        let content_type = normalize_content_type(headers.get("content-type")).unwrap_or_else(|| "text/html".into());
        tracing::debug!(url = %url, final_url = %final_url, render_ms = page.render_time_ms, "render complete");

        let document = Document::new(&final_url, FetchMethod::Browser)
            .with_http(HttpInfo { status, final_url: final_url.clone(), headers })
            .with_artifact(ArtifactInfo {
                body_path: Some(dom.clone()),
                content_type: Some(content_type),
                bytes: Some(page.html.len() as u64),
            })
            .with_render(RenderInfo {
                engine: engine.name().to_string(),
                dom_path: dom,
                screenshot_path: settings.screenshot.then(|| screenshot_path.display().to_string()),
                headful: settings.headful,
                profile: profile.map(|p| p.label().to_string()),
            });

        Ok(RenderOutcome { document, html: page.html, warnings })
    }
}

/// `render-<ms>-<hash12>.html` / `.png` inside `dir`.
fn evidence_paths(dir: &Path, url: &str) -> (PathBuf, PathBuf) {
    let stamp = chrono::Utc::now().timestamp_millis();
    let base = format!("render-{stamp}-{}", short_digest(url));
    (dir.join(format!("{base}.html")), dir.join(format!("{base}.png")))
}

fn subset(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    crate::fetch::HEADER_SUBSET
        .iter()
        .filter_map(|name| headers.get(*name).map(|v| (name.to_string(), v.clone())))
        .collect()
}

fn normalize_content_type(value: Option<&String>) -> Option<String> {
    let value = value?.split(';').next()?.trim().to_ascii_lowercase();
    if value.is_empty() { None } else { Some(value) }
}
