//! Headless Chrome/Chromium engine using chromiumoxide.
//!
//! Each navigation launches its own browser process and tears it down before
//! returning, so a profile directory is never held between calls.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use url::Url;

use super::{BrowserEngine, NavigateOptions, RenderError, RenderedPage, WaitCondition};

/// Interval between `wait_for` selector probes.
const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Quiet period after load used to approximate network idle.
const NETWORK_IDLE_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default)]
pub struct ChromiumEngine;

impl ChromiumEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Aborts the CDP handler task however the navigation ends.
struct HandlerGuard(JoinHandle<()>);

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn browser_config(opts: &NavigateOptions) -> Result<BrowserConfig, RenderError> {
    let mut builder = BrowserConfig::builder()
        .window_size(opts.viewport.0, opts.viewport.1)
        .request_timeout(Duration::from_millis(opts.timeout_ms))
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions");
    if opts.headful {
        builder = builder.with_head();
    }
    if let Some(dir) = &opts.profile_dir {
        builder = builder.user_data_dir(dir);
    }
    if let Some(proxy) = &opts.proxy {
        builder = builder.arg(format!("--proxy-server={proxy}"));
    }
    if let Some(user_agent) = &opts.user_agent {
        builder = builder.arg(format!("--user-agent={user_agent}"));
    }
    builder.build().map_err(RenderError::BrowserLaunch)
}

#[async_trait::async_trait]
impl BrowserEngine for ChromiumEngine {
    fn name(&self) -> &str {
        "chromium"
    }

    async fn navigate(&self, url: &Url, opts: &NavigateOptions) -> Result<RenderedPage, RenderError> {
        let (mut browser, mut handler) = Browser::launch(browser_config(opts)?)
            .await
            .map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

        let _handler = HandlerGuard(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {e}");
                    break;
                }
            }
        }));

        let result = tokio::time::timeout(Duration::from_millis(opts.timeout_ms), run_session(&browser, url, opts))
            .await
            .unwrap_or(Err(RenderError::Timeout(opts.timeout_ms)));

        if let Err(e) = browser.close().await {
            tracing::debug!("browser close failed: {e}");
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!("browser wait failed: {e}");
        }

        result
    }
}

async fn run_session(browser: &Browser, url: &Url, opts: &NavigateOptions) -> Result<RenderedPage, RenderError> {
    let page = browser.new_page("about:blank").await.map_err(|e| RenderError::Navigation(e.to_string()))?;
    let result = drive_page(&page, url, opts).await;
    if let Err(e) = page.close().await {
        tracing::debug!("page close failed: {e}");
    }
    result
}

async fn drive_page(page: &Page, url: &Url, opts: &NavigateOptions) -> Result<RenderedPage, RenderError> {
    let start = Instant::now();

    page.goto(url.as_str()).await.map_err(|e| RenderError::Navigation(e.to_string()))?;
    let response = page
        .wait_for_navigation_response()
        .await
        .map_err(|e| RenderError::Navigation(e.to_string()))?
        .and_then(|request| request.response.clone());

    match &opts.wait_for {
        Some(WaitCondition::Selector(selector)) => loop {
            if page.find_element(selector.as_str()).await.is_ok() {
                break;
            }
            if start.elapsed() >= Duration::from_millis(opts.timeout_ms) {
                return Err(RenderError::SelectorNotFound(selector.clone()));
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        },
        Some(WaitCondition::NetworkIdle) => {
            page.wait_for_navigation().await.map_err(|e| RenderError::Navigation(e.to_string()))?;
            tokio::time::sleep(NETWORK_IDLE_SETTLE).await;
        }
        None => {}
    }
    if opts.wait_ms > 0 {
        tokio::time::sleep(Duration::from_millis(opts.wait_ms)).await;
    }

    if let Some(path) = &opts.screenshot_path {
        page.save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(|e| RenderError::Screenshot(e.to_string()))?;
    }

    let html = page.content().await.map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;
    let page_url = page.url().await.map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;
    let final_url = Url::parse(page_url.as_deref().unwrap_or(url.as_str()))
        .map_err(|e| RenderError::Navigation(e.to_string()))?;

    let (status, headers) = match &response {
        Some(response) => {
            let status = u16::try_from(response.status).ok();
            let headers = serde_json::to_value(&response.headers)
                .ok()
                .and_then(|value| value.as_object().cloned())
                .map(|object| {
                    object
                        .into_iter()
                        .filter_map(|(name, value)| value.as_str().map(|v| (name.to_ascii_lowercase(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            (status, headers)
        }
        None => (None, BTreeMap::new()),
    };

    Ok(RenderedPage { html, final_url, status, headers, render_time_ms: start.elapsed().as_millis() as u64 })
}
