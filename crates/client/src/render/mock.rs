//! Scripted [`BrowserEngine`] for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use url::Url;

use super::{BrowserEngine, NavigateOptions, RenderError, RenderedPage};

#[derive(Debug)]
pub(crate) struct MockEngine {
    html: String,
    status: Option<u16>,
    headers: BTreeMap<String, String>,
    failure: Mutex<Option<RenderError>>,
    calls: Mutex<Vec<(Url, NavigateOptions)>>,
}

impl MockEngine {
    pub(crate) fn ok(html: &str) -> Self {
        Self {
            html: html.to_string(),
            status: Some(200),
            headers: BTreeMap::new(),
            failure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(err: RenderError) -> Self {
        Self { failure: Mutex::new(Some(err)), ..Self::ok("") }
    }

    pub(crate) fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn last_options(&self) -> Option<NavigateOptions> {
        self.calls.lock().unwrap().last().map(|(_, opts)| opts.clone())
    }
}

#[async_trait::async_trait]
impl BrowserEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn navigate(&self, url: &Url, opts: &NavigateOptions) -> Result<RenderedPage, RenderError> {
        self.calls.lock().unwrap().push((url.clone(), opts.clone()));
        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }
        Ok(RenderedPage {
            html: self.html.clone(),
            final_url: url.clone(),
            status: self.status,
            headers: self.headers.clone(),
            render_time_ms: 1,
        })
    }
}
