//! Retrieved document model.
//!
//! A [`Document`] is produced once per retrieval call and is the shape every
//! downstream consumer (extraction, output, evaluation) reads, regardless of
//! whether the bytes came from a plain HTTP fetch, a browser render, or were
//! handed in by the caller. Optional sub-objects serialize as `null`.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the document bytes were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Http,
    Browser,
    Provided,
}

/// Response metadata from the HTTP exchange (or browser navigation response).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HttpInfo {
    pub status: u16,
    pub final_url: String,
    pub headers: BTreeMap<String, String>,
}

/// Where the body was stored and what it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactInfo {
    pub body_path: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Option<u64>,
}

/// Browser rendering evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderInfo {
    pub engine: String,
    pub dom_path: String,
    pub screenshot_path: Option<String>,
    pub headful: bool,
    pub profile: Option<String>,
}

/// A heading found by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub level: u8,
    pub heading: String,
}

/// Content derived from the body by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub extraction_method: String,
    pub markdown: Option<String>,
    pub text: Option<String>,
    pub sections: Option<Vec<Section>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Document {
    pub url: String,
    pub fetched_at: String,
    pub fetch_method: FetchMethod,
    pub http: Option<HttpInfo>,
    pub artifact: Option<ArtifactInfo>,
    pub render: Option<RenderInfo>,
    pub extracted: Option<ExtractedContent>,
}

impl Document {
    /// Start a document stamped with the current time.
    pub fn new(url: impl Into<String>, fetch_method: FetchMethod) -> Self {
        Self {
            url: url.into(),
            fetched_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            fetch_method,
            http: None,
            artifact: None,
            render: None,
            extracted: None,
        }
    }

    pub fn with_http(mut self, http: HttpInfo) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactInfo) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn with_render(mut self, render: RenderInfo) -> Self {
        self.render = Some(render);
        self
    }

    /// Attach extracted content. Retrieval fields are left as they are.
    pub fn with_extracted(mut self, extracted: ExtractedContent) -> Self {
        self.extracted = Some(extracted);
        self
    }
}
