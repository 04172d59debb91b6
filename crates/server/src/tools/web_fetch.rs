//! web_fetch tool implementation.
//!
//! Runs a retrieval and returns the document describing it. The body itself
//! stays in the cache unless `include_body` asks for it.

use pagefetch_client::fetch::sniff::is_textual;
use pagefetch_client::{RetrievalMethod, RetrievalState, Retriever};
use pagefetch_core::Document;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebFetchParams {
    /// The URL to retrieve. A missing scheme defaults to https.
    pub url: String,

    /// Retrieval method: "http" (default), "browser", or "auto".
    #[serde(default)]
    pub method: RetrievalMethod,

    /// Inline the body as text (textual content types only).
    #[serde(default)]
    pub include_body: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebFetchOutput {
    pub document: Document,
    /// Whether the body came from the content cache.
    pub cache_hit: bool,
    pub warnings: Vec<String>,
    /// Escalation states visited, `pending` first.
    pub trail: Vec<RetrievalState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

pub async fn fetch_impl(retriever: &Retriever, params: WebFetchParams) -> Result<CallToolResult, McpError> {
    let retrieval = retriever.retrieve(&params.url, params.method).await?;

    let content_type = retrieval.document.artifact.as_ref().and_then(|a| a.content_type.as_deref());
    let body = (params.include_body && is_textual(content_type))
        .then(|| String::from_utf8_lossy(&retrieval.body).into_owned());

    json_result(&WebFetchOutput {
        cache_hit: retrieval.cache_hit.is_some(),
        document: retrieval.document,
        warnings: retrieval.warnings,
        trail: retrieval.trail,
        body,
    })
}
