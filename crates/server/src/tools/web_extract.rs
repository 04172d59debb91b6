//! web_extract tool implementation.
//!
//! Retrieves a URL through the same pipeline as web_fetch, then attaches the
//! extractor's title, text, and heading outline to the document. Extracted
//! text that reads like instructions to an agent adds a warning.

use pagefetch_client::{Extractor, RetrievalMethod, Retriever, extract_document, injection_warning};
use pagefetch_core::Document;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebExtractParams {
    /// The URL to retrieve and extract.
    pub url: String,

    /// Retrieval method: "http" (default), "browser", or "auto".
    #[serde(default)]
    pub method: RetrievalMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebExtractOutput {
    /// Retrieval document with `extracted` populated.
    pub document: Document,
    pub warnings: Vec<String>,
}

pub async fn extract_impl(
    retriever: &Retriever, extractor: &dyn Extractor, params: WebExtractParams,
) -> Result<CallToolResult, McpError> {
    let retrieval = retriever.retrieve(&params.url, params.method).await?;
    let document = extract_document(retrieval.document, &retrieval.body, extractor)?;
    let mut warnings = retrieval.warnings;
    if let Some(warning) = document.extracted.as_ref().and_then(injection_warning) {
        tracing::warn!(url = %document.url, "{warning}");
        warnings.push(warning);
    }
    json_result(&WebExtractOutput { document, warnings })
}
