//! MCP server handler implementation.
//!
//! Routes tool calls to the tool implementations, which share one
//! [`Retriever`] and therefore one cache and policy.
use std::sync::Arc;

use crate::tools::cache_prune::prune_impl;
use crate::tools::web_extract::{WebExtractParams, extract_impl};
use crate::tools::web_fetch::{WebFetchParams, fetch_impl};

use pagefetch_client::{DomExtractor, Extractor, Retriever};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

#[derive(Clone)]
pub struct PagefetchServer {
    tool_router: ToolRouter<Self>,
    retriever: Arc<Retriever>,
    extractor: Arc<dyn Extractor>,
}

#[tool_router]
impl PagefetchServer {
    pub fn new(retriever: Arc<Retriever>) -> Self {
        Self { tool_router: Self::tool_router(), retriever, extractor: Arc::new(DomExtractor::new()) }
    }

    #[tool(
        description = "Retrieve a URL over HTTP or a headless browser. Returns the retrieval document (status, final URL, cached body path, content type, render evidence) plus warnings. method: http (default), browser, or auto (HTTP with browser escalation; permissive policy only)."
    )]
    async fn web_fetch(&self, params: Parameters<WebFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.retriever, params.0).await
    }

    #[tool(
        description = "Retrieve a URL and extract its title, visible text, and heading outline. Accepts the same method values as web_fetch."
    )]
    async fn web_extract(&self, params: Parameters<WebExtractParams>) -> Result<CallToolResult, McpError> {
        extract_impl(&self.retriever, self.extractor.as_ref(), params.0).await
    }

    #[tool(description = "Remove expired and invalid cache entries and evict least-recently-used entries over the size budget.")]
    async fn cache_prune(&self) -> Result<CallToolResult, McpError> {
        prune_impl(self.retriever.cache()).await
    }
}

impl ServerHandler for PagefetchServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "pagefetch-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
