//! pagefetch-mcp server entry point.
//!
//! Boots the MCP server on stdio transport. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use pagefetch_client::{Retriever, engine_from_config};
use pagefetch_core::AppConfig;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let retriever = Retriever::from_config(&config, engine_from_config(&config))?;

    tracing::info!(
        cache_dir = %config.cache_dir.display(),
        policy = ?config.policy,
        robots = ?config.robots,
        render = retriever.renderer().is_available(),
        "Starting pagefetch-mcp server on stdio transport"
    );

    let handler = handler::PagefetchServer::new(Arc::new(retriever));
    let server = serve_server(handler, stdio()).await?;
    server.waiting().await?;

    Ok(())
}
