//! cache_prune tool implementation.

use pagefetch_core::{ContentCache, PruneStats};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePruneOutput {
    pub cache_dir: String,
    #[serde(flatten)]
    pub stats: PruneStats,
}

pub async fn prune_impl(cache: &ContentCache) -> Result<CallToolResult, McpError> {
    let stats = cache.prune();
    tracing::info!(scanned = stats.scanned, removed = stats.removed, evicted = stats.evicted, "cache pruned");
    json_result(&CachePruneOutput { cache_dir: cache.settings().cache_dir.display().to_string(), stats })
}
