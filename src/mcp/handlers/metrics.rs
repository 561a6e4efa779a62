//! Handler for the metrics tool.

use std::sync::Arc;

use crate::pipeline::PipelineApi;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde_json::json;

/// Handle the `metrics` tool, returning the current pipeline counters.
pub(crate) async fn handle_metrics(
    pipeline: &Arc<dyn PipelineApi>,
) -> Result<CallToolResult, McpError> {
    let snapshot = pipeline.metrics_snapshot();
    Ok(CallToolResult::structured(json!({
        "documentsIngested": snapshot.documents_ingested,
        "duplicatesSkipped": snapshot.duplicates_skipped,
        "extractionFailures": snapshot.extraction_failures,
        "queriesAnswered": snapshot.queries_answered,
        "queryFailures": snapshot.query_failures,
        "themeRuns": snapshot.theme_runs,
    })))
}
