//! Handlers for the implicit session: `list-documents` and `reset-session`.

use std::sync::Arc;

use crate::pipeline::PipelineApi;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde_json::json;

use super::map_pipeline_error;

/// Handle the `list-documents` tool.
pub(crate) async fn handle_list_documents(
    pipeline: &Arc<dyn PipelineApi>,
    session: &str,
) -> Result<CallToolResult, McpError> {
    let documents = pipeline
        .session_documents(session)
        .await
        .map_err(map_pipeline_error)?;
    Ok(CallToolResult::structured(json!({
        "count": documents.len(),
        "documents": documents,
    })))
}

/// Handle the `reset-session` tool. Stored embeddings are kept.
pub(crate) async fn handle_reset_session(
    pipeline: &Arc<dyn PipelineApi>,
    session: &str,
) -> Result<CallToolResult, McpError> {
    pipeline
        .reset_session(session)
        .await
        .map_err(map_pipeline_error)?;
    Ok(CallToolResult::structured(json!({ "status": "ok" })))
}
