//! Handlers for the question answering and theme tools.

use std::sync::Arc;

use crate::{
    mcp::format::{format_answer, format_document_answers},
    pipeline::PipelineApi,
};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, JsonObject},
};
use serde::Deserialize;
use serde_json::json;

use super::{map_pipeline_error, parse_arguments};

/// Where `answer-query` looks for its answer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum QueryScope {
    /// Retrieve the most similar stored documents and cite them.
    #[default]
    Store,
    /// Answer once per document held by the session.
    Session,
}

/// Request payload accepted by the `answer-query` tool.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct AnswerQueryRequest {
    pub(crate) query: String,
    #[serde(default)]
    pub(crate) scope: QueryScope,
}

/// Handle `answer-query`.
pub(crate) async fn handle_answer_query(
    pipeline: &Arc<dyn PipelineApi>,
    session: &str,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: AnswerQueryRequest = parse_arguments(arguments)?;
    if args.query.trim().is_empty() {
        return Err(McpError::invalid_params("`query` must not be empty", None));
    }

    let payload = match args.scope {
        QueryScope::Store => format_answer(
            pipeline
                .answer_query(&args.query)
                .await
                .map_err(map_pipeline_error)?,
        ),
        QueryScope::Session => format_document_answers(
            pipeline
                .answer_per_document(session, &args.query)
                .await
                .map_err(map_pipeline_error)?,
        ),
    };
    Ok(CallToolResult::structured(payload))
}

/// Handle `identify-themes` over the session's documents.
pub(crate) async fn handle_identify_themes(
    pipeline: &Arc<dyn PipelineApi>,
    session: &str,
) -> Result<CallToolResult, McpError> {
    let themes = pipeline
        .identify_themes(session)
        .await
        .map_err(map_pipeline_error)?;
    Ok(CallToolResult::structured(json!({ "themes": themes })))
}
