//! MCP handlers for document ingestion tools.

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use crate::pipeline::PipelineApi;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, JsonObject},
};
use serde::Deserialize;
use serde_json::json;

use super::{map_pipeline_error, parse_arguments};

/// Request payload accepted by the `ingest-files` tool.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct IngestFilesRequest {
    /// Paths readable by the server process.
    pub(crate) paths: Vec<PathBuf>,
}

/// Request payload accepted by the `store-documents` tool.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StoreDocumentsRequest {
    /// Document text keyed by source key.
    pub(crate) documents: BTreeMap<String, String>,
}

/// Handle `ingest-files`: extract each file, add it to the session, and store new documents.
pub(crate) async fn handle_ingest_files(
    pipeline: &Arc<dyn PipelineApi>,
    session: &str,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: IngestFilesRequest = parse_arguments(arguments)?;
    if args.paths.is_empty() {
        return Err(McpError::invalid_params("`paths` must not be empty", None));
    }

    let outcome = pipeline
        .ingest_files(session, args.paths)
        .await
        .map_err(map_pipeline_error)?;

    Ok(CallToolResult::structured(json!({
        "status": "ok",
        "processed": outcome.processed,
        "empty": outcome.empty,
        "inserted": outcome.inserted,
        "skippedDuplicates": outcome.skipped,
        "sessionDocuments": outcome.session_documents,
    })))
}

/// Handle `store-documents`: embed and store text supplied directly by the caller.
pub(crate) async fn handle_store_documents(
    pipeline: &Arc<dyn PipelineApi>,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: StoreDocumentsRequest = parse_arguments(arguments)?;
    if args.documents.keys().any(|key| key.trim().is_empty()) {
        return Err(McpError::invalid_params(
            "document keys must not be empty",
            None,
        ));
    }

    let summary = pipeline
        .store_embeddings(args.documents.into_iter().collect())
        .await
        .map_err(map_pipeline_error)?;

    Ok(CallToolResult::structured(json!({
        "status": "ok",
        "inserted": summary.inserted,
        "skippedDuplicates": summary.skipped,
    })))
}
