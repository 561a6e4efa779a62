//! Tool handlers for the MCP server.

use crate::{
    engine::EngineError,
    pipeline::PipelineError,
    store::StoreError,
    upload::UploadError,
};
use rmcp::{ErrorData as McpError, model::JsonObject};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod documents;
pub mod metrics;
pub mod query;
pub mod session;

/// Parse structured arguments supplied to a tool invocation.
pub(crate) fn parse_arguments<T: DeserializeOwned>(
    arguments: Option<JsonObject>,
) -> Result<T, McpError> {
    let value = arguments
        .map(Value::Object)
        .unwrap_or_else(|| Value::Object(JsonObject::new()));
    parse_arguments_value(value)
}

/// Deserialize arguments represented as a JSON value into the target type.
pub(crate) fn parse_arguments_value<T: DeserializeOwned>(value: Value) -> Result<T, McpError> {
    serde_json::from_value(value)
        .map_err(|err| McpError::invalid_params(format!("Invalid arguments: {err}"), None))
}

/// Map pipeline failures to MCP errors: caller mistakes become `invalid_params`.
pub(crate) fn map_pipeline_error(error: PipelineError) -> McpError {
    let message = error.to_string();
    match error {
        PipelineError::UnknownSession(_)
        | PipelineError::Upload(UploadError::InvalidName(_))
        | PipelineError::Store(StoreError::InvalidLimit)
        | PipelineError::Engine(EngineError::EmptyQuery) => McpError::invalid_params(message, None),
        _ => {
            tracing::error!(error = %message, "MCP tool failed");
            McpError::internal_error(message, None)
        }
    }
}
