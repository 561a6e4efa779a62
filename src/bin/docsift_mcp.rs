//! MCP server entrypoint (stdio transport).
//!
//! Launches an MCP server that exposes docsift's tools and resources over stdio for editor and
//! agent integrations. It shares all runtime configuration with the HTTP binary. Console logs go
//! to stderr because stdout carries protocol frames.
use anyhow::{Context, Result};
use docsift::{
    config,
    logging::{self, ConsoleTarget},
    mcp::{DocsiftMcpServer, SettingsSnapshot},
    pipeline::DocumentPipeline,
};
use rmcp::{service::ServiceExt, transport::stdio};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing_with(ConsoleTarget::Stderr);
    let config = config::init_config().context("failed to load configuration")?;

    let pipeline = DocumentPipeline::from_config(config)
        .await
        .context("failed to open the embedding store")?;
    let server = DocsiftMcpServer::new(Arc::new(pipeline), SettingsSnapshot::from_config(config)).await;

    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server over stdio")?;

    service
        .waiting()
        .await
        .context("MCP server terminated unexpectedly")?;

    Ok(())
}
