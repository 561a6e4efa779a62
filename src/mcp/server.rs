//! MCP server bootstrap and request dispatch.

use std::{borrow::Cow, sync::Arc};

use crate::{
    mcp::{
        format::{SettingsSnapshot, health_payload, json_resource_contents, serialize_json},
        handlers::{
            documents::{handle_ingest_files, handle_store_documents},
            metrics::handle_metrics,
            query::{handle_answer_query, handle_identify_themes},
            session::{handle_list_documents, handle_reset_session},
        },
        registry, schemas,
    },
    pipeline::PipelineApi,
    session::SessionId,
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        AnnotateAble, CallToolRequestParam, CallToolResult, ListResourcesResult, ListToolsResult,
        RawResource, ReadResourceRequestParam, ReadResourceResult, Resource, ServerCapabilities,
        ServerInfo, Tool, ToolAnnotations,
    },
};

const HEALTH_URI: &str = "mcp://health";
const SETTINGS_URI: &str = "mcp://settings";

/// MCP server implementation exposing docsift operations.
#[derive(Clone)]
pub struct DocsiftMcpServer {
    pipeline: Arc<dyn PipelineApi>,
    session: SessionId,
    settings: Arc<SettingsSnapshot>,
    registry: Arc<registry::Registry>,
}

impl DocsiftMcpServer {
    /// Create a server over the pipeline, opening the implicit session it operates on.
    pub async fn new(pipeline: Arc<dyn PipelineApi>, settings: SettingsSnapshot) -> Self {
        let mut registry = registry::Registry::new();
        registry.register_resource(HEALTH_URI, resource_health);
        registry.register_resource(SETTINGS_URI, resource_settings);

        registry.register_tool("ingest-files", tool_ingest_files);
        registry.register_tool("store-documents", tool_store_documents);
        registry.register_tool("answer-query", tool_answer_query);
        registry.register_tool("identify-themes", tool_identify_themes);
        registry.register_tool("list-documents", tool_list_documents);
        registry.register_tool("reset-session", tool_reset_session);
        registry.register_tool("metrics", tool_metrics);

        tracing::debug!(
            tools = ?registry.tool_names(),
            resources = ?registry.resource_uris(),
            "MCP handlers registered"
        );

        let session = pipeline.create_session().await;
        tracing::info!(session_id = %session, "MCP session opened");

        Self {
            pipeline,
            session,
            settings: Arc::new(settings),
            registry: Arc::new(registry),
        }
    }

    /// Identifier of the session used by session-scoped tools.
    pub fn session_id(&self) -> &str {
        &self.session
    }

    fn describe_tools(&self) -> Vec<Tool> {
        let empty_schema = Arc::new(schemas::empty_object_schema());
        vec![
            Tool {
                name: Cow::Borrowed("ingest-files"),
                title: Some("Ingest Files".to_string()),
                description: Some(Cow::Borrowed(
                    "Extract text from local PDF, image, DOCX, or text files, add them to this session, and store embeddings for unseen documents.",
                )),
                input_schema: Arc::new(schemas::ingest_files_input_schema()),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Ingest Files")
                        .destructive(false)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("store-documents"),
                title: Some("Store Documents".to_string()),
                description: Some(Cow::Borrowed(
                    "Store document text keyed by source name; names already stored are skipped.",
                )),
                input_schema: Arc::new(schemas::store_documents_input_schema()),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Store Documents")
                        .destructive(false)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("answer-query"),
                title: Some("Answer Query".to_string()),
                description: Some(Cow::Borrowed(
                    "Answer a question from the most similar stored documents with citations, or once per session document.",
                )),
                input_schema: Arc::new(schemas::answer_query_input_schema()),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Answer Query")
                        .read_only(true)
                        .open_world(true),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("identify-themes"),
                title: Some("Identify Themes".to_string()),
                description: Some(Cow::Borrowed(
                    "Identify recurring themes across this session's documents, each with supporting documents.",
                )),
                input_schema: empty_schema.clone(),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Identify Themes")
                        .read_only(true)
                        .open_world(true),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("list-documents"),
                title: Some("List Documents".to_string()),
                description: Some(Cow::Borrowed("List the documents held by this session.")),
                input_schema: empty_schema.clone(),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("List Documents")
                        .read_only(true)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("reset-session"),
                title: Some("Reset Session".to_string()),
                description: Some(Cow::Borrowed(
                    "Forget this session's documents. Stored embeddings are kept.",
                )),
                input_schema: empty_schema.clone(),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Reset Session")
                        .destructive(true)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("metrics"),
                title: Some("Metrics Snapshot".to_string()),
                description: Some(Cow::Borrowed(
                    "Check ingestion, duplicate, and query counters at a glance.",
                )),
                input_schema: empty_schema,
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Metrics Snapshot")
                        .read_only(true)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
        ]
    }

    fn describe_resources(&self) -> Vec<Resource> {
        let mut health = RawResource::new(HEALTH_URI, "health");
        health.description = Some("Store reachability, record count, and configured models".into());

        let mut settings = RawResource::new(SETTINGS_URI, "settings");
        settings.description = Some("Effective retrieval and prompt settings".into());

        vec![health.no_annotation(), settings.no_annotation()]
    }
}

fn resource_health(
    server: &DocsiftMcpServer,
    _request: ReadResourceRequestParam,
) -> registry::ResourceFuture {
    let pipeline = server.pipeline.clone();
    Box::pin(async move {
        let snapshot = pipeline.health().await;
        Ok(ReadResourceResult {
            contents: vec![json_resource_contents(
                HEALTH_URI,
                health_payload(&snapshot),
            )],
        })
    })
}

fn resource_settings(
    server: &DocsiftMcpServer,
    _request: ReadResourceRequestParam,
) -> registry::ResourceFuture {
    let settings = server.settings.clone();
    Box::pin(async move {
        Ok(ReadResourceResult {
            contents: vec![json_resource_contents(
                SETTINGS_URI,
                serialize_json(settings.as_ref(), SETTINGS_URI),
            )],
        })
    })
}

fn tool_ingest_files(
    server: &DocsiftMcpServer,
    request: CallToolRequestParam,
) -> registry::ToolFuture {
    let pipeline = server.pipeline.clone();
    let session = server.session.clone();
    Box::pin(async move { handle_ingest_files(&pipeline, &session, request.arguments).await })
}

fn tool_store_documents(
    server: &DocsiftMcpServer,
    request: CallToolRequestParam,
) -> registry::ToolFuture {
    let pipeline = server.pipeline.clone();
    Box::pin(async move { handle_store_documents(&pipeline, request.arguments).await })
}

fn tool_answer_query(
    server: &DocsiftMcpServer,
    request: CallToolRequestParam,
) -> registry::ToolFuture {
    let pipeline = server.pipeline.clone();
    let session = server.session.clone();
    Box::pin(async move { handle_answer_query(&pipeline, &session, request.arguments).await })
}

fn tool_identify_themes(
    server: &DocsiftMcpServer,
    _request: CallToolRequestParam,
) -> registry::ToolFuture {
    let pipeline = server.pipeline.clone();
    let session = server.session.clone();
    Box::pin(async move { handle_identify_themes(&pipeline, &session).await })
}

fn tool_list_documents(
    server: &DocsiftMcpServer,
    _request: CallToolRequestParam,
) -> registry::ToolFuture {
    let pipeline = server.pipeline.clone();
    let session = server.session.clone();
    Box::pin(async move { handle_list_documents(&pipeline, &session).await })
}

fn tool_reset_session(
    server: &DocsiftMcpServer,
    _request: CallToolRequestParam,
) -> registry::ToolFuture {
    let pipeline = server.pipeline.clone();
    let session = server.session.clone();
    Box::pin(async move { handle_reset_session(&pipeline, &session).await })
}

fn tool_metrics(
    server: &DocsiftMcpServer,
    _request: CallToolRequestParam,
) -> registry::ToolFuture {
    let pipeline = server.pipeline.clone();
    Box::pin(async move { handle_metrics(&pipeline).await })
}

impl ServerHandler for DocsiftMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = rmcp::model::Implementation::from_build_env();
        implementation.name = "docsift".to_string();
        implementation.title = Some("docsift MCP".to_string());
        implementation.version = env!("CARGO_PKG_VERSION").to_string();

        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: implementation,
            instructions: Some(
                "Use this server to ask questions over a document set. Ingest files or store text first, then answer questions with citations or extract themes across the session's documents.".into(),
            ),
            ..ServerInfo::default()
        }
    }

    fn list_resources(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        let resources = self.describe_resources();
        std::future::ready(Ok(ListResourcesResult::with_all_items(resources)))
    }

    fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.describe_tools();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    #[allow(clippy::manual_async_fn)]
    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            if let Some(handler) = self.registry.resource(request.uri.as_str()) {
                return handler(self, request).await;
            }

            Err(McpError::invalid_params(
                format!("Unknown resource URI: {}", request.uri),
                None,
            ))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            if let Some(handler) = self.registry.tool(request.name.as_ref()) {
                return handler(self, request).await;
            }

            Err(McpError::invalid_params(
                format!(
                    "Unknown tool: {} (available: {})",
                    request.name,
                    self.registry.tool_names().join(", ")
                ),
                None,
            ))
        }
    }
}
