//! Dispatch table from MCP resource URIs and tool names to handler functions.

use std::{collections::BTreeMap, future::Future, pin::Pin};

use rmcp::ErrorData as McpError;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ReadResourceRequestParam, ReadResourceResult,
};

use super::server::DocsiftMcpServer;

/// Boxed future returned by resource handlers.
pub type ResourceFuture =
    Pin<Box<dyn Future<Output = Result<ReadResourceResult, McpError>> + Send>>;
/// Boxed future returned by tool handlers.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<CallToolResult, McpError>> + Send>>;

/// Handler invoked for a `resources/read` request.
pub type ResourceHandler = fn(&DocsiftMcpServer, ReadResourceRequestParam) -> ResourceFuture;
/// Handler invoked for a `tools/call` request.
pub type ToolHandler = fn(&DocsiftMcpServer, CallToolRequestParam) -> ToolFuture;

/// Handlers keyed by resource URI and tool name.
///
/// Registration happens once while the server is built; afterwards the table is shared
/// read-only behind an `Arc`. Names are kept sorted so listings are stable.
#[derive(Default)]
pub struct Registry {
    resources: BTreeMap<&'static str, ResourceHandler>,
    tools: BTreeMap<&'static str, ToolHandler>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource handler. A URI registered twice keeps its first handler and the
    /// call returns `false`.
    pub fn register_resource(&mut self, uri: &'static str, handler: ResourceHandler) -> bool {
        if self.resources.contains_key(uri) {
            tracing::warn!(uri, "Resource handler already registered; keeping the first");
            return false;
        }
        self.resources.insert(uri, handler);
        true
    }

    /// Register a tool handler. A name registered twice keeps its first handler and the call
    /// returns `false`.
    pub fn register_tool(&mut self, name: &'static str, handler: ToolHandler) -> bool {
        if self.tools.contains_key(name) {
            tracing::warn!(tool = name, "Tool handler already registered; keeping the first");
            return false;
        }
        self.tools.insert(name, handler);
        true
    }

    /// Handler for a resource URI.
    pub fn resource(&self, uri: &str) -> Option<ResourceHandler> {
        self.resources.get(uri).copied()
    }

    /// Handler for a tool name.
    pub fn tool(&self, name: &str) -> Option<ToolHandler> {
        self.tools.get(name).copied()
    }

    /// Registered tool names in sorted order.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// Registered resource URIs in sorted order.
    pub fn resource_uris(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_tool(_server: &DocsiftMcpServer, _request: CallToolRequestParam) -> ToolFuture {
        Box::pin(async { Err(McpError::internal_error("first", None)) })
    }

    fn second_tool(_server: &DocsiftMcpServer, _request: CallToolRequestParam) -> ToolFuture {
        Box::pin(async { Err(McpError::internal_error("second", None)) })
    }

    fn health(_server: &DocsiftMcpServer, _request: ReadResourceRequestParam) -> ResourceFuture {
        Box::pin(async { Ok(ReadResourceResult { contents: Vec::new() }) })
    }

    #[test]
    fn lookups_find_registered_handlers_only() {
        let mut registry = Registry::new();
        registry.register_tool("reset-session", first_tool);
        registry.register_tool("answer-query", first_tool);
        registry.register_resource("mcp://health", health);

        assert_eq!(registry.tool_names(), vec!["answer-query", "reset-session"]);
        assert_eq!(registry.resource_uris(), vec!["mcp://health"]);
        assert!(registry.tool("answer-query").is_some());
        assert!(registry.tool("delete-everything").is_none());
        assert!(registry.resource("mcp://health").is_some());
        assert!(registry.resource("mcp://usage").is_none());
    }

    #[test]
    fn duplicate_registration_keeps_the_first_handler() {
        let mut registry = Registry::new();
        assert!(registry.register_tool("metrics", first_tool));
        assert!(!registry.register_tool("metrics", second_tool));
        assert!(registry.register_resource("mcp://health", health));
        assert!(!registry.register_resource("mcp://health", health));

        assert_eq!(registry.tool_names(), vec!["metrics"]);
        assert_eq!(registry.resource_uris(), vec!["mcp://health"]);
    }
}
