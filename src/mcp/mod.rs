//! Model Context Protocol (MCP) integration for docsift.
//!
//! This module wires the document pipeline into an MCP server so editors and agent hosts can
//! ingest documents, ask questions, and extract themes over stdio. The surface area consists of:
//!
//! - Tools: `ingest-files`, `store-documents`, `answer-query`, `identify-themes`,
//!   `list-documents`, `reset-session`, and `metrics`.
//! - Resources: `mcp://health` and `mcp://settings`.
//!
//! Each server instance owns one implicit session; session-scoped tools operate on it.

mod format;
pub mod handlers;
mod registry;
mod schemas;
mod server;

pub use format::SettingsSnapshot;
pub use server::DocsiftMcpServer;
