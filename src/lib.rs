#![deny(missing_docs)]

//! Core library for docsift: document question answering and theme extraction over a
//! deduplicated embedding store.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Retrieval, answer synthesis, and theme extraction.
pub mod engine;
/// Text extraction from PDFs, images, DOCX, and plain text.
pub mod extraction;
/// Language model client abstraction and adapters.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Model Context Protocol server implementation.
pub mod mcp;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document pipeline shared by every surface.
pub mod pipeline;
/// Per-caller document sessions.
pub mod session;
/// Deduplicated embedding store and its backends.
pub mod store;
/// Saving uploaded files to disk.
pub mod upload;
