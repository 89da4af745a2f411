#![deny(missing_docs)]

//! Core library for the PBS document backend: upload, summarize, index, and answer questions
//! over stored documents.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text generation client abstraction and adapters.
pub mod generation;
/// Vector index abstraction, connection management, and backends.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Milvus REST API client.
pub mod milvus;
/// Upload and chat pipelines.
pub mod pipeline;
/// Object storage abstraction and backends.
pub mod storage;
