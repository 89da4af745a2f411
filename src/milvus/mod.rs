//! Milvus vector database integration.

pub mod client;
pub mod types;

pub use client::{
    CollectionSpec, FILENAME_MAX_LENGTH, MilvusService, QUERY_LIMIT_MAX, SUMMARY_MAX_LENGTH,
    TEXT_MAX_LENGTH,
};
pub use types::{MilvusError, SearchRow};
