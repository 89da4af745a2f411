//! Result types and errors of the query pipeline.

use crate::storage::StorageError;
use std::time::Duration;
use thiserror::Error;

use super::prompts::{BINARY_SUMMARY, DEGRADED_ANSWER, NO_DOCUMENT_ANSWER};

/// Errors that fail a pipeline request. Everything else degrades to a fixed answer.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Object storage rejected a read or write.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A collaborator client could not be constructed.
    #[error("Failed to initialize pipeline: {0}")]
    Init(String),
}

/// Tunables applied per request.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Timeout for the upload summary call.
    pub summary_timeout: Duration,
    /// Timeout for the chat answer call.
    pub generation_timeout: Duration,
    /// Neighbours retrieved per chat query.
    pub top_k: usize,
    /// Lifetime of presigned download links.
    pub presign_ttl: Duration,
}

/// Answer returned by the chat path.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatAnswer {
    /// Generated answer or a fixed fallback.
    pub answer: String,
    /// Retrieved passages the answer was grounded on; `None` on fallback paths.
    pub context: Option<String>,
}

impl ChatAnswer {
    pub(crate) fn degraded() -> Self {
        Self {
            answer: DEGRADED_ANSWER.to_string(),
            context: None,
        }
    }

    pub(crate) fn no_document() -> Self {
        Self {
            answer: NO_DOCUMENT_ANSWER.to_string(),
            context: None,
        }
    }
}

/// How far an upload progressed past storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Stored, summarized, and searchable.
    Indexed,
    /// Stored and summarized, but not searchable (embedding or index unavailable).
    Stored,
    /// Stored as-is; content is not text and was not analyzed.
    Binary,
}

/// Result of the upload path.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    /// Object key the bytes were stored under.
    pub filename: String,
    /// Generated summary or a fixed fallback.
    pub summary: String,
    /// Progress marker.
    pub status: UploadStatus,
}

impl UploadOutcome {
    pub(crate) fn binary(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            summary: BINARY_SUMMARY.to_string(),
            status: UploadStatus::Binary,
        }
    }

    /// Human-readable status line for API responses.
    pub fn message(&self) -> &'static str {
        match self.status {
            UploadStatus::Indexed => "Success",
            UploadStatus::Stored => "Stored; search indexing skipped",
            UploadStatus::Binary => "Stored without analysis",
        }
    }
}

/// One row of the document listing.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    /// Position in the store listing.
    pub id: usize,
    /// Display title (the key).
    pub title: String,
    /// Object key.
    pub filename: String,
    /// Last modification date as `YYYY-MM-DD`; empty when unknown.
    pub date: String,
    /// Indexed summary or placeholder.
    pub summary: String,
    /// Presigned download link, when the store supports it.
    pub url: Option<String>,
}

/// Bytes of a stored document with the content type to serve them under.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentDownload {
    /// Object key.
    pub filename: String,
    /// `text/plain; charset=utf-8` for UTF-8 content, `application/octet-stream` otherwise.
    pub content_type: &'static str,
    /// Raw stored bytes.
    pub bytes: Vec<u8>,
}
