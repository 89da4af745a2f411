//! Vector index over uploaded documents.
//!
//! A single collection holds one [`EmbeddingRecord`] per indexed document. Records are never
//! updated or deleted; removing an object from storage leaves its vector behind.

mod gateway;
mod memory;

pub use gateway::VectorIndexGateway;
pub use memory::MemoryIndex;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Number of neighbours retrieved for a chat query.
pub const DEFAULT_TOP_K: usize = 3;

/// Errors returned by vector index backends.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The backend could not be reached or the collection is not ready.
    #[error("Vector index unavailable: {0}")]
    Unavailable(String),
    /// The backend refused the request.
    #[error("Vector index rejected request: {0}")]
    Rejected(String),
    /// Vector length differs from the collection schema.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the collection schema.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// Connection lifecycle of an index backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No usable connection; the next operation reconnects.
    Unconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Collection exists, is indexed, and is loaded.
    Ready,
}

/// Row persisted for every indexed document.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    /// Embedding of the full document text.
    pub embedding: Vec<f32>,
    /// Decoded document text.
    pub text: String,
    /// Object store key of the source document.
    pub filename: String,
    /// One-line summary generated at upload time.
    pub summary: String,
}

/// Nearest-neighbour result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Stored document text.
    pub text: String,
    /// Source document key.
    pub filename: String,
    /// Cosine similarity to the query; larger is closer.
    pub score: f32,
}

/// Vector index used by the query pipeline.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Connect and create the collection if needed. Safe to call repeatedly.
    async fn ensure_ready(&self) -> Result<(), IndexError>;

    /// Current connection state.
    fn state(&self) -> IndexState;

    /// Append one record and make it searchable.
    async fn insert(&self, record: EmbeddingRecord) -> Result<(), IndexError>;

    /// Up to `top_k` records closest to `vector`, most similar first.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError>;

    /// Stored summaries keyed by filename, for the given filenames.
    async fn summaries(&self, filenames: &[String]) -> Result<HashMap<String, String>, IndexError>;
}

/// Order hits by descending similarity and keep the best `top_k`.
pub(crate) fn rank_hits(mut hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_k);
    hits
}

/// Truncate `value` to at most `max_bytes` UTF-8 bytes without splitting a character.
pub(crate) fn clamp_bytes(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let end = value
        .char_indices()
        .map(|(index, ch)| index + ch.len_utf8())
        .take_while(|end| *end <= max_bytes)
        .last()
        .unwrap_or(0);
    value[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, score: f32) -> SearchHit {
        SearchHit {
            text: text.into(),
            filename: format!("{text}.txt"),
            score,
        }
    }

    #[test]
    fn rank_hits_orders_and_truncates() {
        let ranked = rank_hits(
            vec![hit("c", 0.2), hit("a", 0.9), hit("d", 0.1), hit("b", 0.5)],
            3,
        );
        let texts: Vec<_> = ranked.iter().map(|hit| hit.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn clamp_bytes_counts_utf8_bytes() {
        // Each Hangul syllable is three bytes.
        assert_eq!(clamp_bytes("하늘은 파랗다", 9), "하늘은");
        assert_eq!(clamp_bytes("하늘은 파랗다", 8), "하늘");
        assert_eq!(clamp_bytes("short", 10), "short");
        assert_eq!(clamp_bytes("하", 2), "");
    }

    #[test]
    fn clamp_bytes_keeps_long_hangul_within_varchar_bound() {
        let document = "하".repeat(30_000);
        let clamped = clamp_bytes(&document, crate::milvus::TEXT_MAX_LENGTH);
        assert!(clamped.len() <= crate::milvus::TEXT_MAX_LENGTH);
        assert_eq!(clamped.chars().count(), crate::milvus::TEXT_MAX_LENGTH / 3);
    }
}
