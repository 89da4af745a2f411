//! Shared types used by the Milvus client.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Milvus.
#[derive(Debug, Error)]
pub enum MilvusError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Milvus URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Milvus responded with an unexpected HTTP status code.
    #[error("Unexpected Milvus response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Milvus.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Milvus accepted the request but reported an error code in the envelope.
    #[error("Milvus error {code}: {message}")]
    Api {
        /// Error code reported by Milvus.
        code: i64,
        /// Error description reported by Milvus.
        message: String,
    },
    /// Response envelope lacked the expected `data` shape.
    #[error("Malformed Milvus response: {0}")]
    InvalidResponse(String),
}

impl MilvusError {
    /// Whether the failure happened below the API layer (connection refused, reset, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::UnexpectedStatus { .. })
    }
}

/// Row returned by a similarity search.
#[derive(Debug, Clone)]
pub struct SearchRow {
    /// Similarity reported by Milvus; larger is closer for COSINE.
    pub distance: f32,
    /// Requested output fields.
    pub fields: Map<String, Value>,
}

/// Every Milvus REST v2 response shares this envelope.
#[derive(Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub(crate) code: i64,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) data: Option<Value>,
}

impl Envelope {
    /// Milvus reports success as code `0`; older gateways use `200`.
    pub(crate) fn into_data(self) -> Result<Value, MilvusError> {
        if self.code != 0 && self.code != 200 {
            return Err(MilvusError::Api {
                code: self.code,
                message: self.message.unwrap_or_default(),
            });
        }
        Ok(self.data.unwrap_or(Value::Null))
    }
}

#[derive(Deserialize)]
pub(crate) struct HasCollectionData {
    pub(crate) has: bool,
}

#[derive(Deserialize)]
pub(crate) struct InsertData {
    #[serde(default, rename = "insertCount")]
    pub(crate) insert_count: u64,
}
