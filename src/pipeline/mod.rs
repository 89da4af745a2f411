//! Upload and chat pipelines over storage, models, and the vector index.
//!
//! Uploads are stored before any model call, so a document survives every downstream failure.
//! Chat never fails outright: dependency outages produce one of the fixed answers in
//! [`prompts`].

pub mod prompts;
mod service;
mod types;

pub use service::{PipelineApi, RagPipeline};
pub use types::{
    ChatAnswer, DocumentDownload, DocumentEntry, PipelineError, PipelineSettings, UploadOutcome,
    UploadStatus,
};
