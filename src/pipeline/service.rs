//! Pipeline service sequencing storage, embedding, retrieval, and generation.

use crate::{
    config::{Config, ObjectStoreBackend, VectorBackend},
    embedding::{EmbeddingClient, OllamaEmbeddingClient},
    generation::{GenerationClient, GenerationRequest, OllamaGenerationClient},
    index::{
        DEFAULT_TOP_K, DocumentIndex, EmbeddingRecord, IndexState, MemoryIndex,
        VectorIndexGateway,
    },
    pipeline::{
        prompts::{
            LISTING_PLACEHOLDER, SUMMARY_FAILED, SUMMARY_MISSING, answer_prompt, build_context,
            summary_prompt,
        },
        types::{
            ChatAnswer, DocumentDownload, DocumentEntry, PipelineError, PipelineSettings,
            UploadOutcome, UploadStatus,
        },
    },
    storage::{MemoryObjectStore, ObjectStore, S3ObjectStore},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Filenames per summary lookup against the index.
const SUMMARY_LOOKUP_BATCH: usize = 100;

/// Coordinates the upload and chat paths over the storage, AI, and index collaborators.
///
/// Construct once near process start and share through an `Arc`; the HTTP surface and the
/// seeding tool reuse the same instance.
pub struct RagPipeline {
    store: Arc<dyn ObjectStore>,
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn GenerationClient>,
    index: Arc<dyn DocumentIndex>,
    settings: PipelineSettings,
}

/// Abstraction over the pipeline used by external surfaces.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Answer a question from indexed documents. Never fails; outages yield fixed answers.
    async fn chat(&self, query: &str) -> ChatAnswer;

    /// Store a document and, when it is text, summarize and index it.
    async fn upload(&self, filename: &str, bytes: Vec<u8>)
    -> Result<UploadOutcome, PipelineError>;

    /// Enumerate stored documents with their summaries.
    async fn list_documents(&self) -> Result<Vec<DocumentEntry>, PipelineError>;

    /// Fetch a stored document.
    async fn download(&self, filename: &str) -> Result<DocumentDownload, PipelineError>;

    /// Connection state of the vector index.
    fn index_state(&self) -> IndexState;
}

impl RagPipeline {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        index: Arc<dyn DocumentIndex>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            index,
            settings,
        }
    }

    /// Build the pipeline and its collaborators from configuration. Does not contact the index.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        tracing::info!(backend = ?config.object_store_backend, "Initializing object store");
        let store: Arc<dyn ObjectStore> = match config.object_store_backend {
            ObjectStoreBackend::S3 => Arc::new(S3ObjectStore::from_config(config).await),
            ObjectStoreBackend::Memory => Arc::new(MemoryObjectStore::new()),
        };

        let embedder = OllamaEmbeddingClient::from_config(config)
            .map_err(|error| PipelineError::Init(error.to_string()))?;
        let generator = OllamaGenerationClient::from_config(config)
            .map_err(|error| PipelineError::Init(error.to_string()))?;
        tracing::info!(
            ollama_url = %config.ollama_url,
            embedding_model = %config.embedding_model,
            llm_model = %config.llm_model,
            "Model clients initialized"
        );

        let index: Arc<dyn DocumentIndex> = match config.vector_backend {
            VectorBackend::Milvus => Arc::new(
                VectorIndexGateway::from_config(config)
                    .map_err(|error| PipelineError::Init(error.to_string()))?,
            ),
            VectorBackend::Memory => Arc::new(MemoryIndex::new(config.embedding_dimension)),
        };

        Ok(Self::new(
            store,
            Arc::new(embedder),
            Arc::new(generator),
            index,
            PipelineSettings {
                summary_timeout: config.summary_timeout,
                generation_timeout: config.generation_timeout,
                top_k: DEFAULT_TOP_K,
                presign_ttl: config.presign_ttl,
            },
        ))
    }

    /// Shared handle to the vector index, for start-up warm-up.
    pub fn index(&self) -> Arc<dyn DocumentIndex> {
        Arc::clone(&self.index)
    }

    /// Shared handle to the object store.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    /// Embed → search → assemble context → generate.
    pub async fn chat(&self, query: &str) -> ChatAnswer {
        let vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(error) => {
                tracing::warn!(error = %error, "Query embedding failed; answering with fallback");
                return ChatAnswer::degraded();
            }
        };

        let hits = match self.index.search(&vector, self.settings.top_k).await {
            Ok(hits) => hits,
            Err(error) => {
                tracing::warn!(error = %error, "Vector search unavailable");
                Vec::new()
            }
        };
        if hits.is_empty() {
            tracing::info!("No documents matched query");
            return ChatAnswer::no_document();
        }
        tracing::debug!(
            hits = hits.len(),
            files = ?hits.iter().map(|hit| hit.filename.as_str()).collect::<Vec<_>>(),
            "Retrieved context"
        );

        let context = build_context(&hits);
        let request = GenerationRequest {
            prompt: answer_prompt(&context, query),
            timeout: self.settings.generation_timeout,
        };
        match self.generator.generate(request).await {
            Ok(answer) if !answer.is_empty() => ChatAnswer {
                answer,
                context: Some(context),
            },
            Ok(_) => {
                tracing::warn!("Generation returned an empty answer");
                ChatAnswer::degraded()
            }
            Err(error) => {
                tracing::warn!(error = %error, "Answer generation failed");
                ChatAnswer::degraded()
            }
        }
    }

    /// Decode → store → summarize → embed → index.
    pub async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, PipelineError> {
        let size = bytes.len();
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(error) => {
                self.store.put(filename, error.into_bytes()).await?;
                tracing::info!(filename, size, "Stored binary upload without analysis");
                return Ok(UploadOutcome::binary(filename));
            }
        };

        self.store.put(filename, text.as_bytes().to_vec()).await?;
        tracing::info!(filename, size, "Stored upload");

        if text.trim().is_empty() {
            return Ok(UploadOutcome {
                filename: filename.to_string(),
                summary: SUMMARY_MISSING.to_string(),
                status: UploadStatus::Stored,
            });
        }

        let summary = self.summarize(&text).await;
        let status = match self.embedder.embed(&text).await {
            Ok(embedding) => {
                let record = EmbeddingRecord {
                    embedding,
                    text,
                    filename: filename.to_string(),
                    summary: summary.clone(),
                };
                match self.index.insert(record).await {
                    Ok(()) => UploadStatus::Indexed,
                    Err(error) => {
                        tracing::warn!(filename, error = %error, "Indexing skipped");
                        UploadStatus::Stored
                    }
                }
            }
            Err(error) => {
                tracing::warn!(filename, error = %error, "Document embedding failed; not indexed");
                UploadStatus::Stored
            }
        };

        Ok(UploadOutcome {
            filename: filename.to_string(),
            summary,
            status,
        })
    }

    async fn summarize(&self, text: &str) -> String {
        let request = GenerationRequest {
            prompt: summary_prompt(text),
            timeout: self.settings.summary_timeout,
        };
        match self.generator.generate(request).await {
            Ok(summary) if summary.is_empty() => SUMMARY_MISSING.to_string(),
            Ok(summary) => summary,
            Err(error) => {
                tracing::warn!(error = %error, "Summary generation failed");
                SUMMARY_FAILED.to_string()
            }
        }
    }

    /// Store listing joined with indexed summaries and presigned links.
    pub async fn list_documents(&self) -> Result<Vec<DocumentEntry>, PipelineError> {
        let objects = self.store.list().await?;
        let filenames: Vec<String> = objects.iter().map(|object| object.key.clone()).collect();
        let summaries = self.lookup_summaries(&filenames).await;

        let mut documents = Vec::with_capacity(objects.len());
        for (position, object) in objects.into_iter().enumerate() {
            let url = match self.store.presign(&object.key, self.settings.presign_ttl).await {
                Ok(url) => url,
                Err(error) => {
                    tracing::warn!(key = %object.key, error = %error, "Presign failed");
                    None
                }
            };
            let summary = summaries
                .get(&object.key)
                .cloned()
                .unwrap_or_else(|| LISTING_PLACEHOLDER.to_string());
            documents.push(DocumentEntry {
                id: position,
                title: object.key.clone(),
                date: object
                    .last_modified
                    .map(|modified| modified.date().to_string())
                    .unwrap_or_default(),
                filename: object.key,
                summary,
                url,
            });
        }

        Ok(documents)
    }

    async fn lookup_summaries(&self, filenames: &[String]) -> HashMap<String, String> {
        let mut summaries = HashMap::new();
        for batch in filenames.chunks(SUMMARY_LOOKUP_BATCH) {
            match self.index.summaries(batch).await {
                Ok(found) => summaries.extend(found),
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        "Summary lookup unavailable; using placeholders"
                    );
                    break;
                }
            }
        }
        summaries
    }

    /// Fetch stored bytes and classify them for serving.
    pub async fn download(&self, filename: &str) -> Result<DocumentDownload, PipelineError> {
        let bytes = self.store.get(filename).await?;
        let content_type = if std::str::from_utf8(&bytes).is_ok() {
            "text/plain; charset=utf-8"
        } else {
            "application/octet-stream"
        };
        Ok(DocumentDownload {
            filename: filename.to_string(),
            content_type,
            bytes,
        })
    }
}

#[async_trait]
impl PipelineApi for RagPipeline {
    async fn chat(&self, query: &str) -> ChatAnswer {
        RagPipeline::chat(self, query).await
    }

    async fn upload(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, PipelineError> {
        RagPipeline::upload(self, filename, bytes).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentEntry>, PipelineError> {
        RagPipeline::list_documents(self).await
    }

    async fn download(&self, filename: &str) -> Result<DocumentDownload, PipelineError> {
        RagPipeline::download(self, filename).await
    }

    fn index_state(&self) -> IndexState {
        self.index.state()
    }
}
