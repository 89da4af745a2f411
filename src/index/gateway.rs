use super::{
    DocumentIndex, EmbeddingRecord, IndexError, IndexState, SearchHit, clamp_bytes, rank_hits,
};
use crate::config::Config;
use crate::milvus::{
    CollectionSpec, FILENAME_MAX_LENGTH, MilvusError, MilvusService, QUERY_LIMIT_MAX,
    SUMMARY_MAX_LENGTH, SearchRow, TEXT_MAX_LENGTH,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

const SEARCH_OUTPUT_FIELDS: [&str; 2] = ["text", "filename"];
const SUMMARY_OUTPUT_FIELDS: [&str; 2] = ["filename", "summary"];

/// Connection manager for the Milvus document collection.
///
/// Constructed once at start-up and shared by reference. The first operation (or the start-up
/// task) connects lazily; failures leave the gateway [`IndexState::Unconnected`] so a later call
/// retries instead of failing for the lifetime of the process. A transport failure during
/// search or insert drops the gateway back to `Unconnected`, reconnects, and retries once.
pub struct VectorIndexGateway {
    milvus: MilvusService,
    spec: CollectionSpec,
    nprobe: u32,
    state: Mutex<IndexState>,
    connect_lock: AsyncMutex<()>,
}

impl VectorIndexGateway {
    /// Wrap a Milvus client managing the collection described by `spec`.
    pub fn new(milvus: MilvusService, spec: CollectionSpec, nprobe: u32) -> Self {
        Self {
            milvus,
            spec,
            nprobe,
            state: Mutex::new(IndexState::Unconnected),
            connect_lock: AsyncMutex::new(()),
        }
    }

    /// Build a gateway from the runtime configuration. Does not connect.
    pub fn from_config(config: &Config) -> Result<Self, MilvusError> {
        let milvus = MilvusService::new(
            &config.milvus_url,
            config.milvus_token.clone(),
            config.milvus_database.clone(),
            config.milvus_timeout,
        )?;
        Ok(Self::new(
            milvus,
            CollectionSpec {
                name: config.collection_name.clone(),
                dimension: config.embedding_dimension,
                nlist: config.index_nlist,
            },
            config.search_nprobe,
        ))
    }

    fn set_state(&self, next: IndexState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    async fn connect(&self) -> Result<(), MilvusError> {
        let collection = &self.spec.name;
        if self.milvus.has_collection(collection).await? {
            tracing::debug!(collection = %collection, "Collection already present");
        } else {
            tracing::info!(
                collection = %collection,
                dimension = self.spec.dimension,
                "Creating collection"
            );
            self.milvus.create_collection(&self.spec).await?;
        }
        self.milvus.load_collection(collection).await
    }

    /// Record an operation failure; transport failures force a reconnect.
    fn observe_failure(&self, operation: &str, error: &MilvusError) -> bool {
        let transport = error.is_transport();
        tracing::warn!(
            collection = %self.spec.name,
            operation,
            error = %error,
            reconnect = transport,
            "Vector index operation failed"
        );
        if transport {
            self.set_state(IndexState::Unconnected);
        }
        transport
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.spec.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.spec.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    async fn query_summary_rows(
        &self,
        filenames: &[String],
    ) -> Result<Vec<Map<String, Value>>, MilvusError> {
        self.milvus
            .query(
                &self.spec.name,
                &filename_filter(filenames),
                &SUMMARY_OUTPUT_FIELDS,
                QUERY_LIMIT_MAX,
            )
            .await
            .inspect_err(|error| {
                self.observe_failure("summaries", error);
            })
    }

    async fn insert_row(&self, row: &Value) -> Result<(), MilvusError> {
        self.milvus.insert(&self.spec.name, row.clone()).await?;
        if let Err(error) = self.milvus.flush(&self.spec.name).await {
            // Rows are searchable from growing segments even when the flush is refused.
            tracing::warn!(collection = %self.spec.name, error = %error, "Flush failed");
        }
        Ok(())
    }
}

impl From<MilvusError> for IndexError {
    fn from(error: MilvusError) -> Self {
        if error.is_transport() {
            IndexError::Unavailable(error.to_string())
        } else {
            IndexError::Rejected(error.to_string())
        }
    }
}

fn hit_from_row(row: SearchRow) -> Option<SearchHit> {
    let text = row.fields.get("text")?.as_str()?.to_string();
    let filename = row
        .fields
        .get("filename")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(SearchHit {
        text,
        filename,
        score: row.distance,
    })
}

fn filename_filter(filenames: &[String]) -> String {
    let quoted: Vec<String> = filenames
        .iter()
        .map(|name| format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("filename in [{}]", quoted.join(", "))
}

fn row_id(row: &Map<String, Value>) -> i64 {
    match row.get("id") {
        Some(Value::Number(number)) => number.as_i64().unwrap_or_default(),
        Some(Value::String(text)) => text.parse().unwrap_or_default(),
        _ => 0,
    }
}

#[async_trait]
impl DocumentIndex for VectorIndexGateway {
    async fn ensure_ready(&self) -> Result<(), IndexError> {
        if self.state() == IndexState::Ready {
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;
        if self.state() == IndexState::Ready {
            return Ok(());
        }

        self.set_state(IndexState::Connecting);
        match self.connect().await {
            Ok(()) => {
                self.set_state(IndexState::Ready);
                tracing::info!(collection = %self.spec.name, "Vector index ready");
                Ok(())
            }
            Err(error) => {
                self.set_state(IndexState::Unconnected);
                tracing::warn!(
                    collection = %self.spec.name,
                    error = %error,
                    "Vector index not ready; will retry on next use"
                );
                Err(IndexError::Unavailable(error.to_string()))
            }
        }
    }

    fn state(&self) -> IndexState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn insert(&self, record: EmbeddingRecord) -> Result<(), IndexError> {
        self.check_dimension(&record.embedding)?;
        let row = json!({
            "embedding": record.embedding,
            "text": clamp_bytes(&record.text, TEXT_MAX_LENGTH),
            "filename": clamp_bytes(&record.filename, FILENAME_MAX_LENGTH),
            "summary": clamp_bytes(&record.summary, SUMMARY_MAX_LENGTH),
        });

        self.ensure_ready().await?;
        match self.insert_row(&row).await {
            Ok(()) => {}
            Err(error) if self.observe_failure("insert", &error) => {
                self.ensure_ready().await?;
                self.insert_row(&row).await.inspect_err(|error| {
                    self.observe_failure("insert", error);
                })?;
            }
            Err(error) => return Err(error.into()),
        }

        tracing::info!(
            collection = %self.spec.name,
            filename = %record.filename,
            "Document indexed"
        );
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dimension(vector)?;
        self.ensure_ready().await?;

        let rows = match self
            .milvus
            .search(
                &self.spec.name,
                vector,
                top_k,
                self.nprobe,
                &SEARCH_OUTPUT_FIELDS,
            )
            .await
        {
            Ok(rows) => rows,
            Err(error) if self.observe_failure("search", &error) => {
                self.ensure_ready().await?;
                self.milvus
                    .search(
                        &self.spec.name,
                        vector,
                        top_k,
                        self.nprobe,
                        &SEARCH_OUTPUT_FIELDS,
                    )
                    .await
                    .inspect_err(|error| {
                        self.observe_failure("search", error);
                    })?
            }
            Err(error) => return Err(error.into()),
        };

        let hits = rows.into_iter().filter_map(hit_from_row).collect();
        Ok(rank_hits(hits, top_k))
    }

    async fn summaries(&self, filenames: &[String]) -> Result<HashMap<String, String>, IndexError> {
        if filenames.is_empty() {
            return Ok(HashMap::new());
        }
        self.ensure_ready().await?;

        let mut rows = self.query_summary_rows(filenames).await?;
        if rows.len() >= QUERY_LIMIT_MAX && filenames.len() > 1 {
            // The batch may be truncated; give every filename its own row budget.
            rows.clear();
            for filename in filenames {
                rows.extend(self.query_summary_rows(std::slice::from_ref(filename)).await?);
            }
        }

        let mut latest: HashMap<String, (i64, String)> = HashMap::new();
        for row in rows {
            let (Some(filename), Some(summary)) = (
                row.get("filename").and_then(Value::as_str),
                row.get("summary").and_then(Value::as_str),
            ) else {
                continue;
            };
            let id = row_id(&row);
            match latest.get(filename) {
                Some((seen, _)) if *seen >= id => {}
                _ => {
                    latest.insert(filename.to_string(), (id, summary.to_string()));
                }
            }
        }

        Ok(latest
            .into_iter()
            .map(|(filename, (_, summary))| (filename, summary))
            .collect())
    }
}
