use super::{DocumentIndex, EmbeddingRecord, IndexError, IndexState, SearchHit, rank_hits};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Brute-force cosine index held in process memory.
///
/// Always [`IndexState::Ready`]. Intended for local development without Milvus and for tests;
/// every search scans all records.
pub struct MemoryIndex {
    dimension: usize,
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl MemoryIndex {
    /// Create an empty index accepting vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the index holds no records.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn ensure_ready(&self) -> Result<(), IndexError> {
        Ok(())
    }

    fn state(&self) -> IndexState {
        IndexState::Ready
    }

    async fn insert(&self, record: EmbeddingRecord) -> Result<(), IndexError> {
        self.check_dimension(&record.embedding)?;
        self.records.write().await.push(record);
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dimension(vector)?;
        let hits = self
            .records
            .read()
            .await
            .iter()
            .map(|record| SearchHit {
                text: record.text.clone(),
                filename: record.filename.clone(),
                score: cosine_similarity(vector, &record.embedding),
            })
            .collect();
        Ok(rank_hits(hits, top_k))
    }

    async fn summaries(&self, filenames: &[String]) -> Result<HashMap<String, String>, IndexError> {
        let records = self.records.read().await;
        // Later inserts win, matching a re-upload of the same key.
        Ok(records
            .iter()
            .filter(|record| filenames.contains(&record.filename))
            .map(|record| (record.filename.clone(), record.summary.clone()))
            .collect())
    }
}
