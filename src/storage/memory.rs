use super::{ObjectStore, StorageError, StoredObject};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Process-local object store. Contents vanish with the process; presigning is unsupported.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, (Vec<u8>, OffsetDateTime)>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), (bytes, OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredObject>, StorageError> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .map(|(key, (_, modified))| StoredObject {
                key: key.clone(),
                last_modified: Some(*modified),
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn presign(&self, _key: &str, _ttl: Duration) -> Result<Option<String>, StorageError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stored_bytes_round_trip() {
        let store = MemoryObjectStore::new();
        store
            .put("a.txt", b"The sky is blue.".to_vec())
            .await
            .expect("put");

        let bytes = store.get("a.txt").await.expect("get");
        assert_eq!(bytes, b"The sky is blue.");
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let store = MemoryObjectStore::new();
        store.put("a.txt", b"first".to_vec()).await.expect("put");
        store.put("a.txt", b"second".to_vec()).await.expect("put");

        assert_eq!(store.get("a.txt").await.expect("get"), b"second");
        assert_eq!(store.list().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryObjectStore::new();
        let error = store.get("nope.txt").await.expect_err("missing");
        assert!(matches!(error, StorageError::NotFound(key) if key == "nope.txt"));
    }

    #[tokio::test]
    async fn list_reports_keys_with_timestamps() {
        let store = MemoryObjectStore::new();
        store.put("b.txt", vec![1]).await.expect("put");
        store.put("a.txt", vec![2]).await.expect("put");

        let listing = store.list().await.expect("list");
        let keys: Vec<_> = listing.iter().map(|object| object.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "b.txt"]);
        assert!(listing.iter().all(|object| object.last_modified.is_some()));
    }

    #[tokio::test]
    async fn presign_is_unsupported() {
        let store = MemoryObjectStore::new();
        store.put("a.txt", vec![1]).await.expect("put");
        let url = store
            .presign("a.txt", Duration::from_secs(60))
            .await
            .expect("presign");
        assert!(url.is_none());
    }
}
