//! Registry Store Adapter
//!
//! Maps registry operations onto the key-value store. Records are keyed by
//! name; the value is a small JSON envelope around the opaque payload so a
//! foreign or truncated value is detected instead of returned.

use super::{KvStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    payload: String,
}

/// Registry view over a shared [`KvStore`]. Cheap to clone.
#[derive(Clone)]
pub struct RegistryStore {
    kv: Arc<dyn KvStore>,
}

impl RegistryStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Insert or overwrite `name`.
    pub async fn put(&self, name: &str, payload: &str) -> Result<(), StoreError> {
        let value = encode_record(payload)?;
        self.kv.put(name, value).await
    }

    /// `None` when `name` is absent.
    pub async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        match self.kv.get(name).await? {
            Some(value) => decode_record(name, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Every record whose name starts with `prefix`.
    pub async fn list(&self, prefix: &str) -> Result<BTreeMap<String, String>, StoreError> {
        self.kv
            .get_prefix(prefix)
            .await?
            .into_iter()
            .map(|(name, value)| {
                let payload = decode_record(&name, &value)?;
                Ok((name, payload))
            })
            .collect()
    }

    /// Idempotent.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.kv.delete(name).await
    }
}

fn encode_record(payload: &str) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(&StoredRecord {
        payload: payload.to_string(),
    })
    .map_err(StoreError::unavailable)
}

fn decode_record(key: &str, value: &[u8]) -> Result<String, StoreError> {
    serde_json::from_slice::<StoredRecord>(value)
        .map(|record| record.payload)
        .map_err(|source| StoreError::RecordCorrupt {
            key: key.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> (Arc<MemoryStore>, RegistryStore) {
        let kv = Arc::new(MemoryStore::new());
        (kv.clone(), RegistryStore::new(kv))
    }

    #[tokio::test]
    async fn test_get_after_add_and_overwrite() {
        let (_, store) = registry();

        store.put("svc", "hash-1").await.unwrap();
        assert_eq!(store.get("svc").await.unwrap().as_deref(), Some("hash-1"));

        store.put("svc", "hash-2").await.unwrap();
        assert_eq!(store.get("svc").await.unwrap().as_deref(), Some("hash-2"));

        store.delete("svc").await.unwrap();
        assert_eq!(store.get("svc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_payload_is_stored_verbatim() {
        let (_, store) = registry();
        let payload = r#"{"ContentHash":"Qm123","DockerHash":"sha256:abc","extra":[1,2]}"#;

        store.put("svc", payload).await.unwrap();
        assert_eq!(store.get("svc").await.unwrap().as_deref(), Some(payload));
    }

    #[tokio::test]
    async fn test_delete_absent_name_is_ok() {
        let (_, store) = registry();
        store.delete("never-added").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_returns_exact_entries() {
        let (_, store) = registry();
        assert!(store.list("").await.unwrap().is_empty());

        store.put("a", "1").await.unwrap();
        store.put("b", "2").await.unwrap();

        let entries = store.list("").await.unwrap();
        let expected = BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert_eq!(entries, expected);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_not_absent() {
        let (kv, store) = registry();
        kv.put("svc", b"not json".to_vec()).await.unwrap();

        let err = store.get("svc").await.unwrap_err();
        assert!(matches!(err, StoreError::RecordCorrupt { ref key, .. } if key == "svc"));

        assert!(matches!(
            store.list("").await,
            Err(StoreError::RecordCorrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_unavailable_surfaces() {
        let (kv, store) = registry();
        kv.set_offline(true);
        assert!(matches!(
            store.put("svc", "x").await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
