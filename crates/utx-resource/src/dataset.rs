use crate::error::{ResourceError, Result};
use crate::storage::ResourceStorage;
use crate::types::{DatasetPayload, UsageEntry};
use std::sync::Arc;
use tracing::{debug, warn};
use utx_types::Checksum256;

/// Content-addressed cache of submitted payloads, cleared at rollover.
pub struct DatasetStore {
    storage: Arc<dyn ResourceStorage>,
}

impl DatasetStore {
    pub fn new(storage: Arc<dyn ResourceStorage>) -> Self {
        Self { storage }
    }

    /// Store `payload` under its content hash; identical payloads share one record.
    /// A different payload under an already stored hash is rejected.
    pub async fn remember(&self, payload: DatasetPayload) -> Result<Checksum256> {
        let hash = payload.content_hash();
        if let Some(existing) = self
            .storage
            .find_dataset(&hash)
            .await
            .map_err(ResourceError::storage)?
        {
            if existing.payload != payload {
                warn!(hash = %hash, "⚠️ Dataset hash reused for a different payload");
                return Err(ResourceError::DatasetConflict(hash.to_hex()));
            }
        }
        let id = self
            .storage
            .insert_dataset(hash, payload)
            .await
            .map_err(ResourceError::storage)?;
        debug!(dataset_id = id, hash = %hash, "Dataset remembered");
        Ok(hash)
    }

    pub async fn resolve(&self, hash: &Checksum256) -> Result<DatasetPayload> {
        self.storage
            .find_dataset(hash)
            .await
            .map_err(ResourceError::storage)?
            .map(|record| record.payload)
            .ok_or_else(|| ResourceError::DatasetMissing(hash.to_hex()))
    }

    pub async fn resolve_totals(&self, hash: &Checksum256) -> Result<(u64, u64)> {
        match self.resolve(hash).await? {
            DatasetPayload::Totals { cpu_us, net_words } => Ok((cpu_us, net_words)),
            DatasetPayload::Batch(_) => Err(ResourceError::DatasetMissing(hash.to_hex())),
        }
    }

    pub async fn resolve_batch(&self, hash: &Checksum256) -> Result<Vec<UsageEntry>> {
        match self.resolve(hash).await? {
            DatasetPayload::Batch(entries) => Ok(entries),
            DatasetPayload::Totals { .. } => Err(ResourceError::DatasetMissing(hash.to_hex())),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage
            .clear_datasets()
            .await
            .map_err(ResourceError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::totals_hash;
    use crate::storage::MemoryResourceStorage;

    #[tokio::test]
    async fn test_remember_and_resolve() {
        let store = DatasetStore::new(Arc::new(MemoryResourceStorage::new()));
        let hash = store
            .remember(DatasetPayload::Totals { cpu_us: 7, net_words: 3 })
            .await
            .unwrap();
        assert_eq!(hash, totals_hash(7, 3));
        assert_eq!(store.resolve_totals(&hash).await.unwrap(), (7, 3));
        assert!(matches!(
            store.resolve_batch(&hash).await,
            Err(ResourceError::DatasetMissing(_))
        ));

        store.clear().await.unwrap();
        assert!(matches!(
            store.resolve(&hash).await,
            Err(ResourceError::DatasetMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_different_payload_under_stored_hash_rejected() {
        let storage = Arc::new(MemoryResourceStorage::new());
        let store = DatasetStore::new(storage.clone());
        let payload = DatasetPayload::Batch(vec![UsageEntry::new("alice".parse().unwrap(), 15)]);
        let hash = payload.content_hash();

        // identical payloads share the record
        assert_eq!(store.remember(payload.clone()).await.unwrap(), hash);
        assert_eq!(store.remember(payload.clone()).await.unwrap(), hash);

        store.clear().await.unwrap();
        let squatter = DatasetPayload::Batch(vec![UsageEntry::new("alice1".parse().unwrap(), 5)]);
        storage.insert_dataset(hash, squatter.clone()).await.unwrap();
        assert!(matches!(
            store.remember(payload.clone()).await,
            Err(ResourceError::DatasetConflict(_))
        ));
        assert!(storage.insert_dataset(hash, payload).await.is_err());
        assert_eq!(store.resolve(&hash).await.unwrap(), squatter);
    }
}
