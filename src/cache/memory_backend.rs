use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::adapters::CacheBackend;
use crate::types::CacheEntry;

#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<Uuid, CacheEntry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn put(&self, key: Uuid, entry: CacheEntry) -> anyhow::Result<()> {
        self.entries.write().insert(key, entry);
        Ok(())
    }

    async fn get(&self, key: Uuid) -> anyhow::Result<Option<CacheEntry>> {
        Ok(self.entries.read().get(&key).cloned())
    }

    async fn remove(&self, key: Uuid) -> anyhow::Result<()> {
        self.entries.write().remove(&key);
        Ok(())
    }

    async fn all(&self) -> anyhow::Result<Vec<(Uuid, CacheEntry)>> {
        Ok(self.entries.read().iter().map(|(k, v)| (*k, v.clone())).collect())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    async fn len(&self) -> anyhow::Result<usize> {
        Ok(self.entries.read().len())
    }
}
