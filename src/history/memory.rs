use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::history::{ KvStore, StoreError };

/// Process-local backend. Keys are kept ordered so prefix scans are a range walk.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
        let entries = self.entries.read().await;
        Ok(
            entries
                .range(prefix.to_string()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scan_stops_at_prefix_boundary() {
        let kv = MemoryKvStore::new();
        kv.put("chat:u1:a", "1".into()).await.unwrap();
        kv.put("chat:u1:b", "2".into()).await.unwrap();
        kv.put("chat:u10:a", "3".into()).await.unwrap();
        kv.put("chat:u2:a", "4".into()).await.unwrap();

        let keys: Vec<String> = kv
            .scan_prefix("chat:u1:").await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["chat:u1:a".to_string(), "chat:u1:b".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_writers_do_not_corrupt_records() {
        let kv = std::sync::Arc::new(MemoryKvStore::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let kv = kv.clone();
            tasks.push(
                tokio::spawn(async move {
                    kv.put(&format!("k{}", i % 4), format!("value-{}", i)).await.unwrap();
                })
            );
        }
        for task in tasks {
            task.await.unwrap();
        }

        let all = kv.scan_prefix("k").await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|(_, v)| v.starts_with("value-")));
    }
}
