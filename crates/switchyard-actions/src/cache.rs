use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Short-lived embedding cache keyed by model and text.
pub struct EmbeddingCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), Entry>>,
}

struct Entry {
    vector: Vec<f32>,
    inserted: Instant,
}

impl EmbeddingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached vector for `(model, text)`, if present and not expired.
    pub async fn get(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let mut entries = self.entries.lock().await;
        let key = (model.to_string(), text.to_string());
        match entries.get(&key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.vector.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Store a vector, sweeping out expired entries first.
    pub async fn insert(&self, model: &str, text: &str, vector: Vec<f32>) {
        let mut entries = self.entries.lock().await;
        self.sweep(&mut entries);
        entries.insert(
            (model.to_string(), text.to_string()),
            Entry {
                vector,
                inserted: Instant::now(),
            },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        self.sweep(&mut entries)
    }

    fn sweep(&self, entries: &mut HashMap<(String, String), Entry>) -> usize {
        let before = entries.len();
        entries.retain(|_, e| e.inserted.elapsed() < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = EmbeddingCache::new(Duration::from_secs(60));
        cache.insert("m", "hello", vec![1.0, 0.0]).await;
        assert_eq!(cache.get("m", "hello").await, Some(vec![1.0, 0.0]));
        assert_eq!(cache.get("other-model", "hello").await, None);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("m", "hello").await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = EmbeddingCache::new(Duration::from_secs(10));
        cache.insert("m", "a", vec![1.0]).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.insert("m", "b", vec![2.0]).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_sweeps_expired_keys() {
        let cache = EmbeddingCache::new(Duration::from_secs(3600));
        for i in 0..50 {
            cache.insert("m", &format!("message {}", i), vec![i as f32]).await;
            tokio::time::advance(Duration::from_secs(3601)).await;
        }
        cache.insert("m", "latest", vec![0.5]).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("m", "latest").await, Some(vec![0.5]));
    }
}
