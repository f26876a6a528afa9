// In-memory sample history: a bounded ring per server, oldest evicted first.

use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::models::ServerSample;

pub struct HistoryStore {
    capacity: usize,
    samples: RwLock<HashMap<String, VecDeque<ServerSample>>>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn push(&self, sample: ServerSample) {
        let mut samples = self.samples.write().await;
        let ring = samples
            .entry(sample.server_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(sample);
    }

    /// Up to `limit` most recent samples, oldest first.
    pub async fn recent(&self, server_id: &str, limit: usize) -> Vec<ServerSample> {
        let samples = self.samples.read().await;
        let Some(ring) = samples.get(server_id) else {
            return Vec::new();
        };
        let skip = ring.len().saturating_sub(limit);
        ring.iter().skip(skip).cloned().collect()
    }

    pub async fn latest(&self, server_id: &str) -> Option<ServerSample> {
        self.samples
            .read()
            .await
            .get(server_id)
            .and_then(|ring| ring.back().cloned())
    }

    pub async fn remove(&self, server_id: &str) {
        self.samples.write().await.remove(server_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, timestamp: u64) -> ServerSample {
        ServerSample {
            server_id: id.to_string(),
            timestamp,
            health: None,
            players: None,
        }
    }

    #[tokio::test]
    async fn evicts_oldest_at_capacity() {
        let store = HistoryStore::new(3);
        for ts in 1..=5 {
            store.push(sample("a", ts)).await;
        }
        let kept: Vec<u64> = store.recent("a", 10).await.iter().map(|s| s.timestamp).collect();
        assert_eq!(kept, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn recent_limits_to_newest() {
        let store = HistoryStore::new(10);
        for ts in 1..=4 {
            store.push(sample("a", ts)).await;
        }
        store.push(sample("b", 100)).await;
        let kept: Vec<u64> = store.recent("a", 2).await.iter().map(|s| s.timestamp).collect();
        assert_eq!(kept, vec![3, 4]);
        assert_eq!(store.latest("b").await.map(|s| s.timestamp), Some(100));
        assert!(store.recent("missing", 5).await.is_empty());
    }

    #[tokio::test]
    async fn remove_drops_server() {
        let store = HistoryStore::new(2);
        store.push(sample("a", 1)).await;
        store.remove("a").await;
        assert!(store.latest("a").await.is_none());
    }
}
