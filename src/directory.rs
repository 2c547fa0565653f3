use crate::error::Result;
use crate::types::{Peer, PeerId};
use dashmap::DashMap;

/// Directory of federated pods, consumed by the scheduler but owned by
/// the peer-admission flow. Only the operations the scheduler needs are
/// part of this seam.
///
/// `increment_scores` must be a relative, per-peer atomic update. The
/// directory may be mutated concurrently by peer admission or manual
/// administration, so implementations must not read-modify-write.
pub trait PeerDirectory: Send + Sync {
    fn lookup_by_id(&self, id: &str) -> Option<Peer>;

    /// Ids of every known pod. Used to default a new request's
    /// destination set at insert time.
    fn list_all_ids(&self) -> Vec<PeerId>;

    /// Pods whose score has reached zero or below, due for eviction.
    fn list_zero_score_peers(&self) -> Vec<Peer>;

    fn increment_scores(&self, ids: &[PeerId], delta: i64) -> Result<()>;

    fn remove(&self, id: &str) -> Result<()>;
}

/// In-process directory backed by a concurrent map. Suitable for
/// embedding and tests; a deployment backed by a database implements
/// the same trait over its own peer table.
pub struct MemoryDirectory {
    peers: DashMap<PeerId, Peer>,
    base_score: i64,
    max_score: i64,
}

impl MemoryDirectory {
    pub fn new(base_score: i64, max_score: i64) -> Self {
        Self {
            peers: DashMap::new(),
            base_score,
            max_score,
        }
    }

    /// Register a pod at the base score. Overwrites any previous entry
    /// with the same id.
    pub fn admit(&self, id: &str, url: &str) {
        self.peers.insert(
            id.to_string(),
            Peer {
                id: id.to_string(),
                url: url.to_string(),
                score: self.base_score,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl PeerDirectory for MemoryDirectory {
    fn lookup_by_id(&self, id: &str) -> Option<Peer> {
        self.peers.get(id).map(|entry| entry.clone())
    }

    fn list_all_ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|entry| entry.key().clone()).collect()
    }

    fn list_zero_score_peers(&self) -> Vec<Peer> {
        self.peers
            .iter()
            .filter(|entry| entry.score <= 0)
            .map(|entry| entry.clone())
            .collect()
    }

    fn increment_scores(&self, ids: &[PeerId], delta: i64) -> Result<()> {
        for id in ids {
            // alter() holds the shard lock, so the delta is applied
            // against the current value, never a stale read.
            self.peers.alter(id, |_, mut peer| {
                peer.score = (peer.score + delta).min(self.max_score);
                peer
            });
        }
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.peers.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_seeds_base_score() {
        let directory = MemoryDirectory::new(100, 1000);
        directory.admit("pod-a", "https://pod-a.example.com");

        let peer = directory.lookup_by_id("pod-a").unwrap();
        assert_eq!(peer.score, 100);
        assert_eq!(peer.url, "https://pod-a.example.com");
    }

    #[test]
    fn increment_is_relative_and_clamped() {
        let directory = MemoryDirectory::new(995, 1000);
        directory.admit("pod-a", "http://a");

        directory
            .increment_scores(&["pod-a".to_string()], 10)
            .unwrap();
        assert_eq!(directory.lookup_by_id("pod-a").unwrap().score, 1000);

        directory
            .increment_scores(&["pod-a".to_string()], -10)
            .unwrap();
        assert_eq!(directory.lookup_by_id("pod-a").unwrap().score, 990);
    }

    #[test]
    fn increment_of_unknown_peer_is_a_no_op() {
        let directory = MemoryDirectory::new(100, 1000);
        directory
            .increment_scores(&["ghost".to_string()], 10)
            .unwrap();
        assert!(directory.lookup_by_id("ghost").is_none());
    }

    #[test]
    fn zero_score_listing() {
        let directory = MemoryDirectory::new(10, 1000);
        directory.admit("pod-a", "http://a");
        directory.admit("pod-b", "http://b");

        directory
            .increment_scores(&["pod-a".to_string()], -10)
            .unwrap();

        let bad: Vec<_> = directory
            .list_zero_score_peers()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(bad, vec!["pod-a".to_string()]);
    }

    #[test]
    fn concurrent_increments_sum_correctly() {
        use std::sync::Arc;

        let directory = Arc::new(MemoryDirectory::new(500, 1000));
        directory.admit("pod-a", "http://a");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let directory = Arc::clone(&directory);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    directory
                        .increment_scores(&["pod-a".to_string()], 1)
                        .unwrap();
                    directory
                        .increment_scores(&["pod-a".to_string()], -2)
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // 8 threads * 50 iterations * (+1 - 2) = -400
        assert_eq!(directory.lookup_by_id("pod-a").unwrap().score, 100);
    }
}
