//! Time-ordered queue of throttled fetches.
//!
//! Entries are keyed by `(nft_id, origin)`. Pushing a second entry for the
//! same key supersedes the first: the stale heap slot is skipped on pop.
//! Entries without an nft id are never superseded.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tokio::time::Instant;

use ingest_core::OriginKey;

/// A deferred fetch waiting for its cooldown.
#[derive(Debug, Clone)]
pub struct RetryEntry<T> {
    pub nft_id: Option<i64>,
    pub origin: OriginKey,
    pub ready_at: Instant,
    pub payload: T,
}

type Key = (i64, OriginKey);

pub struct RetryQueue<T> {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    entries: HashMap<u64, RetryEntry<T>>,
    latest: HashMap<Key, u64>,
    next_seq: u64,
}

impl<T> Default for RetryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RetryQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            latest: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Adds an entry. Returns `true` if it superseded an earlier one.
    pub fn push(&mut self, entry: RetryEntry<T>) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut superseded = false;
        if let Some(id) = entry.nft_id {
            if let Some(old) = self.latest.insert((id, entry.origin.clone()), seq) {
                superseded = self.entries.remove(&old).is_some();
            }
        }

        self.heap.push(Reverse((entry.ready_at, seq)));
        self.entries.insert(seq, entry);
        superseded
    }

    /// Removes and returns every entry with `ready_at <= now`, oldest first.
    pub fn pop_ready(&mut self, now: Instant) -> Vec<RetryEntry<T>> {
        let mut ready = Vec::new();
        while let Some(Reverse((ready_at, seq))) = self.heap.peek().copied() {
            if ready_at > now {
                break;
            }
            self.heap.pop();

            let Some(entry) = self.entries.remove(&seq) else {
                continue;
            };
            if let Some(id) = entry.nft_id {
                let key = (id, entry.origin.clone());
                if self.latest.get(&key) == Some(&seq) {
                    self.latest.remove(&key);
                }
            }
            ready.push(entry);
        }
        ready
    }

    /// Earliest pending `ready_at`.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.ready_at).min()
    }

    /// Whether a live entry exists for `nft_id`, on any origin.
    pub fn contains(&self, nft_id: i64) -> bool {
        self.latest.keys().any(|(id, _)| *id == nft_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(id: Option<i64>, origin: &str, at: Instant, payload: &'static str) -> RetryEntry<&'static str> {
        RetryEntry {
            nft_id: id,
            origin: OriginKey::new(origin),
            ready_at: at,
            payload,
        }
    }

    #[test]
    fn test_nothing_pops_before_ready_at() {
        let now = Instant::now();
        let mut queue = RetryQueue::new();
        queue.push(entry(Some(1), "ipfs", now + Duration::from_secs(5), "a"));

        assert!(queue.pop_ready(now).is_empty());
        assert!(queue.pop_ready(now + Duration::from_millis(4999)).is_empty());

        let ready = queue.pop_ready(now + Duration::from_secs(5));
        assert_eq!(ready.len(), 1);
        assert!(queue.is_empty());
        assert!(queue.pop_ready(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_pops_in_ready_order() {
        let now = Instant::now();
        let mut queue = RetryQueue::new();
        queue.push(entry(Some(1), "a", now + Duration::from_secs(3), "late"));
        queue.push(entry(Some(2), "a", now + Duration::from_secs(1), "early"));
        queue.push(entry(Some(3), "b", now + Duration::from_secs(2), "mid"));

        let order: Vec<_> = queue
            .pop_ready(now + Duration::from_secs(10))
            .into_iter()
            .map(|e| e.payload)
            .collect();
        assert_eq!(order, vec!["early", "mid", "late"]);
    }

    #[test]
    fn test_same_key_supersedes() {
        let now = Instant::now();
        let mut queue = RetryQueue::new();
        assert!(!queue.push(entry(Some(7), "ipfs", now + Duration::from_secs(1), "first")));
        assert!(queue.push(entry(Some(7), "ipfs", now + Duration::from_secs(4), "second")));
        assert_eq!(queue.len(), 1);
        assert!(queue.contains(7));
        assert!(!queue.contains(8));

        assert!(queue.pop_ready(now + Duration::from_secs(2)).is_empty());
        let ready = queue.pop_ready(now + Duration::from_secs(4));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].payload, "second");
        assert!(!queue.contains(7));
    }

    #[test]
    fn test_distinct_origins_and_anonymous_entries_coexist() {
        let now = Instant::now();
        let mut queue = RetryQueue::new();
        queue.push(entry(Some(7), "ipfs", now, "a"));
        queue.push(entry(Some(7), "arweave", now, "b"));
        queue.push(entry(None, "ipfs", now, "c"));
        queue.push(entry(None, "ipfs", now, "d"));
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.next_ready_at(), Some(now));
        assert_eq!(queue.pop_ready(now).len(), 4);
    }
}
